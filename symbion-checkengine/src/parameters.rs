/*!
PARAMETERS - Paramètres de check, éventuellement dépendants du temps

RÔLE :
- `TimespecificParameters` : liste ordonnée de jeux de règles, chaque jeu
  ayant une valeur par défaut et des surcharges par période de temps
- `Parameters` : résultat évalué, objet JSON en lecture seule passé au plugin

ÉVALUATION :
1. Chaque jeu : première période active fusionnée sur la valeur par défaut
2. La liste : fusion clé par clé, les premiers jeux ont priorité
3. Un résultat qui n'est pas un objet est enveloppé sous `WRAPPER_KEY`
*/

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::models::TimeperiodName;
use crate::timeperiod::TimeperiodOracle;

/// Clé d'enveloppe des paramètres historiques qui n'étaient pas des objets
pub const WRAPPER_KEY: &str = "auto-migration-wrapper-key";

/// Paramètres évalués, immuables et peu coûteux à cloner
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameters(Arc<Map<String, Value>>);

impl Parameters {
    pub fn new(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(Arc::new(map)),
            Value::Null => Self::default(),
            other => {
                let mut map = Map::new();
                map.insert(WRAPPER_KEY.to_string(), other);
                Self(Arc::new(map))
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    /// Seuils (warn, crit) stockés sous forme de tableau à deux éléments
    pub fn levels(&self, key: &str) -> Option<(f64, f64)> {
        match self.get(key)?.as_array()?.as_slice() {
            [warn, crit] => Some((warn.as_f64()?, crit.as_f64()?)),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object((*self.0).clone())
    }
}

impl Serialize for Parameters {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// Fusionne `overlay` sur `base` clé par clé (niveau supérieur uniquement)
fn merge_over(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in overlay {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimespecificParameterSet {
    pub default: Value,
    #[serde(default)]
    pub timeperiod_values: Vec<(TimeperiodName, Value)>,
}

impl TimespecificParameterSet {
    pub fn constant(default: Value) -> Self {
        Self {
            default,
            timeperiod_values: Vec::new(),
        }
    }

    pub fn evaluate(&self, oracle: &dyn TimeperiodOracle) -> Value {
        let Value::Object(default) = &self.default else {
            return self.default.clone();
        };
        for (timeperiod, value) in &self.timeperiod_values {
            if !oracle.is_active(timeperiod) {
                continue;
            }
            return match value {
                Value::Object(overlay) => Value::Object(merge_over(default, overlay)),
                other => other.clone(),
            };
        }
        self.default.clone()
    }
}

/// Paramètres configurés d'un service
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "ParametersConfig", into = "Vec<TimespecificParameterSet>")]
pub struct TimespecificParameters(Vec<TimespecificParameterSet>);

/// Forme YAML acceptée : liste de jeux, ou valeur simple (historique)
#[derive(Deserialize)]
#[serde(untagged)]
enum ParametersConfig {
    Timespecific(Vec<TimespecificParameterSet>),
    Legacy(Value),
}

impl From<ParametersConfig> for TimespecificParameters {
    fn from(config: ParametersConfig) -> Self {
        match config {
            ParametersConfig::Timespecific(sets) => Self(sets),
            ParametersConfig::Legacy(Value::Null) => Self::default(),
            ParametersConfig::Legacy(value) => Self::legacy(value),
        }
    }
}

impl From<TimespecificParameters> for Vec<TimespecificParameterSet> {
    fn from(params: TimespecificParameters) -> Self {
        params.0
    }
}

impl TimespecificParameters {
    pub fn new(sets: Vec<TimespecificParameterSet>) -> Self {
        Self(sets)
    }

    /// Une seule valeur, sans dépendance temporelle
    pub fn legacy(value: Value) -> Self {
        Self(vec![TimespecificParameterSet::constant(value)])
    }

    pub fn sets(&self) -> &[TimespecificParameterSet] {
        &self.0
    }

    pub fn is_constant(&self) -> bool {
        self.0.iter().all(|set| set.timeperiod_values.is_empty())
    }

    pub fn evaluate(&self, oracle: &dyn TimeperiodOracle) -> Value {
        if let Some(first) = self.0.first() {
            if !first.default.is_object() {
                return first.evaluate(oracle);
            }
        }
        let mut merged = Map::new();
        for set in self.0.iter().rev() {
            if let Value::Object(values) = set.evaluate(oracle) {
                merged = merge_over(&merged, &values);
            }
        }
        Value::Object(merged)
    }

    /// Paramètres finaux : configuration évaluée fusionnée sur les défauts du plugin
    pub fn compute(&self, defaults: &Value, oracle: &dyn TimeperiodOracle) -> Parameters {
        let configured = self.evaluate(oracle);
        match (defaults, configured) {
            (Value::Object(defaults), Value::Object(configured)) => {
                Parameters::new(Value::Object(merge_over(defaults, &configured)))
            }
            (_, Value::Object(configured)) if configured.is_empty() => Parameters::new(defaults.clone()),
            (_, configured) => Parameters::new(configured),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn night_only(name: &str) -> bool {
        name == "night"
    }

    #[test]
    fn test_non_object_is_wrapped() {
        let params = Parameters::new(json!([80.0, 90.0]));
        assert_eq!(params.get(WRAPPER_KEY), Some(&json!([80.0, 90.0])));
        assert!(Parameters::new(Value::Null).is_empty());
    }

    #[test]
    fn test_levels_helper() {
        let params = Parameters::new(json!({"levels": [80, 90], "bad": [1]}));
        assert_eq!(params.levels("levels"), Some((80.0, 90.0)));
        assert_eq!(params.levels("bad"), None);
        assert_eq!(params.levels("missing"), None);
    }

    #[test]
    fn test_set_uses_first_active_period() {
        let set = TimespecificParameterSet {
            default: json!({"levels": [80, 90], "average": 5}),
            timeperiod_values: vec![
                ("day".into(), json!({"levels": [70, 80]})),
                ("night".into(), json!({"levels": [95, 99]})),
            ],
        };
        assert_eq!(
            set.evaluate(&night_only),
            json!({"levels": [95, 99], "average": 5})
        );
        assert_eq!(set.evaluate(&|_: &str| false), set.default);
    }

    #[test]
    fn test_earlier_sets_take_precedence() {
        let params = TimespecificParameters::new(vec![
            TimespecificParameterSet::constant(json!({"levels": [1, 2]})),
            TimespecificParameterSet::constant(json!({"levels": [3, 4], "extra": true})),
        ]);
        assert_eq!(params.evaluate(&night_only), json!({"levels": [1, 2], "extra": true}));
    }

    #[test]
    fn test_non_object_first_set_wins() {
        let params = TimespecificParameters::new(vec![
            TimespecificParameterSet::constant(json!("legacy")),
            TimespecificParameterSet::constant(json!({"levels": [3, 4]})),
        ]);
        assert_eq!(params.evaluate(&night_only), json!("legacy"));
        let computed = params.compute(&json!({"levels": [5, 6]}), &night_only);
        assert_eq!(computed.get(WRAPPER_KEY), Some(&json!("legacy")));
    }

    #[test]
    fn test_compute_merges_over_defaults() {
        let params = TimespecificParameters::legacy(json!({"levels": [70, 80]}));
        let computed = params.compute(&json!({"levels": [80, 90], "average": 15}), &night_only);
        assert_eq!(computed.to_value(), json!({"levels": [70, 80], "average": 15}));

        let unconfigured = TimespecificParameters::default().compute(&json!({"average": 15}), &night_only);
        assert_eq!(unconfigured.to_value(), json!({"average": 15}));
    }

    #[test]
    fn test_yaml_forms() {
        let sets: TimespecificParameters = serde_yaml::from_str(
            "- default: {levels: [1, 2]}\n  timeperiod_values: [[night, {levels: [3, 4]}]]\n",
        )
        .unwrap();
        assert!(!sets.is_constant());
        assert_eq!(sets.evaluate(&night_only), json!({"levels": [3, 4]}));

        let legacy: TimespecificParameters = serde_yaml::from_str("{levels: [1, 2]}").unwrap();
        assert!(legacy.is_constant());
        assert_eq!(legacy.sets().len(), 1);
    }
}
