/*!
PLUGINS - Contrat d'appel des plugins de check

RÔLE :
Un `CheckPlugin` déclare les sections parsées dont il a besoin (par ordre de
préférence) et fournit une fonction de check. Le registre est une simple map
injectée dans le moteur, jamais un état global.

CONTRAT D'UNE FONCTION DE CHECK :
- Entrée : `CheckArgs` (item, paramètres, sections) + `CheckContext`
- Sortie : liste ordonnée de `CheckOutput` (sous-résultats et métriques)
- Erreur : `CheckError` (ignore / timeout / échec). Un panic est traité
  comme un échec par l'invoker.
*/

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::checkresults::{MetricTuple, State};
use crate::context::CheckContext;
use crate::errors::CheckError;
use crate::models::{CheckPluginName, HostName, Item, ParsedSectionName};
use crate::parameters::Parameters;

/// Sections résolues pour un hôte : `None` = section déclarée mais absente
pub type SectionData = BTreeMap<ParsedSectionName, Option<Arc<Value>>>;

/// Arguments d'un appel de la fonction de check d'un noeud (ou hôte simple)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckArgs {
    pub item: Item,
    /// Absent si le plugin ne déclare pas de paramètres par défaut
    pub params: Option<Parameters>,
    pub sections: SectionData,
}

impl CheckArgs {
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections
            .get(&ParsedSectionName::new(name))
            .and_then(|data| data.as_deref())
    }
}

/// Arguments d'un appel de la fonction de check de cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterCheckArgs {
    pub item: Item,
    pub params: Option<Parameters>,
    pub nodes: BTreeMap<HostName, SectionData>,
}

impl ClusterCheckArgs {
    /// Vue "noeud" d'un cluster, pour les modes qui appellent la fonction par noeud
    pub fn node_args(&self, node: &HostName) -> Option<CheckArgs> {
        self.nodes.get(node).map(|sections| CheckArgs {
            item: self.item.clone(),
            params: self.params.clone(),
            sections: sections.clone(),
        })
    }
}

/// Un sous-résultat : état, résumé (première ligne) et détail
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubResult {
    pub state: State,
    pub summary: String,
    pub details: String,
}

impl SubResult {
    pub fn new(state: State, summary: impl Into<String>) -> Self {
        let summary = summary.into();
        Self {
            state,
            details: summary.clone(),
            summary,
        }
    }

    /// Détail seul, sans résumé (n'apparaît que dans le texte long)
    pub fn notice(state: State, details: impl Into<String>) -> Self {
        Self {
            state,
            summary: String::new(),
            details: details.into(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }
}

/// Ce qu'une fonction de check peut émettre
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CheckOutput {
    Result(SubResult),
    Metric(MetricTuple),
}

impl CheckOutput {
    pub fn result(state: State, summary: impl Into<String>) -> Self {
        Self::Result(SubResult::new(state, summary))
    }

    pub fn notice(state: State, details: impl Into<String>) -> Self {
        Self::Result(SubResult::notice(state, details))
    }

    pub fn metric(name: impl Into<String>, value: f64) -> Self {
        Self::Metric(MetricTuple::new(name, value))
    }
}

pub type CheckFunctionResult = Result<Vec<CheckOutput>, CheckError>;

pub type CheckFunction = Arc<dyn Fn(&CheckArgs, &mut CheckContext<'_>) -> CheckFunctionResult + Send + Sync>;

pub type ClusterCheckFunction =
    Arc<dyn Fn(&ClusterCheckArgs, &mut CheckContext<'_>) -> CheckFunctionResult + Send + Sync>;

#[derive(Clone)]
pub struct CheckPlugin {
    pub name: CheckPluginName,
    pub sections: Vec<ParsedSectionName>,
    pub check_function: CheckFunction,
    pub cluster_check_function: Option<ClusterCheckFunction>,
    pub default_parameters: Option<Value>,
    pub ruleset_name: Option<String>,
}

impl CheckPlugin {
    pub fn new<F>(name: impl Into<CheckPluginName>, sections: &[&str], check_function: F) -> Self
    where
        F: Fn(&CheckArgs, &mut CheckContext<'_>) -> CheckFunctionResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            sections: sections.iter().map(|s| ParsedSectionName::new(*s)).collect(),
            check_function: Arc::new(check_function),
            cluster_check_function: None,
            default_parameters: None,
            ruleset_name: None,
        }
    }

    pub fn with_default_parameters(mut self, defaults: Value) -> Self {
        self.default_parameters = Some(defaults);
        self
    }

    pub fn with_ruleset(mut self, ruleset_name: impl Into<String>) -> Self {
        self.ruleset_name = Some(ruleset_name.into());
        self
    }

    pub fn with_cluster_check_function<F>(mut self, function: F) -> Self
    where
        F: Fn(&ClusterCheckArgs, &mut CheckContext<'_>) -> CheckFunctionResult + Send + Sync + 'static,
    {
        self.cluster_check_function = Some(Arc::new(function));
        self
    }
}

impl std::fmt::Debug for CheckPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckPlugin")
            .field("name", &self.name)
            .field("sections", &self.sections)
            .field("has_cluster_check_function", &self.cluster_check_function.is_some())
            .field("default_parameters", &self.default_parameters)
            .field("ruleset_name", &self.ruleset_name)
            .finish()
    }
}

/// Registre des plugins de check, construit au démarrage
#[derive(Debug, Clone, Default)]
pub struct CheckPluginRegistry {
    plugins: BTreeMap<CheckPluginName, CheckPlugin>,
}

impl CheckPluginRegistry {
    pub fn new<I: IntoIterator<Item = CheckPlugin>>(plugins: I) -> Self {
        Self {
            plugins: plugins.into_iter().map(|p| (p.name.clone(), p)).collect(),
        }
    }

    pub fn register(&mut self, plugin: CheckPlugin) {
        self.plugins.insert(plugin.name.clone(), plugin);
    }

    /// Plugin par nom. Un nom `mgmt_*` sans entrée propre est servi par la
    /// variante management du plugin de base.
    pub fn get(&self, name: &CheckPluginName) -> Option<CheckPlugin> {
        if let Some(plugin) = self.plugins.get(name) {
            return Some(plugin.clone());
        }
        if !name.is_management_name() {
            return None;
        }
        self.plugins.get(&name.create_basic_name()).map(|basic| CheckPlugin {
            name: name.clone(),
            ..basic.clone()
        })
    }

    pub fn contains(&self, name: &CheckPluginName) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &CheckPluginName> {
        self.plugins.keys()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uptime_plugin() -> CheckPlugin {
        CheckPlugin::new("uptime", &["uptime"], |args, _ctx| {
            let seconds = args
                .section("uptime")
                .and_then(|v| v[0][0].as_str())
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| CheckError::failed("no uptime value"))?;
            Ok(vec![
                CheckOutput::result(State::Ok, format!("Up since {seconds} s")),
                CheckOutput::metric("uptime", seconds),
            ])
        })
    }

    #[test]
    fn test_management_variant_lookup() {
        let registry = CheckPluginRegistry::new([uptime_plugin()]);
        let mgmt = registry.get(&"mgmt_uptime".into()).unwrap();
        assert_eq!(mgmt.name.as_str(), "mgmt_uptime");
        assert_eq!(mgmt.sections, vec![ParsedSectionName::new("uptime")]);
        assert!(registry.get(&"mgmt_cpu".into()).is_none());
        assert!(registry.get(&"cpu".into()).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_sub_result_constructors() {
        let result = SubResult::new(State::Warn, "slow");
        assert_eq!(result.details, "slow");
        let notice = SubResult::notice(State::Ok, "only in details");
        assert!(notice.summary.is_empty());
        assert_eq!(notice.details, "only in details");
    }

    #[test]
    fn test_node_args_view() {
        let sections = SectionData::from([(ParsedSectionName::new("uptime"), None)]);
        let args = ClusterCheckArgs {
            item: None,
            params: None,
            nodes: BTreeMap::from([(HostName::new("node1"), sections.clone())]),
        };
        assert_eq!(args.node_args(&"node1".into()).unwrap().sections, sections);
        assert!(args.node_args(&"node2".into()).is_none());
    }
}
