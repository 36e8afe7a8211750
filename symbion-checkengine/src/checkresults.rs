/*!
CHECK RESULTS - États et résultats produits par le moteur

RÔLE :
- `State` : convention 0=OK, 1=WARN, 2=CRIT, 3=UNKNOWN (contrat externe, jamais renuméroté)
- `ServiceCheckResult` : un état + un texte + des métriques pour un service
- `ActiveCheckResult` : résultat agrégé du service "Check_MK" d'un hôte

L'ordre "pire état" est porté par une table de rangs explicite et non par
la valeur numérique des états.
*/

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::HostName;

/// État d'un service ou d'un sous-résultat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum State {
    #[default]
    Ok,
    Warn,
    Crit,
    Unknown,
}

/// Rang de gravité de chaque état, indexé par `State as usize`
const WORST_RANK: [u8; 4] = [
    0, // OK
    1, // WARN
    2, // CRIT
    3, // UNKNOWN
];

/// Marqueurs ajoutés aux textes quand plusieurs sous-résultats coexistent
pub const STATE_MARKERS: [&str; 4] = ["", "(!)", "(!!)", "(?)"];

impl State {
    pub const ALL: [State; 4] = [State::Ok, State::Warn, State::Crit, State::Unknown];

    fn index(self) -> usize {
        match self {
            State::Ok => 0,
            State::Warn => 1,
            State::Crit => 2,
            State::Unknown => 3,
        }
    }

    /// Rang de gravité (plus grand = pire)
    pub fn rank(self) -> u8 {
        WORST_RANK[self.index()]
    }

    /// Le pire des deux états selon la table de rangs
    pub fn worst(self, other: State) -> State {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }

    /// Le meilleur des deux états selon la table de rangs
    pub fn best(self, other: State) -> State {
        if other.rank() < self.rank() {
            other
        } else {
            self
        }
    }

    /// Pire état d'une séquence, `None` si la séquence est vide
    pub fn worst_of<I: IntoIterator<Item = State>>(states: I) -> Option<State> {
        states.into_iter().reduce(State::worst)
    }

    pub fn marker(self) -> &'static str {
        STATE_MARKERS[self.index()]
    }

    pub fn as_u8(self) -> u8 {
        self.index() as u8
    }

    pub fn short_name(self) -> &'static str {
        match self {
            State::Ok => "OK",
            State::Warn => "WARN",
            State::Crit => "CRIT",
            State::Unknown => "UNKNOWN",
        }
    }
}

impl From<State> for u8 {
    fn from(state: State) -> u8 {
        state.as_u8()
    }
}

impl TryFrom<u8> for State {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(State::Ok),
            1 => Ok(State::Warn),
            2 => Ok(State::Crit),
            3 => Ok(State::Unknown),
            other => Err(format!("invalid monitoring state: {other}")),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Ajoute le marqueur au texte sauf s'il y figure déjà
pub fn add_state_marker(text: &str, marker: &str) -> String {
    if text.contains(marker) {
        text.to_string()
    } else {
        format!("{text}{marker}")
    }
}

/// Une métrique au format perfdata : nom, valeur, seuils et bornes optionnels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTuple {
    pub name: String,
    pub value: f64,
    pub warn: Option<f64>,
    pub crit: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl MetricTuple {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            warn: None,
            crit: None,
            min: None,
            max: None,
        }
    }

    pub fn with_levels(mut self, warn: f64, crit: f64) -> Self {
        self.warn = Some(warn);
        self.crit = Some(crit);
        self
    }

    pub fn with_boundaries(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// "name=value;warn;crit;min;max", champs vides en fin retirés
    pub fn to_perfdata(&self) -> String {
        let opt = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
        let text = format!(
            "{}={};{};{};{};{}",
            self.name,
            self.value,
            opt(self.warn),
            opt(self.crit),
            opt(self.min),
            opt(self.max)
        );
        text.trim_end_matches(';').to_string()
    }
}

/// Résultat final d'un service
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceCheckResult {
    pub state: State,
    pub output: String,
    pub metrics: Vec<MetricTuple>,
}

impl ServiceCheckResult {
    pub fn new(state: State, output: impl Into<String>) -> Self {
        Self {
            state,
            output: output.into(),
            metrics: Vec::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: Vec<MetricTuple>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Le plugin n'a produit aucun sous-résultat
    pub fn item_not_found() -> Self {
        Self::new(State::Unknown, "Item not found in monitoring data")
    }

    pub fn received_no_data() -> Self {
        Self::new(State::Unknown, "Check plugin received no monitoring data")
    }

    pub fn check_not_implemented() -> Self {
        Self::new(State::Unknown, "Check plugin not implemented")
    }

    pub fn cluster_received_no_data(nodes: &[HostName]) -> Self {
        let node_hint = if nodes.is_empty() {
            "no nodes configured".to_string()
        } else {
            format!(
                "configured nodes: {}",
                nodes.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", ")
            )
        };
        Self::new(
            State::Unknown,
            format!("Clustered service received no monitoring data ({node_hint})"),
        )
    }

    /// Première ligne de l'output (le résumé)
    pub fn summary(&self) -> &str {
        self.output.lines().next().unwrap_or("")
    }
}

/// Résultat agrégé d'un run complet sur un hôte
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActiveCheckResult {
    pub state: State,
    pub summary: String,
    pub details: Vec<String>,
    pub metrics: Vec<String>,
}

impl ActiveCheckResult {
    pub fn new(state: State, summary: impl Into<String>) -> Self {
        Self {
            state,
            summary: summary.into(),
            details: Vec::new(),
            metrics: Vec::new(),
        }
    }

    pub fn with_details<I, S>(mut self, details: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.details = details.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metrics(mut self, metrics: Vec<String>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Combine des sous-résultats : pire état, résumés marqués joints par ", ",
    /// détails et métriques concaténés dans l'ordre
    pub fn from_subresults<I>(subresults: I) -> Self
    where
        I: IntoIterator<Item = ActiveCheckResult>,
    {
        let mut state = State::Ok;
        let mut summaries = Vec::new();
        let mut details = Vec::new();
        let mut metrics = Vec::new();

        for sub in subresults {
            state = state.worst(sub.state);
            if !sub.summary.is_empty() {
                summaries.push(format!("{}{}", sub.summary, sub.state.marker()));
            }
            details.extend(sub.details);
            metrics.extend(sub.metrics);
        }

        Self {
            state,
            summary: summaries.join(", "),
            details,
            metrics,
        }
    }

    /// Texte prêt pour le coeur de monitoring : "résumé | métriques" puis détails
    pub fn as_text(&self) -> String {
        let headline = if self.metrics.is_empty() {
            self.summary.clone()
        } else {
            format!("{} | {}", self.summary, self.metrics.join(" "))
        };
        std::iter::once(headline)
            .chain(self.details.iter().cloned())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
