/*!
Stubs de plugins de check et de soumission

Permet de tester le moteur sans vrais plugins :
- `StubCheckPlugin` enregistre chaque appel (item, paramètres, sections, noeuds)
  et répond avec un comportement programmé
- `CollectingSubmitter` garde tout ce qui a été soumis
*/

use serde_json::Value;
use std::collections::BTreeMap;
use symbion_checkengine::context::{shared, Shared};
use symbion_checkengine::plugins::{CheckFunctionResult, ClusterCheckArgs};
use symbion_checkengine::{CheckArgs, CheckContext, CheckError, CheckOutput, CheckPlugin, State, Submittee, Submitter};

/// Un appel reçu par le stub
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub item: Option<String>,
    pub params: Option<Value>,
    /// Sections d'un appel hôte (`None` = section absente)
    pub sections: BTreeMap<String, Option<Value>>,
    /// Noeuds d'un appel de cluster natif, vide pour un appel hôte
    pub nodes: Vec<String>,
}

impl RecordedCall {
    fn from_host(args: &CheckArgs) -> Self {
        Self {
            item: args.item.clone(),
            params: args.params.as_ref().map(|p| p.to_value()),
            sections: args
                .sections
                .iter()
                .map(|(name, data)| (name.to_string(), data.as_deref().cloned()))
                .collect(),
            nodes: Vec::new(),
        }
    }

    fn from_cluster(args: &ClusterCheckArgs) -> Self {
        Self {
            item: args.item.clone(),
            params: args.params.as_ref().map(|p| p.to_value()),
            sections: BTreeMap::new(),
            nodes: args.nodes.keys().map(|n| n.to_string()).collect(),
        }
    }
}

/// Réponse programmée du stub
#[derive(Debug, Clone)]
pub enum StubBehaviour {
    Outputs(Vec<CheckOutput>),
    Error(CheckError),
    Panic(String),
}

impl StubBehaviour {
    fn run(&self) -> CheckFunctionResult {
        match self {
            Self::Outputs(outputs) => Ok(outputs.clone()),
            Self::Error(error) => Err(error.clone()),
            Self::Panic(message) => panic!("{}", message),
        }
    }
}

/// Plugin de check qui compte ses appels
#[derive(Debug, Clone)]
pub struct StubCheckPlugin {
    name: String,
    sections: Vec<String>,
    behaviour: Shared<StubBehaviour>,
    calls: Shared<Vec<RecordedCall>>,
    default_parameters: Option<Value>,
    native_cluster: bool,
}

impl StubCheckPlugin {
    /// Répond OK "stub ok" par défaut
    pub fn new(name: &str, sections: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            sections: sections.iter().map(|s| s.to_string()).collect(),
            behaviour: shared(StubBehaviour::Outputs(vec![CheckOutput::result(State::Ok, "stub ok")])),
            calls: shared(Vec::new()),
            default_parameters: None,
            native_cluster: false,
        }
    }

    pub fn returning(self, outputs: Vec<CheckOutput>) -> Self {
        self.set_behaviour(StubBehaviour::Outputs(outputs));
        self
    }

    pub fn failing(self, error: CheckError) -> Self {
        self.set_behaviour(StubBehaviour::Error(error));
        self
    }

    pub fn panicking(self, message: &str) -> Self {
        self.set_behaviour(StubBehaviour::Panic(message.to_string()));
        self
    }

    pub fn with_default_parameters(mut self, defaults: Value) -> Self {
        self.default_parameters = Some(defaults);
        self
    }

    /// Ajoute une fonction de cluster native qui enregistre les noeuds reçus
    pub fn with_native_cluster(mut self) -> Self {
        self.native_cluster = true;
        self
    }

    /// Change la réponse pour les appels suivants (plugin déjà enregistré)
    pub fn set_behaviour(&self, behaviour: StubBehaviour) {
        *self.behaviour.lock() = behaviour;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Le `CheckPlugin` à enregistrer dans le moteur
    pub fn plugin(&self) -> CheckPlugin {
        let sections: Vec<&str> = self.sections.iter().map(String::as_str).collect();
        let (behaviour, calls) = (self.behaviour.clone(), self.calls.clone());
        let mut plugin = CheckPlugin::new(self.name.as_str(), &sections, move |args: &CheckArgs, _: &mut CheckContext<'_>| {
            calls.lock().push(RecordedCall::from_host(args));
            let current = behaviour.lock().clone();
            current.run()
        });

        if self.native_cluster {
            let (behaviour, calls) = (self.behaviour.clone(), self.calls.clone());
            plugin = plugin.with_cluster_check_function(move |args: &ClusterCheckArgs, _: &mut CheckContext<'_>| {
                calls.lock().push(RecordedCall::from_cluster(args));
                let current = behaviour.lock().clone();
                current.run()
            });
        }
        if let Some(defaults) = &self.default_parameters {
            plugin = plugin.with_default_parameters(defaults.clone());
        }
        plugin
    }
}

/// Submitter de test : garde les submittees dans l'ordre de soumission
#[derive(Debug, Clone, Default)]
pub struct CollectingSubmitter {
    submitted: Shared<Vec<Submittee>>,
}

impl CollectingSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> Vec<Submittee> {
        self.submitted.lock().clone()
    }

    /// Submittee par description de service
    pub fn get(&self, description: &str) -> Option<Submittee> {
        self.submitted
            .lock()
            .iter()
            .find(|s| s.description == description)
            .cloned()
    }

    pub fn clear(&self) {
        self.submitted.lock().clear();
    }
}

impl Submitter for CollectingSubmitter {
    fn submit(&self, submittees: Vec<Submittee>) {
        log::debug!("[devkit] collected {} submittees", submittees.len());
        self.submitted.lock().extend(submittees);
    }
}
