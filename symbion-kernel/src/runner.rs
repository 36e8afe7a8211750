/**
 * RUNNER - Un run de checks par hôte configuré
 *
 * RÔLE : monter le moteur avec les plugins intégrés et la config, puis
 * exécuter les checks d'un hôte (réel ou cluster) de bout en bout.
 *
 * FONCTIONNEMENT :
 * - registres, value store, crash reporter et verrous partagés par tous les hôtes
 * - `check_host` est bloquant : le kernel l'appelle dans `spawn_blocking`
 * - une erreur du moteur devient un résultat d'hôte (jamais un crash du kernel)
 */

use std::collections::BTreeMap;
use std::sync::Arc;
use symbion_checkengine::fetcher::fetch_all;
use symbion_checkengine::inventory::{
    FileTreeStore, HwSwInventoryParameters, InventoryPlugin, InventoryPluginRegistry, MemoryTreeStore, TreeStore,
};
use symbion_checkengine::value_store::save_or_warn;
use symbion_checkengine::{
    ActiveCheckResult, AgentParser, CancellationToken, CheckPluginRegistry, CheckingEngine, ClusterMode,
    CrashReporter, EngineError, HostCheckRequest, HostName, HostTopology, InvocationLocks, Parameters,
    RunPluginNames, SectionCatalog, SourceSummarizer, State, Submittee, Submitter, TimeperiodRegistry,
    ValueStoreManager,
};
use tracing::{debug, info, warn};

use crate::builtin;
use crate::config::{CheckerConfig, HostConf};
use crate::fetchers::ConfiguredFetcher;

/// Affiche les résultats au format "<ETAT> <service> - <résumé>"
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSubmitter;

impl StdoutSubmitter {
    pub fn render(submittee: &Submittee) -> Option<String> {
        if submittee.pending {
            return None;
        }
        Some(format!(
            "{} {} - {}",
            submittee.result.state.short_name(),
            submittee.description,
            submittee.result.summary()
        ))
    }
}

impl Submitter for StdoutSubmitter {
    fn submit(&self, submittees: Vec<Submittee>) {
        for submittee in &submittees {
            match Self::render(submittee) {
                Some(line) => println!("{line}"),
                None => debug!("[submit] pending {}", submittee.description),
            }
        }
    }
}

pub struct Checker {
    config: CheckerConfig,
    catalog: Arc<SectionCatalog>,
    check_plugins: CheckPluginRegistry,
    inventory_plugins: InventoryPluginRegistry,
    timeperiods: TimeperiodRegistry,
    value_store: ValueStoreManager,
    crash_reporter: CrashReporter,
    tree_store: Box<dyn TreeStore + Send + Sync>,
    locks: InvocationLocks,
}

impl Checker {
    pub fn new(config: CheckerConfig) -> Result<Self, EngineError> {
        let catalog = Arc::new(SectionCatalog::new(builtin::section_plugins())?);
        let timeperiods = TimeperiodRegistry::from_specs(&config.timeperiods)?;
        let value_store = match &config.settings.value_store_path {
            Some(path) => ValueStoreManager::load(path)?,
            None => ValueStoreManager::in_memory(),
        };
        let tree_store: Box<dyn TreeStore + Send + Sync> = match &config.status_data_dir {
            Some(dir) => Box::new(FileTreeStore::new(dir.clone())),
            None => Box::new(MemoryTreeStore::new()),
        };
        Ok(Self {
            catalog,
            check_plugins: builtin::check_plugins(),
            inventory_plugins: builtin::inventory_plugins(),
            timeperiods,
            value_store,
            crash_reporter: CrashReporter::new(config.settings.crash_dir.clone()),
            tree_store,
            locks: InvocationLocks::default(),
            config,
        })
    }

    pub fn host_names(&self) -> Vec<String> {
        self.config.hosts.keys().cloned().collect()
    }

    /// Hôte qui porte le service `description` du noeud `node`
    fn effective_host(&self, node: &HostName, description: &str) -> HostName {
        if let Some(owner) = self
            .config
            .hosts
            .get(node.as_str())
            .and_then(|conf| conf.service_owners.get(description))
        {
            return HostName::from(owner.as_str());
        }
        self.config
            .hosts
            .iter()
            .find(|(_, conf)| {
                conf.nodes.iter().any(|n| n == node.as_str())
                    && conf.services.iter().any(|s| s.description == description)
            })
            .map(|(cluster, _)| HostName::from(cluster.as_str()))
            .unwrap_or_else(|| node.clone())
    }

    fn cluster_mode(&self, host: &HostName, description: &str) -> ClusterMode {
        self.config
            .hosts
            .get(host.as_str())
            .and_then(|conf| conf.cluster_modes.get(description))
            .copied()
            .unwrap_or_default()
    }

    /// Run complet d'un hôte, résultat prêt à afficher
    pub fn check_host(&self, name: &str, cancellation: &CancellationToken) -> ActiveCheckResult {
        let Some(conf) = self.config.hosts.get(name) else {
            return ActiveCheckResult::new(State::Unknown, format!("Unknown host {name}"));
        };
        match self.execute(name, conf, cancellation) {
            Ok(result) => result,
            Err(EngineError::Timeout) => {
                warn!("[checker] {name}: timed out");
                ActiveCheckResult::new(self.config.exit_spec.timeout, EngineError::Timeout.to_string())
            }
            Err(e) => {
                warn!("[checker] {name}: {e}");
                ActiveCheckResult::new(self.config.exit_spec.exception, e.to_string())
            }
        }
    }

    fn execute(
        &self,
        name: &str,
        conf: &HostConf,
        cancellation: &CancellationToken,
    ) -> Result<ActiveCheckResult, EngineError> {
        let host_name = HostName::from(name);
        let nodes: Vec<HostName> = conf.nodes.iter().map(|n| HostName::from(n.as_str())).collect();

        let (fetcher, sources) = ConfiguredFetcher::for_host(name, &conf.sources);
        let fetched = fetch_all(&fetcher, sources);
        info!("[checker] {name}: fetched {} source(s)", fetched.len());

        let effective_host = |node: &HostName, description: &str| self.effective_host(node, description);
        let cluster_mode = |host: &HostName, description: &str| self.cluster_mode(host, description);
        let inventory_parameters = |_: &HostName, _: &InventoryPlugin| Parameters::default();
        let parser = AgentParser;
        let summarizer = SourceSummarizer::new(self.config.exit_spec.clone());

        let engine = CheckingEngine {
            parser: &parser,
            summarizer: &summarizer,
            submitter: &StdoutSubmitter,
            tree_store: self.tree_store.as_ref(),
            section_plugins: &self.catalog,
            check_plugins: &self.check_plugins,
            inventory_plugins: &self.inventory_plugins,
            inventory_parameters: &inventory_parameters,
            value_store: &self.value_store,
            crash_reporter: &self.crash_reporter,
            timeperiods: &self.timeperiods,
            get_effective_host: &effective_host,
            get_cluster_mode: &cluster_mode,
            locks: Some(&self.locks),
            snmp_backend: self.config.settings.snmp_backend,
            debug: self.config.settings.debug,
        };
        let request = HostCheckRequest {
            topology: HostTopology {
                host_name: &host_name,
                is_cluster: conf.is_cluster(),
                cluster_nodes: &nodes,
            },
            services: &conf.services,
            run_plugin_names: &RunPluginNames::Everything,
            exit_spec: &self.config.exit_spec,
            inventory_params: HwSwInventoryParameters {
                status_data_inventory: conf.status_data_inventory,
            },
        };
        engine.execute_checks(&request, fetched, cancellation)
    }

    /// À appeler une fois tous les hôtes traités
    pub fn finish(&self) -> usize {
        save_or_warn(&self.value_store);
        self.crash_reporter.reports().len()
    }
}

/// Code de sortie : le pire état rencontré
pub fn exit_code(results: &BTreeMap<String, ActiveCheckResult>) -> i32 {
    State::worst_of(results.values().map(|r| r.state))
        .map(|state| i32::from(state.as_u8()))
        .unwrap_or(0)
}
