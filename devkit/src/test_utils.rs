/*!
Test Harness pour le moteur de checks

Facilite l'écriture de tests de bout en bout avec:
- Registres de plugins (section, check, inventaire) montés au fil de l'eau
- Périodes inactives, modes de cluster et hôtes effectifs simulés
- Submitter, value store, crash reporter et arbre de statut en mémoire
*/

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use symbion_checkengine::fetcher::FetchedData;
use symbion_checkengine::inventory::{
    HwSwInventoryParameters, InventoryPlugin, InventoryPluginRegistry, MemoryTreeStore,
};
use symbion_checkengine::{
    ActiveCheckResult, AgentParser, CancellationToken, CheckPlugin, CheckPluginRegistry,
    CheckingEngine, ClusterMode, ConfiguredService, CrashReporter, EngineError, ExitSpec, HostCheckRequest,
    HostName, HostTopology, InvocationLocks, Parameters, RunPluginNames, SectionCatalog, SectionPlugin,
    SourceSummarizer, Submittee, ValueStoreManager,
};

use crate::check_stub::CollectingSubmitter;

/// Harness de test complet pour un run de checks
pub struct TestHarness {
    pub section_plugins: Vec<SectionPlugin>,
    pub check_plugins: CheckPluginRegistry,
    pub inventory_plugins: InventoryPluginRegistry,
    pub exit_spec: ExitSpec,
    pub inventory_params: HwSwInventoryParameters,
    pub run_plugin_names: RunPluginNames,
    pub debug: bool,
    pub value_store: ValueStoreManager,
    pub crash_reporter: CrashReporter,
    pub submitter: CollectingSubmitter,
    pub tree_store: MemoryTreeStore,
    pub cancellation: CancellationToken,
    pub locks: InvocationLocks,
    inactive_periods: BTreeSet<String>,
    cluster_modes: BTreeMap<String, ClusterMode>,
    effective_hosts: BTreeMap<(String, String), HostName>,
}

impl TestHarness {
    /// Crée un nouveau harness de test
    pub fn new() -> Self {
        env_logger::try_init().ok(); // Init logging pour tests

        Self {
            section_plugins: Vec::new(),
            check_plugins: CheckPluginRegistry::default(),
            inventory_plugins: InventoryPluginRegistry::new(),
            exit_spec: ExitSpec::default(),
            inventory_params: HwSwInventoryParameters::default(),
            run_plugin_names: RunPluginNames::Everything,
            debug: false,
            value_store: ValueStoreManager::in_memory(),
            crash_reporter: CrashReporter::new(None),
            submitter: CollectingSubmitter::new(),
            tree_store: MemoryTreeStore::new(),
            cancellation: CancellationToken::new(),
            locks: InvocationLocks::default(),
            inactive_periods: BTreeSet::new(),
            cluster_modes: BTreeMap::new(),
            effective_hosts: BTreeMap::new(),
        }
    }

    pub fn with_section_plugin(mut self, plugin: SectionPlugin) -> Self {
        self.section_plugins.push(plugin);
        self
    }

    pub fn with_check_plugin(mut self, plugin: CheckPlugin) -> Self {
        self.check_plugins.register(plugin);
        self
    }

    pub fn with_inventory_plugin(mut self, plugin: InventoryPlugin) -> Self {
        self.inventory_plugins.insert(plugin.name.clone(), plugin);
        self
    }

    pub fn with_exit_spec(mut self, exit_spec: ExitSpec) -> Self {
        self.exit_spec = exit_spec;
        self
    }

    /// Période considérée inactive pendant le run (les autres sont actives)
    pub fn with_inactive_period(mut self, period: &str) -> Self {
        self.inactive_periods.insert(period.to_string());
        self
    }

    /// Mode de cluster d'un service, `native` par défaut
    pub fn with_cluster_mode(mut self, description: &str, mode: ClusterMode) -> Self {
        self.cluster_modes.insert(description.to_string(), mode);
        self
    }

    /// Le service `description` du noeud `node` appartient à `host`
    pub fn with_effective_host(mut self, node: &str, description: &str, host: &str) -> Self {
        self.effective_hosts
            .insert((node.to_string(), description.to_string()), HostName::from(host));
        self
    }

    pub fn with_run_plugin_names(mut self, names: RunPluginNames) -> Self {
        self.run_plugin_names = names;
        self
    }

    pub fn with_status_data_inventory(mut self) -> Self {
        self.inventory_params.status_data_inventory = true;
        self
    }

    pub fn debug_mode(mut self) -> Self {
        self.debug = true;
        self
    }

    /// Run complet sur un hôte réel
    pub fn run_host(
        &self,
        host: &str,
        services: &[ConfiguredService],
        fetched: FetchedData,
    ) -> Result<ActiveCheckResult, EngineError> {
        self.run(host, false, &[], services, fetched)
    }

    /// Run complet sur un cluster virtuel
    pub fn run_cluster(
        &self,
        cluster: &str,
        nodes: &[&str],
        services: &[ConfiguredService],
        fetched: FetchedData,
    ) -> Result<ActiveCheckResult, EngineError> {
        let nodes: Vec<HostName> = nodes.iter().map(|n| HostName::from(*n)).collect();
        self.run(cluster, true, &nodes, services, fetched)
    }

    fn run(
        &self,
        host: &str,
        is_cluster: bool,
        cluster_nodes: &[HostName],
        services: &[ConfiguredService],
        fetched: FetchedData,
    ) -> Result<ActiveCheckResult, EngineError> {
        let host_name = HostName::from(host);
        let catalog = Arc::new(SectionCatalog::new(self.section_plugins.clone())?);

        let timeperiods = |period: &str| !self.inactive_periods.contains(period);
        let effective_host = |node: &HostName, description: &str| {
            self.effective_hosts
                .get(&(node.to_string(), description.to_string()))
                .cloned()
                .unwrap_or_else(|| node.clone())
        };
        let cluster_mode = |_: &HostName, description: &str| {
            self.cluster_modes.get(description).copied().unwrap_or_default()
        };
        let inventory_parameters = |_: &HostName, _: &InventoryPlugin| Parameters::default();

        let parser = AgentParser;
        let summarizer = SourceSummarizer::new(self.exit_spec.clone());
        let engine = CheckingEngine {
            parser: &parser,
            summarizer: &summarizer,
            submitter: &self.submitter,
            tree_store: &self.tree_store,
            section_plugins: &catalog,
            check_plugins: &self.check_plugins,
            inventory_plugins: &self.inventory_plugins,
            inventory_parameters: &inventory_parameters,
            value_store: &self.value_store,
            crash_reporter: &self.crash_reporter,
            timeperiods: &timeperiods,
            get_effective_host: &effective_host,
            get_cluster_mode: &cluster_mode,
            locks: Some(&self.locks),
            snmp_backend: Default::default(),
            debug: self.debug,
        };
        let request = HostCheckRequest {
            topology: HostTopology {
                host_name: &host_name,
                is_cluster,
                cluster_nodes,
            },
            services,
            run_plugin_names: &self.run_plugin_names,
            exit_spec: &self.exit_spec,
            inventory_params: self.inventory_params,
        };

        let result = engine.execute_checks(&request, fetched, &self.cancellation);
        match &result {
            Ok(r) => log::info!("[harness] {}: {} {}", host, r.state, r.summary),
            Err(e) => log::warn!("[harness] {}: {}", host, e),
        }
        result
    }

    pub fn submitted(&self) -> Vec<Submittee> {
        self.submitter.submitted()
    }

    /// Submittee d'un service, panique s'il n'a pas été soumis
    pub fn submittee(&self, description: &str) -> Submittee {
        match self.submitter.get(description) {
            Some(submittee) => submittee,
            None => panic!("service {description:?} was not submitted"),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
