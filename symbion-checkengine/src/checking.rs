/*!
CHECKING - Run complet des checks d'un hôte

FONCTIONNEMENT :
1. parse des données récupérées (un résultat par source)
2. regroupement par `HostKey` des sources réussies, puis providers
3. checks des services (scheduler + invoker)
4. soumission des résultats (`pending` = résultat non soumis)
5. inventaire des données de statut, seulement pour un run complet
6. résultat global : résumés des sources, erreurs de parsing, données manquantes

Le value store n'est pas sauvegardé ici : c'est à l'appelant de le faire
une fois tous les hôtes traités.
*/

use std::sync::Arc;
use tracing::{debug, info};

use crate::aggregator::aggregate_host_result;
use crate::checkresults::ActiveCheckResult;
use crate::config::ExitSpec;
use crate::context::{CancellationToken, InvocationLocks};
use crate::crash_reporting::CrashReporter;
use crate::errors::EngineError;
use crate::fetcher::FetchedData;
use crate::inventory::{
    do_inventory_actions_during_checking_for, HwSwInventoryParameters, InventoryParametersFn,
    InventoryPluginRegistry, TreeStore,
};
use crate::invoker::{AggregatedResult, CheckEnvironment, ClusterModeFn};
use crate::kwargs::{EffectiveHostFn, HostTopology};
use crate::models::{RunPluginNames, SnmpBackend, SourceType};
use crate::parser::{group_by_host, Parser};
use crate::plugins::CheckPluginRegistry;
use crate::scheduler::check_host_services;
use crate::sectionparser::{make_providers, SectionCatalog};
use crate::services::ConfiguredService;
use crate::submitters::{Submittee, Submitter};
use crate::summarize::Summarizer;
use crate::timeperiod::TimeperiodOracle;
use crate::value_store::ValueStoreManager;

/// Ce qui change d'un hôte à l'autre
pub struct HostCheckRequest<'a> {
    pub topology: HostTopology<'a>,
    pub services: &'a [ConfiguredService],
    pub run_plugin_names: &'a RunPluginNames,
    pub exit_spec: &'a ExitSpec,
    pub inventory_params: HwSwInventoryParameters,
}

/// Collaborateurs et registres partagés par tous les hôtes d'un run
pub struct CheckingEngine<'a> {
    pub parser: &'a dyn Parser,
    pub summarizer: &'a dyn Summarizer,
    pub submitter: &'a dyn Submitter,
    pub tree_store: &'a dyn TreeStore,
    pub section_plugins: &'a Arc<SectionCatalog>,
    pub check_plugins: &'a CheckPluginRegistry,
    pub inventory_plugins: &'a InventoryPluginRegistry,
    pub inventory_parameters: &'a InventoryParametersFn<'a>,
    pub value_store: &'a ValueStoreManager,
    pub crash_reporter: &'a CrashReporter,
    pub timeperiods: &'a dyn TimeperiodOracle,
    pub get_effective_host: &'a EffectiveHostFn<'a>,
    pub get_cluster_mode: &'a ClusterModeFn<'a>,
    pub locks: Option<&'a InvocationLocks>,
    pub snmp_backend: SnmpBackend,
    pub debug: bool,
}

impl CheckingEngine<'_> {
    /// Exécute tous les checks d'un hôte et retourne son résultat global
    pub fn execute_checks(
        &self,
        request: &HostCheckRequest<'_>,
        fetched: FetchedData,
        cancellation: &CancellationToken,
    ) -> Result<ActiveCheckResult, EngineError> {
        let host_name = request.topology.host_name;
        info!("[checking] {}: {} sources, {} services", host_name, fetched.len(), request.services.len());

        // payload joint aux crash reports : dernière sortie d'agent reçue
        let rtc_package = fetched.iter().rev().find_map(|(source, raw)| match raw {
            Ok(data) if source.source_type == SourceType::Host && !data.is_empty() => Some(data.clone()),
            _ => None,
        });
        let host_sections = self.parser.parse(fetched);
        let by_host = group_by_host(
            host_sections
                .iter()
                .filter_map(|(source, parsed)| parsed.as_ref().ok().map(|s| (source.host_key(), s.clone()))),
        );
        let providers = make_providers(&by_host, self.section_plugins);
        debug!("[checking] {}: {} providers", host_name, providers.len());

        let env = CheckEnvironment {
            providers: &providers,
            value_store: self.value_store,
            crash_reporter: self.crash_reporter,
            timeperiods: self.timeperiods,
            get_effective_host: self.get_effective_host,
            get_cluster_mode: self.get_cluster_mode,
            locks: self.locks,
            snmp_backend: self.snmp_backend,
            rtc_package: rtc_package.as_deref(),
            debug: self.debug,
        };
        let service_results: Vec<AggregatedResult> = check_host_services(
            &request.topology,
            &env,
            request.services,
            self.check_plugins,
            request.run_plugin_names,
            cancellation,
        )?;

        self.submitter
            .submit(service_results.iter().map(Submittee::from).collect());

        if request.run_plugin_names.is_everything() {
            let params = if request.topology.is_cluster {
                HwSwInventoryParameters::default()
            } else {
                request.inventory_params
            };
            do_inventory_actions_during_checking_for(
                host_name,
                &params,
                &providers,
                self.inventory_plugins,
                self.inventory_parameters,
                self.tree_store,
                self.debug,
            )?;
        }

        Ok(aggregate_host_result(
            self.summarizer.summarize(&host_sections),
            &providers,
            &service_results,
            request.exit_spec,
        ))
    }
}
