/*!
INVOKER - Exécution contrôlée d'une fonction de check

RÔLE :
Pour un service et son plugin :
1. Résoudre les sections (module `kwargs`), sans données -> pas d'appel
2. Calculer les paramètres finaux (si le plugin a des paramètres par défaut)
3. Appeler la fonction (ou la fonction de cluster dérivée du mode) dans un
   `CheckContext` libéré au retour, avec capture des échecs et des panics
4. Réduire les sous-résultats en un seul `ServiceCheckResult`

CONTENTION :
- `IgnoreResults` -> résultat non soumis, données reçues
- `Timeout` -> toujours propagé tel quel
- échec ou panic -> crash report + UNKNOWN, sauf en mode debug où l'erreur
  remonte (et le panic reprend)
*/

use serde::Serialize;
use serde_json::{json, Value};
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use tracing::{debug, trace};

use crate::checkresults::{add_state_marker, ServiceCheckResult, State};
use crate::cluster_mode::{get_cluster_check_function, ClusterMode};
use crate::context::{CheckContext, CurrentService, InvocationLocks};
use crate::crash_reporting::{CrashContext, CrashReport, CrashReporter};
use crate::errors::{panic_message, CheckError, EngineError};
use crate::kwargs::{get_monitoring_data_kwargs, EffectiveHostFn, HostTopology, SectionKwargs};
use crate::models::{HostName, SnmpBackend};
use crate::parameters::Parameters;
use crate::parser::CacheInfo;
use crate::plugins::{CheckArgs, CheckFunctionResult, CheckOutput, CheckPlugin, ClusterCheckArgs};
use crate::sectionparser::ProviderRegistry;
use crate::services::ConfiguredService;
use crate::timeperiod::TimeperiodOracle;
use crate::value_store::ValueStoreManager;

/// Résultat d'un service pour ce run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedResult {
    pub service: ConfiguredService,
    /// `false` = ne pas transmettre au coeur de monitoring
    pub submit: bool,
    pub data_received: bool,
    pub result: ServiceCheckResult,
    pub cache_info: Option<CacheInfo>,
}

/// Mode de cluster par (cluster, description de service)
pub type ClusterModeFn<'a> = dyn Fn(&HostName, &str) -> ClusterMode + 'a;

/// Tout ce dont l'invoker a besoin en plus du service et du plugin
pub struct CheckEnvironment<'a> {
    pub providers: &'a ProviderRegistry,
    pub value_store: &'a ValueStoreManager,
    pub crash_reporter: &'a CrashReporter,
    pub timeperiods: &'a dyn TimeperiodOracle,
    pub get_effective_host: &'a EffectiveHostFn<'a>,
    pub get_cluster_mode: &'a ClusterModeFn<'a>,
    /// Partagé entre hôtes quand plusieurs runs tournent en parallèle
    pub locks: Option<&'a InvocationLocks>,
    pub snmp_backend: SnmpBackend,
    pub rtc_package: Option<&'a [u8]>,
    pub debug: bool,
}

/// Réduit les sorties d'une fonction de check en un seul résultat
pub fn aggregate_results(outputs: Vec<CheckOutput>) -> ServiceCheckResult {
    let mut metrics = Vec::new();
    let mut results = Vec::new();
    for output in outputs {
        match output {
            CheckOutput::Metric(metric) => metrics.push(metric),
            CheckOutput::Result(result) => results.push(result),
        }
    }

    let needs_marker = results.len() > 1;
    let mut summaries = Vec::new();
    let mut details = Vec::new();
    let mut state = State::Ok;

    for result in &results {
        state = state.worst(result.state);
        let marker = if needs_marker { result.state.marker() } else { "" };
        if !result.summary.is_empty() {
            summaries.push(add_state_marker(&result.summary, marker));
        }
        details.push(add_state_marker(&result.details, marker));
    }

    if details.is_empty() {
        return ServiceCheckResult::item_not_found();
    }
    if summaries.is_empty() {
        let count = details.len();
        summaries.push(format!(
            "Everything looks OK - {count} detail{} available",
            if count == 1 { "" } else { "s" }
        ));
    }

    let text = std::iter::once(summaries.join(", "))
        .chain(details)
        .collect::<Vec<_>>()
        .join("\n");
    ServiceCheckResult::new(state, text.trim()).with_metrics(metrics)
}

enum Invocation {
    Host(CheckArgs),
    Cluster(ClusterCheckArgs),
}

impl Invocation {
    fn kwargs_json(&self) -> Value {
        let serialized = match self {
            Invocation::Host(args) => serde_json::to_value(args),
            Invocation::Cluster(args) => serde_json::to_value(args),
        };
        serialized.unwrap_or_else(|e| json!({ "error": e.to_string() }))
    }
}

/// Exécute le plugin d'un service et produit son `AggregatedResult`.
/// Seuls `Timeout` et, en mode debug, les crashs remontent en erreur.
pub fn get_aggregated_result(
    topology: &HostTopology<'_>,
    env: &CheckEnvironment<'_>,
    service: &ConfiguredService,
    plugin: &CheckPlugin,
) -> Result<AggregatedResult, EngineError> {
    let data = match get_monitoring_data_kwargs(
        topology,
        env.providers,
        service,
        &plugin.sections,
        None,
        env.get_effective_host,
    ) {
        Ok(data) => data,
        Err(no_data) => {
            trace!("[invoker] {}: no monitoring data", service.description);
            return Ok(AggregatedResult {
                service: service.clone(),
                submit: false,
                data_received: false,
                result: no_data,
                cache_info: None,
            });
        }
    };

    let params: Option<Parameters> = plugin
        .default_parameters
        .as_ref()
        .map(|defaults| service.parameters.compute(defaults, env.timeperiods));

    let invocation = match data.sections {
        SectionKwargs::Host(sections) => Invocation::Host(CheckArgs {
            item: service.item.clone(),
            params,
            sections,
        }),
        SectionKwargs::Cluster(nodes) => Invocation::Cluster(ClusterCheckArgs {
            item: service.item.clone(),
            params,
            nodes,
        }),
    };

    let current = CurrentService {
        host: topology.host_name.clone(),
        description: service.description.clone(),
        plugin: service.check_plugin_name.clone(),
        item: service.item.clone(),
    };

    let outcome = {
        let _guard = env
            .locks
            .map(|locks| locks.acquire(&current.host, &current.plugin, &current.item));
        let mut ctx = CheckContext::new(&current, env.value_store);
        let call = AssertUnwindSafe(|| -> CheckFunctionResult {
            match &invocation {
                Invocation::Host(args) => (plugin.check_function)(args, &mut ctx),
                Invocation::Cluster(args) => {
                    let mode = (env.get_cluster_mode)(topology.host_name, &service.description);
                    get_cluster_check_function(mode, plugin)(args, &mut ctx)
                }
            }
        });
        catch_unwind(call)
    };

    let message = match outcome {
        Ok(Ok(outputs)) => {
            return Ok(AggregatedResult {
                service: service.clone(),
                submit: true,
                data_received: true,
                result: aggregate_results(outputs),
                cache_info: data.cache_info,
            });
        }
        Ok(Err(CheckError::IgnoreResults(message))) => {
            let output = message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "No service summary available".to_string());
            return Ok(AggregatedResult {
                service: service.clone(),
                submit: false,
                data_received: true,
                result: ServiceCheckResult::new(State::Ok, output),
                cache_info: None,
            });
        }
        Ok(Err(CheckError::Timeout)) => return Err(EngineError::Timeout),
        Ok(Err(CheckError::Failed(message))) => message,
        Err(payload) => {
            if env.debug {
                resume_unwind(payload);
            }
            panic_message(payload.as_ref())
        }
    };

    if env.debug {
        return Err(EngineError::PluginCrash {
            plugin: service.check_plugin_name.to_string(),
            message,
        });
    }

    debug!(
        "[invoker] {} crashed on {}: {}",
        service.check_plugin_name, topology.host_name, message
    );
    let report = CrashReport::new(
        CrashContext {
            host: topology.host_name,
            description: &service.description,
            plugin_name: &service.check_plugin_name,
            plugin_kwargs: invocation.kwargs_json(),
            is_cluster: topology.is_cluster,
            is_enforced: service.is_enforced,
            snmp_backend: env.snmp_backend,
            rtc_package: env.rtc_package,
        },
        message,
    );
    Ok(AggregatedResult {
        service: service.clone(),
        submit: true,
        data_received: true,
        result: env.crash_reporter.report(report),
        cache_info: data.cache_info,
    })
}
