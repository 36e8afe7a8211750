//! Per-host service loop.
//!
//! Services are processed one at a time, in configuration order. Nothing
//! escapes as an error except cancellation (and crashes in debug mode).

use tracing::{debug, trace};

use crate::checkresults::ServiceCheckResult;
use crate::context::CancellationToken;
use crate::errors::EngineError;
use crate::invoker::{get_aggregated_result, AggregatedResult, CheckEnvironment};
use crate::kwargs::HostTopology;
use crate::models::{RunPluginNames, TimeperiodName};
use crate::plugins::CheckPluginRegistry;
use crate::services::ConfiguredService;
use crate::timeperiod::TimeperiodOracle;

/// `true` si le service a une période de check inactive en ce moment
pub fn service_outside_check_period(
    description: &str,
    period: Option<&TimeperiodName>,
    timeperiods: &dyn TimeperiodOracle,
) -> bool {
    let Some(period) = period else {
        return false;
    };
    if timeperiods.is_active(period) {
        trace!("[scheduler] service {}: time period {} is active", description, period);
        return false;
    }
    debug!(
        "[scheduler] skipping service {}: currently not in time period {}",
        description, period
    );
    true
}

/// Résultat affiché pour un service dont le plugin n'existe plus
fn not_implemented(service: &ConfiguredService) -> AggregatedResult {
    AggregatedResult {
        service: service.clone(),
        submit: true,
        data_received: true,
        result: ServiceCheckResult::check_not_implemented(),
        cache_info: None,
    }
}

/// Checke tous les services d'un hôte (ou cluster), dans l'ordre donné
pub fn check_host_services(
    topology: &HostTopology<'_>,
    env: &CheckEnvironment<'_>,
    services: &[ConfiguredService],
    plugins: &CheckPluginRegistry,
    run_plugin_names: &RunPluginNames,
    cancellation: &CancellationToken,
) -> Result<Vec<AggregatedResult>, EngineError> {
    let mut results = Vec::with_capacity(services.len());

    for service in services {
        cancellation.check()?;

        if !run_plugin_names.contains(&service.check_plugin_name) {
            trace!("[scheduler] {}: plugin {} not selected", service.description, service.check_plugin_name);
            continue;
        }

        let Some(plugin) = plugins.get(&service.check_plugin_name) else {
            results.push(not_implemented(service));
            continue;
        };

        if service_outside_check_period(&service.description, service.check_period.as_ref(), env.timeperiods) {
            continue;
        }

        results.push(get_aggregated_result(topology, env, service, &plugin)?);
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outside_check_period() {
        let oracle = |name: &str| name == "workhours";
        assert!(!service_outside_check_period("CPU", None, &oracle));
        assert!(!service_outside_check_period("CPU", Some(&"workhours".into()), &oracle));
        assert!(service_outside_check_period("CPU", Some(&"night".into()), &oracle));
    }
}
