//! Forwarding of service results to whatever consumes them.

use serde::Serialize;
use tracing::{debug, info};

use crate::checkresults::ServiceCheckResult;
use crate::invoker::AggregatedResult;
use crate::models::ServiceName;
use crate::parser::CacheInfo;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submittee {
    pub description: ServiceName,
    pub result: ServiceCheckResult,
    pub cache_info: Option<CacheInfo>,
    /// Résultat à ne pas publier (pas de données, résultat ignoré)
    pub pending: bool,
}

impl From<&AggregatedResult> for Submittee {
    fn from(aggregated: &AggregatedResult) -> Self {
        Self {
            description: aggregated.service.description.clone(),
            result: aggregated.result.clone(),
            cache_info: aggregated.cache_info,
            pending: !aggregated.submit,
        }
    }
}

pub trait Submitter {
    fn submit(&self, submittees: Vec<Submittee>);
}

/// Logs every submittee; pending ones only at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSubmitter;

impl Submitter for LogSubmitter {
    fn submit(&self, submittees: Vec<Submittee>) {
        for submittee in submittees {
            if submittee.pending {
                debug!("[submit] pending {}: {}", submittee.description, submittee.result.summary());
                continue;
            }
            info!(
                "[submit] {} {} - {}",
                submittee.result.state,
                submittee.description,
                submittee.result.summary()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ConfiguredService;

    #[test]
    fn test_pending_follows_submit_flag() {
        let aggregated = AggregatedResult {
            service: ConfiguredService::new("cpu_loads", None, "CPU load"),
            submit: false,
            data_received: false,
            result: ServiceCheckResult::received_no_data(),
            cache_info: Some(CacheInfo::new(1, 2)),
        };
        let submittee = Submittee::from(&aggregated);
        assert!(submittee.pending);
        assert_eq!(submittee.description, "CPU load");
        assert_eq!(submittee.cache_info, Some(CacheInfo::new(1, 2)));
        LogSubmitter.submit(vec![submittee]);
    }
}
