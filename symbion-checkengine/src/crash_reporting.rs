//! Crash reports for failing check plugins.
//!
//! A report captures what is needed to replay the failure: plugin name,
//! full keyword arguments, cluster flags and the raw agent payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, error};
use uuid::Uuid;

use crate::checkresults::{ServiceCheckResult, State};
use crate::context::{shared, Shared};
use crate::models::{CheckPluginName, HostName, ServiceName, SnmpBackend};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashReport {
    pub crash_id: Uuid,
    /// RFC 3339
    pub time: String,
    pub host: HostName,
    pub description: ServiceName,
    pub plugin_name: CheckPluginName,
    pub plugin_kwargs: Value,
    pub is_cluster: bool,
    pub is_enforced: bool,
    pub snmp_backend: SnmpBackend,
    /// Dernière sortie brute de l'agent, si disponible
    pub rtc_package: Option<String>,
    pub message: String,
}

/// Données de contexte d'un crash, hors identifiant et horodatage
#[derive(Debug, Clone)]
pub struct CrashContext<'a> {
    pub host: &'a HostName,
    pub description: &'a str,
    pub plugin_name: &'a CheckPluginName,
    pub plugin_kwargs: Value,
    pub is_cluster: bool,
    pub is_enforced: bool,
    pub snmp_backend: SnmpBackend,
    pub rtc_package: Option<&'a [u8]>,
}

impl CrashReport {
    pub fn new(context: CrashContext<'_>, message: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            crash_id: Uuid::new_v4(),
            time: now
                .format(&Rfc3339)
                .unwrap_or_else(|_| now.unix_timestamp().to_string()),
            host: context.host.clone(),
            description: context.description.to_string(),
            plugin_name: context.plugin_name.clone(),
            plugin_kwargs: context.plugin_kwargs,
            is_cluster: context.is_cluster,
            is_enforced: context.is_enforced,
            snmp_backend: context.snmp_backend,
            rtc_package: context
                .rtc_package
                .map(|raw| String::from_utf8_lossy(raw).into_owned()),
            message: message.into(),
        }
    }

    /// Texte du service en échec
    pub fn service_output(&self) -> String {
        format!(
            "Check failed - please submit a crash report! ({}) (Crash-ID: {})",
            self.message, self.crash_id
        )
    }

    pub fn to_result(&self) -> ServiceCheckResult {
        ServiceCheckResult::new(State::Unknown, self.service_output())
    }
}

/// Collecte les crash reports d'un run, et les écrit sur disque si un
/// répertoire est configuré
#[derive(Debug, Clone, Default)]
pub struct CrashReporter {
    crash_dir: Option<PathBuf>,
    reports: Shared<Vec<CrashReport>>,
}

impl CrashReporter {
    pub fn new(crash_dir: Option<PathBuf>) -> Self {
        Self {
            crash_dir,
            reports: shared(Vec::new()),
        }
    }

    /// Enregistre le crash et renvoie le résultat UNKNOWN du service
    pub fn report(&self, report: CrashReport) -> ServiceCheckResult {
        let result = report.to_result();
        if let Some(dir) = &self.crash_dir {
            let path = dir.join(format!("{}.json", report.crash_id));
            let written = fs::create_dir_all(dir)
                .and_then(|_| serde_json::to_vec_pretty(&report).map_err(std::io::Error::other))
                .and_then(|content| fs::write(&path, content));
            match written {
                Ok(()) => debug!("[crash] report written to {}", path.display()),
                Err(e) => error!("[crash] could not write {}: {}", path.display(), e),
            }
        }
        self.reports.lock().push(report);
        result
    }

    pub fn reports(&self) -> Vec<CrashReport> {
        self.reports.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context<'a>(host: &'a HostName, plugin: &'a CheckPluginName) -> CrashContext<'a> {
        CrashContext {
            host,
            description: "CPU load",
            plugin_name: plugin,
            plugin_kwargs: json!({"item": null}),
            is_cluster: false,
            is_enforced: true,
            snmp_backend: SnmpBackend::Inline,
            rtc_package: Some(b"<<<cpu>>>\n\xff0.1\n"),
        }
    }

    #[test]
    fn test_report_output_and_lossy_payload() {
        let host = HostName::new("web01");
        let plugin = CheckPluginName::new("cpu_loads");
        let report = CrashReport::new(context(&host, &plugin), "boom");

        let result = report.to_result();
        assert_eq!(result.state, State::Unknown);
        assert!(result.output.contains("(boom)"));
        assert!(result.output.contains(&report.crash_id.to_string()));
        assert!(report.rtc_package.unwrap().starts_with("<<<cpu>>>"));
    }

    #[test]
    fn test_reporter_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = CrashReporter::new(Some(dir.path().join("crashes")));
        let host = HostName::new("web01");
        let plugin = CheckPluginName::new("cpu_loads");

        let result = reporter.report(CrashReport::new(context(&host, &plugin), "division by zero"));
        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert!(result.output.contains("division by zero"));

        let path = dir
            .path()
            .join("crashes")
            .join(format!("{}.json", reports[0].crash_id));
        let stored: CrashReport = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(stored, reports[0]);
    }
}
