use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use symbion_checkengine::timeperiod::TimeperiodSpec;
use symbion_checkengine::{ClusterMode, ConfiguredService, EngineSettings, ExitSpec, TimeperiodName};
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CheckerConfig {
    #[serde(default)]
    pub settings: EngineSettings,
    #[serde(default)]
    pub exit_spec: ExitSpec,
    #[serde(default)]
    pub timeperiods: BTreeMap<TimeperiodName, TimeperiodSpec>,
    /// Répertoire des arbres de statut (inventaire), aucun = pas de persistance
    #[serde(default)]
    pub status_data_dir: Option<PathBuf>,
    /// Au-delà, le run de l'hôte est annulé ("Timed out")
    #[serde(default)]
    pub host_timeout_secs: Option<u64>,
    #[serde(default)]
    pub hosts: BTreeMap<String, HostConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct HostConf {
    /// Non vide = cluster virtuel sur ces noeuds
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub sources: Vec<SourceConf>,
    #[serde(default)]
    pub services: Vec<ConfiguredService>,
    /// description de service -> mode de cluster
    #[serde(default)]
    pub cluster_modes: BTreeMap<String, ClusterMode>,
    /// description de service -> hôte qui le porte (clusters)
    #[serde(default)]
    pub service_owners: BTreeMap<String, String>,
    #[serde(default)]
    pub status_data_inventory: bool,
}

impl HostConf {
    pub fn is_cluster(&self) -> bool {
        !self.nodes.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SourceConf {
    pub ident: String,
    /// Hôte dont viennent les données (noeud d'un cluster), défaut = l'hôte lui-même
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub management: bool,
    #[serde(flatten)]
    pub kind: SourceKind,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum SourceKind {
    /// Dump de sortie d'agent sur disque
    File { path: PathBuf },
    /// Commande dont la sortie standard est une sortie d'agent, ex: "ssh web01 check_mk_agent"
    Program { command: String },
}

pub async fn load_config() -> CheckerConfig {
    let path = std::env::var("SYMBION_CHECKER_CONFIG").unwrap_or_else(|_| "checker.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            return CheckerConfig::default();
        }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            warn!("[kernel] config invalide: {e}");
            CheckerConfig::default()
        })
    } else {
        warn!("[kernel] pas de {path}, usage config par défaut");
        CheckerConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let cfg: CheckerConfig = serde_yaml::from_str(
            r#"
settings:
  debug: true
host_timeout_secs: 30
exit_spec:
  missing_sections: 2
timeperiods:
  workhours:
    days:
      monday: ["08:00-18:00"]
hosts:
  web01:
    sources:
      - ident: agent
        kind: file
        path: dumps/web01.txt
      - ident: mgmt_ipmi
        management: true
        kind: program
        command: "ipmitool -H web01-bmc sensor"
    services:
      - check_plugin_name: uptime
        description: Uptime
        check_period: workhours
  cluster1:
    nodes: [web01, web02]
    cluster_modes:
      Uptime: worst
    services:
      - check_plugin_name: uptime
        description: Uptime
"#,
        )
        .unwrap();

        assert!(cfg.settings.debug);
        assert_eq!(cfg.host_timeout_secs, Some(30));
        let web01 = &cfg.hosts["web01"];
        assert!(!web01.is_cluster());
        assert_eq!(
            web01.sources[0].kind,
            SourceKind::File { path: PathBuf::from("dumps/web01.txt") }
        );
        assert!(web01.sources[1].management);
        assert_eq!(web01.services[0].check_period, Some("workhours".into()));

        let cluster = &cfg.hosts["cluster1"];
        assert!(cluster.is_cluster());
        assert_eq!(cluster.cluster_modes["Uptime"], ClusterMode::Worst);
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_defaults() {
        std::env::set_var("SYMBION_CHECKER_CONFIG", "/nonexistent/checker.yaml");
        let cfg = load_config().await;
        assert!(cfg.hosts.is_empty());
        assert_eq!(cfg.exit_spec, ExitSpec::default());
    }
}
