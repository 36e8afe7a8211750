/*!
Builders de données de test

- `AgentOutputBuilder` : texte d'agent `<<<section>>>` prêt à être parsé
- `HostSectionsBuilder` : `HostSections` directement, sans passer par le parser
- `ServiceBuilder` : `ConfiguredService` avec item, paramètres, période
*/

use anyhow::{Context, Result};
use serde_json::Value;
use symbion_checkengine::fetcher::{FetchedData, RawData};
use symbion_checkengine::parameters::TimespecificParameterSet;
use symbion_checkengine::parser::CacheInfo;
use symbion_checkengine::{
    ConfiguredService, FetchError, FetcherType, HostSections, SectionName, SourceInfo, SourceType,
    TimespecificParameters,
};

/// Source agent TCP d'un hôte
pub fn agent_source(host: &str) -> SourceInfo {
    SourceInfo::new(host, "agent", FetcherType::Tcp, SourceType::Host)
}

/// Source IPMI de management d'un hôte
pub fn management_source(host: &str) -> SourceInfo {
    SourceInfo::new(host, "mgmt_ipmi", FetcherType::Ipmi, SourceType::Management)
}

#[derive(Debug, Clone, Default)]
pub struct AgentOutputBuilder {
    text: String,
}

impl AgentOutputBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(mut self, name: &str, lines: &[&str]) -> Self {
        self.text.push_str(&format!("<<<{name}>>>\n"));
        self.push_lines(lines);
        self
    }

    pub fn cached_section(mut self, name: &str, lines: &[&str], retrieval_time: i64, max_age: i64) -> Self {
        self.text
            .push_str(&format!("<<<{name}:cached({retrieval_time},{max_age})>>>\n"));
        self.push_lines(lines);
        self
    }

    fn push_lines(&mut self, lines: &[&str]) {
        for line in lines {
            self.text.push_str(line);
            self.text.push('\n');
        }
    }

    pub fn build(self) -> RawData {
        self.text.into_bytes()
    }

    /// Résultat de fetch réussi pour cette source
    pub fn fetched_from(self, source: SourceInfo) -> (SourceInfo, Result<RawData, FetchError>) {
        (source, Ok(self.build()))
    }
}

/// Un seul fetch réussi, le cas le plus courant
pub fn single_agent(host: &str, output: AgentOutputBuilder) -> FetchedData {
    vec![output.fetched_from(agent_source(host))]
}

#[derive(Debug, Clone, Default)]
pub struct HostSectionsBuilder {
    sections: HostSections,
}

impl HostSectionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lignes découpées sur les espaces
    pub fn section(mut self, name: &str, lines: &[&str]) -> Self {
        self.sections.add_section(SectionName::from(name), split_lines(lines), None);
        self
    }

    pub fn cached_section(mut self, name: &str, lines: &[&str], retrieval_time: i64, max_age: i64) -> Self {
        self.sections.add_section(
            SectionName::from(name),
            split_lines(lines),
            Some(CacheInfo::new(retrieval_time, max_age)),
        );
        self
    }

    pub fn build(self) -> HostSections {
        self.sections
    }
}

fn split_lines(lines: &[&str]) -> Vec<Vec<String>> {
    lines
        .iter()
        .map(|line| line.split_whitespace().map(String::from).collect())
        .collect()
}

#[derive(Debug, Clone)]
pub struct ServiceBuilder {
    service: ConfiguredService,
}

impl ServiceBuilder {
    pub fn new(plugin: &str, description: &str) -> Self {
        Self {
            service: ConfiguredService::new(plugin, None, description),
        }
    }

    pub fn item(mut self, item: &str) -> Self {
        self.service.item = Some(item.to_string());
        self
    }

    pub fn params(mut self, params: Value) -> Self {
        self.service.parameters = TimespecificParameters::new(vec![TimespecificParameterSet::constant(params)]);
        self
    }

    pub fn timespecific(mut self, sets: Vec<TimespecificParameterSet>) -> Self {
        self.service.parameters = TimespecificParameters::new(sets);
        self
    }

    pub fn check_period(mut self, period: &str) -> Self {
        self.service.check_period = Some(period.into());
        self
    }

    pub fn enforced(mut self) -> Self {
        self.service.is_enforced = true;
        self
    }

    pub fn build(self) -> ConfiguredService {
        self.service
    }
}

/// Services d'un fichier YAML de test (liste de `ConfiguredService`)
pub fn services_from_yaml(yaml: &str) -> Result<Vec<ConfiguredService>> {
    serde_yaml::from_str(yaml).context("invalid services YAML")
}
