//! Types exchanged with the fetchers.
//!
//! Fetching itself happens outside the engine (network, SNMP, files); by the
//! time data reaches the engine every source is an in-memory `Result`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{HostKey, HostName, SourceType};

/// Octets bruts d'une source (sortie d'agent ou walk SNMP sérialisé)
pub type RawData = Vec<u8>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetcherType {
    Tcp,
    Program,
    SpecialAgent,
    Snmp,
    Ipmi,
    File,
}

/// Description of one data source of a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub hostname: HostName,
    pub ipaddress: Option<String>,
    /// Short tag shown in summaries, e.g. "agent", "snmp", "mgmt_ipmi"
    pub ident: String,
    pub fetcher_type: FetcherType,
    pub source_type: SourceType,
}

impl SourceInfo {
    pub fn new(
        hostname: impl Into<HostName>,
        ident: impl Into<String>,
        fetcher_type: FetcherType,
        source_type: SourceType,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            ipaddress: None,
            ident: ident.into(),
            fetcher_type,
            source_type,
        }
    }

    pub fn host_key(&self) -> HostKey {
        HostKey::new(self.hostname.clone(), self.source_type)
    }
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.ident, self.hostname, self.source_type)
    }
}

/// Fetch failures, kept as data
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("Communication failed: {0}")]
    Connection(String),
    #[error("Timeout after {0}s")]
    Timeout(u64),
    #[error("Empty output")]
    EmptyOutput,
    #[error("{0}")]
    Other(String),
}

/// Ce que les fetchers livrent au moteur, une entrée par source
pub type FetchedData = Vec<(SourceInfo, Result<RawData, FetchError>)>;

/// Produces the raw bytes of one source. Implementations never panic on
/// transport errors, they return a `FetchError`.
pub trait Fetcher {
    fn fetch(&self, source: &SourceInfo) -> Result<RawData, FetchError>;
}

/// Fetches every source in order
pub fn fetch_all<F: Fetcher + ?Sized>(fetcher: &F, sources: Vec<SourceInfo>) -> FetchedData {
    sources
        .into_iter()
        .map(|source| {
            let raw = fetcher.fetch(&source);
            (source, raw)
        })
        .collect()
}
