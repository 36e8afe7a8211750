/**
 * FETCHERS - Récupération des sorties d'agents
 *
 * RÔLE : transformer la config des sources d'un hôte en `SourceInfo` et lire
 * leurs données (dump sur disque ou sortie d'une commande).
 *
 * FONCTIONNEMENT : synchrone, appelé depuis un thread bloquant par hôte.
 * Une source en échec devient une `FetchError`, jamais une erreur du run.
 */

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::process::Command;
use symbion_checkengine::fetcher::RawData;
use symbion_checkengine::{FetchError, Fetcher, FetcherType, SourceInfo, SourceType};
use tracing::debug;

use crate::config::{SourceConf, SourceKind};

/// Lit les sources déclarées dans `checker.yaml`
#[derive(Debug, Default)]
pub struct ConfiguredFetcher {
    kinds: BTreeMap<(String, String), SourceKind>,
}

impl ConfiguredFetcher {
    /// Sources d'un hôte et fetcher capable de les lire
    pub fn for_host(host: &str, sources: &[SourceConf]) -> (Self, Vec<SourceInfo>) {
        let mut fetcher = Self::default();
        let infos = sources
            .iter()
            .map(|source| {
                let hostname = source.host.clone().unwrap_or_else(|| host.to_string());
                let fetcher_type = match source.kind {
                    SourceKind::File { .. } => FetcherType::File,
                    SourceKind::Program { .. } => FetcherType::Program,
                };
                let source_type = if source.management {
                    SourceType::Management
                } else {
                    SourceType::Host
                };
                fetcher
                    .kinds
                    .insert((hostname.clone(), source.ident.clone()), source.kind.clone());
                SourceInfo::new(hostname, source.ident.clone(), fetcher_type, source_type)
            })
            .collect();
        (fetcher, infos)
    }
}

fn run_program(command: &str) -> Result<RawData, FetchError> {
    let argv = shell_words::split(command).map_err(|e| FetchError::Other(format!("invalid command: {e}")))?;
    let Some((program, args)) = argv.split_first() else {
        return Err(FetchError::Other("empty command".into()));
    };
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| FetchError::Connection(e.to_string()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FetchError::Other(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )));
    }
    Ok(output.stdout)
}

impl Fetcher for ConfiguredFetcher {
    fn fetch(&self, source: &SourceInfo) -> Result<RawData, FetchError> {
        let key = (source.hostname.to_string(), source.ident.clone());
        let Some(kind) = self.kinds.get(&key) else {
            return Err(FetchError::Other(format!("no configuration for source {source}")));
        };
        let data = match kind {
            SourceKind::File { path } => fs::read(path).map_err(|e| match e.kind() {
                ErrorKind::NotFound => FetchError::Connection(format!("{} not found", path.display())),
                _ => FetchError::Other(e.to_string()),
            })?,
            SourceKind::Program { command } => run_program(command)?,
        };
        debug!("[fetch] {}: {} bytes", source, data.len());
        if data.is_empty() {
            return Err(FetchError::EmptyOutput);
        }
        Ok(data)
    }
}
