//! Error types of the check engine.
//!
//! Two families:
//! - `EngineError`: hard errors that escape the engine (cancellation, debug-mode
//!   crashes, broken section graph, configuration mismatches).
//! - `CheckError`: what a check plugin function may return instead of results.
//!   Everything except `Timeout` is converted into data by the invoker.

use crate::models::SectionName;

/// Errors escaping the engine boundary
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Check timed out")]
    Timeout,
    #[error("Plugin {plugin} crashed: {message}")]
    PluginCrash { plugin: String, message: String },
    #[error("Section supersession cycle: {}", format_cycle(.0))]
    SupersessionCycle(Vec<SectionName>),
    #[error("Configuration mismatch: {0}")]
    ConfigurationMismatch(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Signal returned by a check function in place of its results
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CheckError {
    /// Le plugin demande de ne rien soumettre pour ce cycle
    #[error("{}", .0.as_deref().unwrap_or(""))]
    IgnoreResults(Option<String>),
    /// Interruption coopérative, jamais convertie en résultat
    #[error("Check timed out")]
    Timeout,
    #[error("{0}")]
    Failed(String),
}

impl CheckError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn ignore(message: impl Into<String>) -> Self {
        Self::IgnoreResults(Some(message.into()))
    }
}

/// Texte d'un panic capturé par `catch_unwind`
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn format_cycle(sections: &[SectionName]) -> String {
    sections
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}
