//! Per-source summaries for the host result ("[agent] Success", ...).

use crate::checkresults::{ActiveCheckResult, State};
use crate::config::ExitSpec;
use crate::fetcher::{FetchError, FetcherType};
use crate::parser::ParsedSource;

/// One result per data source
pub trait Summarizer {
    fn summarize(&self, host_sections: &[ParsedSource]) -> Vec<ActiveCheckResult>;
}

impl<F> Summarizer for F
where
    F: Fn(&[ParsedSource]) -> Vec<ActiveCheckResult>,
{
    fn summarize(&self, host_sections: &[ParsedSource]) -> Vec<ActiveCheckResult> {
        self(host_sections)
    }
}

/// Maps fetch and parse outcomes to states taken from the `ExitSpec`
#[derive(Debug, Clone, Default)]
pub struct SourceSummarizer {
    pub exit_spec: ExitSpec,
}

impl SourceSummarizer {
    pub fn new(exit_spec: ExitSpec) -> Self {
        Self { exit_spec }
    }

    fn error_state(&self, error: &FetchError) -> State {
        match error {
            FetchError::Connection(_) => self.exit_spec.connection,
            FetchError::Timeout(_) => self.exit_spec.timeout,
            FetchError::EmptyOutput => self.exit_spec.empty_output,
            FetchError::Other(_) => self.exit_spec.exception,
        }
    }
}

impl Summarizer for SourceSummarizer {
    fn summarize(&self, host_sections: &[ParsedSource]) -> Vec<ActiveCheckResult> {
        host_sections
            .iter()
            .map(|(source, parsed)| match parsed {
                // SNMP devices legitimately answer nothing for unsupported tables
                Ok(sections) if sections.is_empty() && source.fetcher_type != FetcherType::Snmp => {
                    ActiveCheckResult::new(self.exit_spec.empty_output, format!("[{}] Empty output", source.ident))
                }
                Ok(_) => ActiveCheckResult::new(State::Ok, format!("[{}] Success", source.ident)),
                Err(error) => ActiveCheckResult::new(self.error_state(error), format!("[{}] {}", source.ident, error)),
            })
            .collect()
    }
}
