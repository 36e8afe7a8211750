/*!
AGGREGATOR - Résultat global "Check_MK" d'un run sur un hôte

Combine, dans cet ordre :
1. les résumés par source (summarizer)
2. les erreurs de parsing de tous les providers
3. l'analyse des données manquantes
avec la règle de `ActiveCheckResult::from_subresults`.

Aucune E/S, aucune erreur : tout est déjà sous forme de données.
*/

use regex::Regex;
use std::collections::BTreeSet;
use tracing::warn;

use crate::checkresults::{ActiveCheckResult, State};
use crate::config::ExitSpec;
use crate::invoker::AggregatedResult;
use crate::models::CheckPluginName;
use crate::sectionparser::ProviderRegistry;

/// Un sous-résultat par erreur de parsing : résumé = texte avant " - "
pub fn check_parsing_errors<I, S>(errors: I, error_state: State) -> Vec<ActiveCheckResult>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    errors
        .into_iter()
        .map(|error| {
            let message = error.as_ref();
            let summary = message.split(" - ").next().unwrap_or(message);
            ActiveCheckResult::new(error_state, summary).with_details([message])
        })
        .collect()
}

/// Motifs compilés des surcharges, ancrés en début de nom
fn compile_specific_patterns(spec: &[(String, State)]) -> Vec<(Regex, State)> {
    spec.iter()
        .filter_map(|(pattern, state)| match Regex::new(&format!("^(?:{pattern})")) {
            Ok(regex) => Some((regex, *state)),
            Err(e) => {
                warn!("[aggregator] ignoring invalid missing-section pattern {:?}: {}", pattern, e);
                None
            }
        })
        .collect()
}

/// État lié aux plugins qui n'ont reçu aucune donnée
pub fn check_plugins_missing_data(
    service_results: &[AggregatedResult],
    exit_spec: &ExitSpec,
) -> Vec<ActiveCheckResult> {
    if service_results.iter().all(|r| r.data_received) {
        return Vec::new();
    }
    if !service_results.iter().any(|r| r.data_received) {
        return vec![ActiveCheckResult::new(
            exit_spec.missing_sections,
            "Missing monitoring data for all plugins",
        )];
    }

    let missing: BTreeSet<&CheckPluginName> = service_results
        .iter()
        .filter(|r| !r.data_received)
        .map(|r| &r.service.check_plugin_name)
        .collect();
    let patterns = compile_specific_patterns(&exit_spec.specific_missing_sections);

    // `missing` est trié : les deux listes sortent dans l'ordre des noms
    let mut generic: Vec<&str> = Vec::new();
    let mut specific: Vec<(&str, State)> = Vec::new();
    for plugin in missing {
        match patterns.iter().find(|(regex, _)| regex.is_match(plugin.as_str())) {
            Some((_, state)) => specific.push((plugin.as_str(), *state)),
            None => generic.push(plugin.as_str()),
        }
    }

    let mut results = Vec::new();
    // Pas d'entrée "for plugins: " vide quand tous les plugins manquants
    // ont un état spécifique
    if !generic.is_empty() {
        results.push(ActiveCheckResult::new(
            exit_spec.missing_sections,
            format!("Missing monitoring data for plugins: {}", generic.join(", ")),
        ));
    }
    results.extend(
        specific
            .into_iter()
            .map(|(plugin, state)| ActiveCheckResult::new(state, plugin)),
    );
    results
}

/// Résultat global de l'hôte
pub fn aggregate_host_result(
    source_summaries: Vec<ActiveCheckResult>,
    providers: &ProviderRegistry,
    service_results: &[AggregatedResult],
    exit_spec: &ExitSpec,
) -> ActiveCheckResult {
    let parsing_errors = check_parsing_errors(
        providers.values().flat_map(|p| p.parsing_errors().iter()),
        State::Warn,
    );
    ActiveCheckResult::from_subresults(
        source_summaries
            .into_iter()
            .chain(parsing_errors)
            .chain(check_plugins_missing_data(service_results, exit_spec)),
    )
}
