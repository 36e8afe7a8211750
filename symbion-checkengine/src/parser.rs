/*!
PARSER - Découpage des données brutes en sections

RÔLE :
Transforme la sortie texte d'un agent en `HostSections` : une table de lignes
par section + les infos de cache annoncées par l'en-tête de section.

FORMAT AGENT :
```text
<<<cpu>>>
0.42 0.38 0.31 2/512 4242
<<<df:cached(1700000000,3600):sep(59)>>>
/dev/sda1;ext4;100;42
<<<>>>
```
Les blocs piggyback (`<<<<hote>>>>` ... `<<<<>>>>`) concernent d'autres hôtes
et sont ignorés ici.
*/

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

use crate::fetcher::{FetchError, FetchedData, SourceInfo};
use crate::models::{HostKey, SectionName};

/// Lignes d'une section, déjà découpées en colonnes
pub type StringTable = Vec<Vec<String>>;

/// Fraîcheur d'une section : (date de récupération, âge maximum), en secondes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInfo {
    pub retrieval_time: i64,
    pub max_age: i64,
}

impl CacheInfo {
    pub fn new(retrieval_time: i64, max_age: i64) -> Self {
        Self {
            retrieval_time,
            max_age,
        }
    }

    /// Enveloppe de fraîcheur : récupération la plus ancienne, âge max le plus grand
    pub fn aggregate<I: IntoIterator<Item = CacheInfo>>(infos: I) -> Option<CacheInfo> {
        infos.into_iter().reduce(|acc, info| CacheInfo {
            retrieval_time: acc.retrieval_time.min(info.retrieval_time),
            max_age: acc.max_age.max(info.max_age),
        })
    }
}

/// Sections brutes d'une source (ou de plusieurs sources fusionnées)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostSections {
    pub sections: BTreeMap<SectionName, StringTable>,
    pub cache_info: BTreeMap<SectionName, CacheInfo>,
}

impl HostSections {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Ajoute les lignes d'une section (étend si elle existe déjà)
    pub fn add_section(&mut self, name: SectionName, lines: StringTable, cache_info: Option<CacheInfo>) {
        self.sections.entry(name.clone()).or_default().extend(lines);
        if let Some(info) = cache_info {
            self.cache_info
                .entry(name)
                .and_modify(|existing| {
                    if info.retrieval_time < existing.retrieval_time {
                        *existing = info;
                    }
                })
                .or_insert(info);
        }
    }

    /// Fusionne une autre source du même hôte dans celle-ci
    pub fn extend(&mut self, other: HostSections) {
        let HostSections {
            sections,
            mut cache_info,
        } = other;
        for (name, lines) in sections {
            let info = cache_info.remove(&name);
            self.add_section(name, lines, info);
        }
    }
}

/// Résultat du parsing d'une source
pub type ParsedSource = (SourceInfo, Result<HostSections, FetchError>);

/// Collaborateur : transforme les données récupérées en sections. Ne lève jamais,
/// les échecs restent des `Err`.
pub trait Parser {
    fn parse(&self, fetched: FetchedData) -> Vec<ParsedSource>;
}

/// Parser par défaut pour le format texte des agents
#[derive(Debug, Clone, Default)]
pub struct AgentParser;

impl Parser for AgentParser {
    fn parse(&self, fetched: FetchedData) -> Vec<ParsedSource> {
        fetched
            .into_iter()
            .map(|(source, raw)| {
                let parsed = raw.map(|data| parse_agent_output(&String::from_utf8_lossy(&data)));
                if let Ok(sections) = &parsed {
                    trace!("[parser] {}: {} sections", source, sections.sections.len());
                }
                (source, parsed)
            })
            .collect()
    }
}

#[derive(Debug, PartialEq)]
struct SectionHeader {
    name: SectionName,
    cache_info: Option<CacheInfo>,
    separator: Option<char>,
}

fn parse_section_header(inner: &str) -> Option<SectionHeader> {
    let mut parts = inner.split(':');
    let name = parts.next().filter(|n| !n.is_empty())?;
    let mut header = SectionHeader {
        name: SectionName::new(name),
        cache_info: None,
        separator: None,
    };
    for option in parts {
        if let Some(args) = option.strip_prefix("cached(").and_then(|o| o.strip_suffix(')')) {
            let mut values = args.split(',').map(|v| v.trim().parse::<i64>());
            if let (Some(Ok(retrieval_time)), Some(Ok(max_age))) = (values.next(), values.next()) {
                header.cache_info = Some(CacheInfo::new(retrieval_time, max_age));
            }
        } else if let Some(code) = option.strip_prefix("sep(").and_then(|o| o.strip_suffix(')')) {
            header.separator = code
                .trim()
                .parse::<u8>()
                .ok()
                .map(char::from);
        }
    }
    Some(header)
}

fn split_line(line: &str, separator: Option<char>) -> Vec<String> {
    match separator {
        Some(sep) => line.split(sep).map(str::to_string).collect(),
        None => line.split_whitespace().map(str::to_string).collect(),
    }
}

/// Découpe la sortie d'un agent en sections
pub fn parse_agent_output(text: &str) -> HostSections {
    let mut host_sections = HostSections::default();
    let mut current: Option<(SectionHeader, StringTable)> = None;
    let mut in_piggyback = false;

    let flush = |current: &mut Option<(SectionHeader, StringTable)>, target: &mut HostSections| {
        if let Some((header, lines)) = current.take() {
            target.add_section(header.name, lines, header.cache_info);
        }
    };

    for line in text.lines() {
        let stripped = line.trim_end_matches('\r');

        if let Some(inner) = stripped.strip_prefix("<<<<").and_then(|l| l.strip_suffix(">>>>")) {
            flush(&mut current, &mut host_sections);
            in_piggyback = !inner.is_empty();
            continue;
        }
        if in_piggyback {
            continue;
        }
        if let Some(inner) = stripped.strip_prefix("<<<").and_then(|l| l.strip_suffix(">>>")) {
            flush(&mut current, &mut host_sections);
            current = parse_section_header(inner).map(|header| (header, Vec::new()));
            continue;
        }
        if let Some((header, lines)) = current.as_mut() {
            if stripped.trim().is_empty() {
                continue;
            }
            lines.push(split_line(stripped, header.separator));
        }
    }
    flush(&mut current, &mut host_sections);
    host_sections
}

/// Regroupe les sections par clé d'hôte. Plusieurs sources pour la même clé
/// étendent les sections au lieu de se remplacer.
pub fn group_by_host<I>(host_sections: I) -> BTreeMap<HostKey, HostSections>
where
    I: IntoIterator<Item = (HostKey, HostSections)>,
{
    let mut grouped: BTreeMap<HostKey, HostSections> = BTreeMap::new();
    for (key, sections) in host_sections {
        grouped.entry(key).or_default().extend(sections);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetcherType;
    use crate::models::SourceType;

    #[test]
    fn test_parse_sections_and_options() {
        let text = "garbage before header\n\
                    <<<cpu>>>\n\
                    0.42 0.38 0.31 2/512 4242\n\
                    <<<df:cached(1700000000,3600):sep(59)>>>\n\
                    /dev/sda1;ext4;100;42\n\
                    <<<>>>\n\
                    ignored line\n";
        let sections = parse_agent_output(text);

        assert_eq!(sections.sections.len(), 2);
        assert_eq!(sections.sections[&SectionName::new("cpu")][0][0], "0.42");
        assert_eq!(
            sections.sections[&SectionName::new("df")][0],
            vec!["/dev/sda1", "ext4", "100", "42"]
        );
        assert_eq!(
            sections.cache_info.get(&SectionName::new("df")),
            Some(&CacheInfo::new(1700000000, 3600))
        );
        assert!(sections.cache_info.get(&SectionName::new("cpu")).is_none());
    }

    #[test]
    fn test_repeated_header_extends_section() {
        let sections = parse_agent_output("<<<mem>>>\nMemTotal: 100 kB\n<<<mem>>>\nMemFree: 50 kB\n");
        assert_eq!(sections.sections[&SectionName::new("mem")].len(), 2);
    }

    #[test]
    fn test_piggyback_blocks_are_skipped() {
        let text = "<<<uptime>>>\n42\n<<<<other-host>>>>\n<<<uptime>>>\n99\n<<<<>>>>\n<<<mem>>>\nMemTotal: 1 kB\n";
        let sections = parse_agent_output(text);
        assert_eq!(sections.sections[&SectionName::new("uptime")], vec![vec!["42".to_string()]]);
        assert!(sections.sections.contains_key(&SectionName::new("mem")));
    }

    #[test]
    fn test_agent_parser_keeps_fetch_errors() {
        let ok_source = SourceInfo::new("web01", "agent", FetcherType::Tcp, SourceType::Host);
        let bad_source = SourceInfo::new("web01", "mgmt_ipmi", FetcherType::Ipmi, SourceType::Management);
        let parsed = AgentParser.parse(vec![
            (ok_source, Ok(b"<<<uptime>>>\n42\n".to_vec())),
            (bad_source, Err(FetchError::Connection("refused".into()))),
        ]);
        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].1.is_ok());
        assert_eq!(parsed[1].1, Err(FetchError::Connection("refused".into())));
    }

    #[test]
    fn test_group_by_host_extends() {
        let key = HostKey::new("web01", SourceType::Host);
        let mut first = HostSections::default();
        first.add_section("local".into(), vec![vec!["a".into()]], Some(CacheInfo::new(200, 60)));
        let mut second = HostSections::default();
        second.add_section("local".into(), vec![vec!["b".into()]], Some(CacheInfo::new(100, 30)));

        let grouped = group_by_host([(key.clone(), first), (key.clone(), second)]);
        let merged = &grouped[&key];
        assert_eq!(merged.sections[&SectionName::new("local")].len(), 2);
        assert_eq!(merged.cache_info[&SectionName::new("local")], CacheInfo::new(100, 30));
    }

    #[test]
    fn test_cache_info_aggregate() {
        let aggregated = CacheInfo::aggregate([CacheInfo::new(100, 60), CacheInfo::new(50, 30)]);
        assert_eq!(aggregated, Some(CacheInfo::new(50, 60)));
        assert_eq!(CacheInfo::aggregate(Vec::new()), None);
    }
}
