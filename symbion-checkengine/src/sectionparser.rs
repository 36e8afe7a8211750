/*!
SECTION PARSER - Providers de sections parsées

RÔLE :
- `SectionPlugin` : transforme une section brute en valeur JSON parsée
- `SectionCatalog` : tous les plugins de section + graphe de supersession
  (validé acyclique à la construction)
- `SectionProvider` : sections parsées d'un `HostKey`, résolution par nom
- `make_providers` : construit le `ProviderRegistry` d'un run

FONCTIONNEMENT :
Le parsing est fait une seule fois dans `make_providers`. Ensuite
`resolve` n'est qu'une lecture : les providers peuvent être partagés
entre threads sans verrou.
*/

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::errors::{panic_message, EngineError};
use crate::models::{HostKey, ParsedSectionName, SectionName};
use crate::parser::{CacheInfo, HostSections, StringTable};

/// Fonction de parsing d'une section. `Ok(Value::Null)` signifie "pas de données".
pub type ParseFunction = Arc<dyn Fn(&StringTable) -> Result<Value, String> + Send + Sync>;

/// Parsing par défaut : la table de chaînes telle quelle, en tableau JSON
pub fn parse_string_table(table: &StringTable) -> Result<Value, String> {
    serde_json::to_value(table).map_err(|e| e.to_string())
}

#[derive(Clone)]
pub struct SectionPlugin {
    pub name: SectionName,
    pub parsed_section_name: ParsedSectionName,
    /// Sections brutes rendues obsolètes par celle-ci quand elle a des données
    pub supersedes: BTreeSet<SectionName>,
    pub parse_function: ParseFunction,
}

impl SectionPlugin {
    pub fn new<F>(name: impl Into<SectionName>, parse_function: F) -> Self
    where
        F: Fn(&StringTable) -> Result<Value, String> + Send + Sync + 'static,
    {
        let name = name.into();
        Self {
            parsed_section_name: ParsedSectionName::new(name.as_str()),
            name,
            supersedes: BTreeSet::new(),
            parse_function: Arc::new(parse_function),
        }
    }

    /// Plugin implicite pour une section brute sans plugin déclaré
    pub fn trivial(name: impl Into<SectionName>) -> Self {
        Self::new(name, parse_string_table)
    }

    pub fn with_parsed_section_name(mut self, parsed: impl Into<ParsedSectionName>) -> Self {
        self.parsed_section_name = parsed.into();
        self
    }

    pub fn superseding<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<SectionName>,
    {
        self.supersedes = names.into_iter().map(Into::into).collect();
        self
    }
}

impl std::fmt::Debug for SectionPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionPlugin")
            .field("name", &self.name)
            .field("parsed_section_name", &self.parsed_section_name)
            .field("supersedes", &self.supersedes)
            .finish()
    }
}

/// Catalogue des plugins de section, construit une fois au démarrage
#[derive(Debug, Default)]
pub struct SectionCatalog {
    plugins: BTreeMap<SectionName, SectionPlugin>,
    /// section -> sections qui la remplacent (inverse de `supersedes`)
    superseders: BTreeMap<SectionName, BTreeSet<SectionName>>,
}

impl SectionCatalog {
    /// Construit le catalogue et refuse tout cycle de supersession
    pub fn new<I: IntoIterator<Item = SectionPlugin>>(plugins: I) -> Result<Self, EngineError> {
        let plugins: BTreeMap<SectionName, SectionPlugin> =
            plugins.into_iter().map(|p| (p.name.clone(), p)).collect();

        if let Some(cycle) = find_supersession_cycle(&plugins) {
            return Err(EngineError::SupersessionCycle(cycle));
        }

        let mut superseders: BTreeMap<SectionName, BTreeSet<SectionName>> = BTreeMap::new();
        for plugin in plugins.values() {
            for superseded in &plugin.supersedes {
                superseders
                    .entry(superseded.clone())
                    .or_default()
                    .insert(plugin.name.clone());
            }
        }

        Ok(Self {
            plugins,
            superseders,
        })
    }

    pub fn get(&self, name: &SectionName) -> Option<&SectionPlugin> {
        self.plugins.get(name)
    }

    /// Plugin déclaré, ou plugin trivial du même nom
    pub fn plugin_for(&self, name: &SectionName) -> SectionPlugin {
        self.plugins
            .get(name)
            .cloned()
            .unwrap_or_else(|| SectionPlugin::trivial(name.clone()))
    }

    pub fn superseders_of(&self, name: &SectionName) -> impl Iterator<Item = &SectionName> {
        self.superseders.get(name).into_iter().flatten()
    }

    /// Nom parsé produit par une section brute
    pub fn parsed_section_name(&self, name: &SectionName) -> ParsedSectionName {
        self.plugins
            .get(name)
            .map(|p| p.parsed_section_name.clone())
            .unwrap_or_else(|| ParsedSectionName::new(name.as_str()))
    }
}

/// Parcours en profondeur avec pile explicite du chemin courant
fn find_supersession_cycle(plugins: &BTreeMap<SectionName, SectionPlugin>) -> Option<Vec<SectionName>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        InProgress,
        Done,
    }

    fn visit(
        name: &SectionName,
        plugins: &BTreeMap<SectionName, SectionPlugin>,
        marks: &mut BTreeMap<SectionName, Mark>,
        path: &mut Vec<SectionName>,
    ) -> Option<Vec<SectionName>> {
        match marks.get(name) {
            Some(Mark::Done) => return None,
            Some(Mark::InProgress) => {
                let start = path.iter().position(|n| n == name).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(name.clone());
                return Some(cycle);
            }
            None => {}
        }
        marks.insert(name.clone(), Mark::InProgress);
        path.push(name.clone());
        if let Some(plugin) = plugins.get(name) {
            for next in &plugin.supersedes {
                if let Some(cycle) = visit(next, plugins, marks, path) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        marks.insert(name.clone(), Mark::Done);
        None
    }

    let mut marks = BTreeMap::new();
    for name in plugins.keys() {
        let mut path = Vec::new();
        if let Some(cycle) = visit(name, plugins, &mut marks, &mut path) {
            return Some(cycle);
        }
    }
    None
}

/// Contenu parsé trouvé pour un nom de section, avec sa fraîcheur
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedResult {
    pub section_name: SectionName,
    pub parsed_data: Arc<Value>,
    pub cache_info: Option<CacheInfo>,
}

#[derive(Debug, Clone)]
struct ParsedEntry {
    parsed_section_name: ParsedSectionName,
    data: Arc<Value>,
    cache_info: Option<CacheInfo>,
}

/// Sections parsées d'un `HostKey`
#[derive(Debug, Clone)]
pub struct SectionProvider {
    host_key: HostKey,
    catalog: Arc<SectionCatalog>,
    parsed: BTreeMap<SectionName, ParsedEntry>,
    parsing_errors: Vec<String>,
}

impl SectionProvider {
    /// Parse toutes les sections brutes présentes. Les erreurs de parsing
    /// sont conservées sous forme de texte et la section est ignorée.
    pub fn new(host_key: HostKey, host_sections: &HostSections, catalog: Arc<SectionCatalog>) -> Self {
        let mut parsed = BTreeMap::new();
        let mut parsing_errors = Vec::new();

        for (name, table) in &host_sections.sections {
            let plugin = catalog.plugin_for(name);
            let outcome = catch_unwind(AssertUnwindSafe(|| (plugin.parse_function)(table)))
                .unwrap_or_else(|payload| Err(panic_message(payload.as_ref())));
            match outcome {
                Ok(Value::Null) => {
                    trace!("[providers] {}: section {} parsed to nothing", host_key, name);
                }
                Ok(data) => {
                    parsed.insert(
                        name.clone(),
                        ParsedEntry {
                            parsed_section_name: plugin.parsed_section_name.clone(),
                            data: Arc::new(data),
                            cache_info: host_sections.cache_info.get(name).copied(),
                        },
                    );
                }
                Err(error) => {
                    debug!("[providers] {}: parsing of section {} failed: {}", host_key, name, error);
                    parsing_errors.push(format!("Parsing of section {name} failed - {error}"));
                }
            }
        }

        Self {
            host_key,
            catalog,
            parsed,
            parsing_errors,
        }
    }

    pub fn host_key(&self) -> &HostKey {
        &self.host_key
    }

    fn is_superseded(&self, name: &SectionName) -> bool {
        self.catalog
            .superseders_of(name)
            .any(|superseder| self.parsed.contains_key(superseder))
    }

    /// Premier contenu disponible pour ce nom parsé, les sections
    /// remplacées par une section présente étant considérées absentes
    pub fn resolve(&self, parsed_section_name: &ParsedSectionName) -> Option<ResolvedResult> {
        self.parsed
            .iter()
            .filter(|(_, entry)| &entry.parsed_section_name == parsed_section_name)
            .find(|(name, _)| !self.is_superseded(name))
            .map(|(name, entry)| ResolvedResult {
                section_name: name.clone(),
                parsed_data: Arc::clone(&entry.data),
                cache_info: entry.cache_info,
            })
    }

    /// Erreurs de parsing de cet hôte (même liste à chaque appel)
    pub fn parsing_errors(&self) -> &[String] {
        &self.parsing_errors
    }

    /// Noms parsés disponibles, utile pour l'inventaire et les diagnostics
    pub fn available_sections(&self) -> BTreeSet<ParsedSectionName> {
        self.parsed
            .iter()
            .filter(|(name, _)| !self.is_superseded(name))
            .map(|(_, entry)| entry.parsed_section_name.clone())
            .collect()
    }
}

/// Un provider par `HostKey` ayant eu au moins un parsing réussi
pub type ProviderRegistry = BTreeMap<HostKey, SectionProvider>;

pub fn make_providers(
    host_sections: &BTreeMap<HostKey, HostSections>,
    catalog: &Arc<SectionCatalog>,
) -> ProviderRegistry {
    host_sections
        .iter()
        .map(|(key, sections)| {
            (
                key.clone(),
                SectionProvider::new(key.clone(), sections, Arc::clone(catalog)),
            )
        })
        .collect()
}
