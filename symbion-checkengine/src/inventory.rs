/*!
INVENTORY - Données de statut HW/SW collectées pendant le check

RÔLE :
Quand un run complet est demandé, les plugins d'inventaire tournent sur les
mêmes providers que les checks. Seules leurs parties "statut" (attributs et
colonnes de tables) sont gardées, dans un `StatusDataTree` enregistré via un
`TreeStore`. Sans `status_data_inventory`, l'arbre de l'hôte est supprimé.

RÈGLES :
- un chemin est soit un noeud d'attributs, soit une table, jamais les deux
- toutes les lignes d'une table partagent les mêmes colonnes clés
Une violation est une erreur d'écriture de plugin : `ConfigurationMismatch`.
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::{shared, Shared};
use crate::errors::{panic_message, EngineError};
use crate::kwargs::get_section_kwargs;
use crate::models::{HostKey, HostName, InventoryPluginName, ParsedSectionName, SourceType};
use crate::parameters::Parameters;
use crate::plugins::SectionData;
use crate::sectionparser::ProviderRegistry;

/// Chemin dans l'arbre, ex: ["hardware", "cpu"]
pub type TreePath = Vec<String>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attributes {
    pub path: TreePath,
    pub inventory_attributes: BTreeMap<String, Value>,
    pub status_attributes: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableRow {
    pub path: TreePath,
    pub key_columns: BTreeMap<String, Value>,
    pub inventory_columns: BTreeMap<String, Value>,
    pub status_columns: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InventoryItem {
    Attributes(Attributes),
    TableRow(TableRow),
}

impl InventoryItem {
    pub fn path(&self) -> &TreePath {
        match self {
            Self::Attributes(a) => &a.path,
            Self::TableRow(r) => &r.path,
        }
    }

    fn kind(&self) -> NodeKind {
        match self {
            Self::Attributes(_) => NodeKind::Attributes,
            Self::TableRow(_) => NodeKind::Table,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Attributes,
    Table,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attributes => f.write_str("Attributes"),
            Self::Table => f.write_str("TableRow"),
        }
    }
}

/// Arguments passés à une fonction d'inventaire
#[derive(Debug, Clone)]
pub struct InventoryArgs {
    pub sections: SectionData,
    pub params: Option<Parameters>,
}

impl InventoryArgs {
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections
            .get(&ParsedSectionName::from(name))
            .and_then(|data| data.as_deref())
    }
}

pub type InventoryFunction = Arc<dyn Fn(&InventoryArgs) -> Result<Vec<InventoryItem>, String> + Send + Sync>;

#[derive(Clone)]
pub struct InventoryPlugin {
    pub name: InventoryPluginName,
    pub sections: Vec<ParsedSectionName>,
    pub inventory_function: InventoryFunction,
    pub inventory_ruleset_name: Option<String>,
}

impl InventoryPlugin {
    pub fn new<F>(name: impl Into<InventoryPluginName>, sections: &[&str], inventory_function: F) -> Self
    where
        F: Fn(&InventoryArgs) -> Result<Vec<InventoryItem>, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            sections: sections.iter().map(|s| ParsedSectionName::from(*s)).collect(),
            inventory_function: Arc::new(inventory_function),
            inventory_ruleset_name: None,
        }
    }

    pub fn with_ruleset(mut self, ruleset_name: impl Into<String>) -> Self {
        self.inventory_ruleset_name = Some(ruleset_name.into());
        self
    }
}

impl fmt::Debug for InventoryPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InventoryPlugin")
            .field("name", &self.name)
            .field("sections", &self.sections)
            .field("inventory_ruleset_name", &self.inventory_ruleset_name)
            .finish_non_exhaustive()
    }
}

pub type InventoryPluginRegistry = BTreeMap<InventoryPluginName, InventoryPlugin>;

/// Paramètres d'un plugin d'inventaire (règle `inventory_ruleset_name`)
pub type InventoryParametersFn<'a> = dyn Fn(&HostName, &InventoryPlugin) -> Parameters + 'a;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HwSwInventoryParameters {
    pub status_data_inventory: bool,
}

/// Noeud de l'arbre de statut
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusNode {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusDataTree {
    pub nodes: BTreeMap<String, StatusNode>,
}

impl StatusDataTree {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, path: &[&str]) -> Option<&StatusNode> {
        self.nodes.get(&path.join("."))
    }

    fn setdefault_node(&mut self, path: &TreePath) -> &mut StatusNode {
        self.nodes.entry(path.join(".")).or_default()
    }
}

/// Construit l'arbre de statut à partir des items de tous les plugins
pub fn create_status_data_tree<I>(items: I) -> Result<StatusDataTree, EngineError>
where
    I: IntoIterator<Item = InventoryItem>,
{
    let mut tree = StatusDataTree::default();
    let mut kinds: BTreeMap<TreePath, NodeKind> = BTreeMap::new();
    let mut table_keys: BTreeMap<TreePath, Vec<String>> = BTreeMap::new();

    for item in items {
        let expected = *kinds.entry(item.path().clone()).or_insert_with(|| item.kind());
        if expected != item.kind() {
            return Err(EngineError::ConfigurationMismatch(format!(
                "Cannot create {} at path {:?}: this is a {} node.",
                item.kind(),
                item.path(),
                expected
            )));
        }

        match item {
            InventoryItem::Attributes(attributes) => {
                if !attributes.status_attributes.is_empty() {
                    tree.setdefault_node(&attributes.path)
                        .attributes
                        .extend(attributes.status_attributes);
                }
            }
            InventoryItem::TableRow(row) => {
                let keys: Vec<String> = row.key_columns.keys().cloned().collect();
                let known = table_keys.entry(row.path.clone()).or_insert_with(|| keys.clone());
                if *known != keys {
                    return Err(EngineError::ConfigurationMismatch(format!(
                        "Table at path {:?} has key columns {:?}, got {:?}",
                        row.path, known, keys
                    )));
                }
                if row.status_columns.is_empty() {
                    continue;
                }
                let node = tree.setdefault_node(&row.path);
                node.key_columns = keys;
                let mut columns = row.key_columns;
                columns.extend(row.status_columns);
                node.rows.push(columns);
            }
        }
    }
    Ok(tree)
}

/// Persistance des arbres de statut par hôte
pub trait TreeStore {
    fn save(&self, host: &HostName, tree: &StatusDataTree) -> Result<(), EngineError>;
    fn remove(&self, host: &HostName) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTreeStore {
    trees: Shared<BTreeMap<HostName, StatusDataTree>>,
}

impl MemoryTreeStore {
    pub fn new() -> Self {
        Self { trees: shared(BTreeMap::new()) }
    }

    pub fn get(&self, host: &HostName) -> Option<StatusDataTree> {
        self.trees.lock().get(host).cloned()
    }
}

impl TreeStore for MemoryTreeStore {
    fn save(&self, host: &HostName, tree: &StatusDataTree) -> Result<(), EngineError> {
        self.trees.lock().insert(host.clone(), tree.clone());
        Ok(())
    }

    fn remove(&self, host: &HostName) -> Result<(), EngineError> {
        self.trees.lock().remove(host);
        Ok(())
    }
}

/// Un fichier JSON par hôte : `<dir>/<host>.json`
#[derive(Debug, Clone)]
pub struct FileTreeStore {
    dir: PathBuf,
}

impl FileTreeStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_of(&self, host: &HostName) -> PathBuf {
        self.dir.join(format!("{}.json", host))
    }
}

impl TreeStore for FileTreeStore {
    fn save(&self, host: &HostName, tree: &StatusDataTree) -> Result<(), EngineError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_of(host), serde_json::to_vec_pretty(tree)?)?;
        Ok(())
    }

    fn remove(&self, host: &HostName) -> Result<(), EngineError> {
        match fs::remove_file(self.path_of(host)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Exécute tous les plugins d'inventaire sur un hôte réel
pub fn inventorize_status_data_of_real_host(
    host_name: &HostName,
    providers: &ProviderRegistry,
    inventory_plugins: &InventoryPluginRegistry,
    inventory_parameters: &InventoryParametersFn<'_>,
    debug_mode: bool,
) -> Result<StatusDataTree, EngineError> {
    let mut items = Vec::new();

    for plugin in inventory_plugins.values() {
        for source_type in [SourceType::Host, SourceType::Management] {
            let host_key = HostKey::new(host_name.clone(), source_type);
            let sections = get_section_kwargs(providers, &host_key, &plugin.sections, &mut Vec::new());
            if sections.is_empty() {
                debug!("[inventory] {}: skipped (no data)", plugin.name);
                continue;
            }

            let args = InventoryArgs {
                sections,
                params: plugin
                    .inventory_ruleset_name
                    .as_ref()
                    .map(|_| inventory_parameters(host_name, plugin)),
            };
            let outcome = match catch_unwind(AssertUnwindSafe(|| (plugin.inventory_function)(&args))) {
                Ok(outcome) => outcome,
                Err(payload) if debug_mode => resume_unwind(payload),
                Err(payload) => Err(panic_message(payload.as_ref())),
            };
            match outcome {
                Ok(plugin_items) => {
                    debug!("[inventory] {}: ok", plugin.name);
                    items.extend(plugin_items);
                }
                Err(message) if debug_mode => {
                    return Err(EngineError::PluginCrash {
                        plugin: plugin.name.to_string(),
                        message,
                    });
                }
                Err(message) => warn!("[inventory] {}: failed: {}", plugin.name, message),
            }
        }
    }

    create_status_data_tree(items)
}

/// Étape d'inventaire exécutée à la fin d'un run de checks complet
pub fn do_inventory_actions_during_checking_for(
    host_name: &HostName,
    params: &HwSwInventoryParameters,
    providers: &ProviderRegistry,
    inventory_plugins: &InventoryPluginRegistry,
    inventory_parameters: &InventoryParametersFn<'_>,
    tree_store: &dyn TreeStore,
    debug_mode: bool,
) -> Result<(), EngineError> {
    if !params.status_data_inventory {
        // y compris les clusters
        return tree_store.remove(host_name);
    }

    let tree = inventorize_status_data_of_real_host(
        host_name,
        providers,
        inventory_plugins,
        inventory_parameters,
        debug_mode,
    )?;
    if !tree.is_empty() {
        info!("[inventory] saving status data of {} ({} nodes)", host_name, tree.nodes.len());
        tree_store.save(host_name, &tree)?;
    }
    Ok(())
}
