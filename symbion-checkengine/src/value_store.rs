/*!
VALUE STORE - Mémoire persistante des plugins entre deux runs

RÔLE :
Compteurs et horodatages nécessaires aux calculs de taux. Chaque service
dispose de son propre namespace `(hôte, plugin, item, noeud?)`.

FONCTIONNEMENT :
- `ValueStoreManager::namespace` copie les valeurs du namespace dans un
  `ValueStoreNamespace` de travail
- le namespace est réécrit dans le manager quand la copie de travail est
  droppée, que le plugin ait réussi ou non
- `save` écrit tous les namespaces en JSON (fichier temporaire + rename)
*/

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::Shared;
use crate::errors::{CheckError, EngineError};
use crate::models::{HostName, ServiceId};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NamespaceKey {
    pub host: HostName,
    pub service: ServiceId,
    #[serde(default)]
    pub node: Option<HostName>,
}

impl NamespaceKey {
    pub fn new(host: HostName, service: ServiceId) -> Self {
        Self {
            host,
            service,
            node: None,
        }
    }

    pub fn with_node(&self, node: HostName) -> Self {
        Self {
            node: Some(node),
            ..self.clone()
        }
    }
}

type Namespaces = BTreeMap<NamespaceKey, BTreeMap<String, Value>>;

#[derive(Serialize, Deserialize)]
struct StoredNamespace {
    key: NamespaceKey,
    values: BTreeMap<String, Value>,
}

/// Tous les namespaces d'un run, partageables entre threads
#[derive(Debug, Clone, Default)]
pub struct ValueStoreManager {
    path: Option<PathBuf>,
    namespaces: Shared<Namespaces>,
}

impl ValueStoreManager {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Charge le fichier s'il existe, sinon démarre vide
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        let namespaces = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let stored: Vec<StoredNamespace> = serde_json::from_str(&content)?;
            stored.into_iter().map(|ns| (ns.key, ns.values)).collect()
        } else {
            debug!("[value_store] {} absent, starting empty", path.display());
            Namespaces::new()
        };
        Ok(Self {
            path: Some(path),
            namespaces: Arc::new(parking_lot::Mutex::new(namespaces)),
        })
    }

    pub fn save(&self) -> Result<(), EngineError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let stored: Vec<StoredNamespace> = self
            .namespaces
            .lock()
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(key, values)| StoredNamespace {
                key: key.clone(),
                values: values.clone(),
            })
            .collect();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&stored)?)?;
        fs::rename(&tmp, path)?;
        debug!("[value_store] saved {} namespaces to {}", stored.len(), path.display());
        Ok(())
    }

    /// Copie de travail du namespace, réécrite au drop
    pub fn namespace(&self, key: NamespaceKey) -> ValueStoreNamespace {
        let values = self.namespaces.lock().get(&key).cloned().unwrap_or_default();
        ValueStoreNamespace {
            key,
            values,
            namespaces: Arc::clone(&self.namespaces),
        }
    }

    pub fn snapshot(&self, key: &NamespaceKey) -> Option<BTreeMap<String, Value>> {
        self.namespaces.lock().get(key).cloned()
    }
}

/// Namespace ouvert pendant l'appel d'un plugin
#[derive(Debug)]
pub struct ValueStoreNamespace {
    key: NamespaceKey,
    values: BTreeMap<String, Value>,
    namespaces: Shared<Namespaces>,
}

impl ValueStoreNamespace {
    pub fn key(&self) -> &NamespaceKey {
        &self.key
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Taux d'un compteur depuis la dernière mesure. Le premier appel, un temps
    /// qui ne progresse pas ou un compteur qui repart à zéro mémorisent la
    /// mesure et demandent d'ignorer les résultats de ce cycle.
    pub fn rate(&mut self, name: &str, time: f64, value: f64) -> Result<f64, CheckError> {
        let previous = self
            .values
            .insert(name.to_string(), json!([time, value]))
            .and_then(|stored| match stored.as_array().map(Vec::as_slice) {
                Some([t, x]) => Some((t.as_f64()?, x.as_f64()?)),
                _ => None,
            });

        let Some((last_time, last_value)) = previous else {
            return Err(CheckError::ignore(format!("Initialized: '{name}'")));
        };
        if time <= last_time {
            return Err(CheckError::ignore(format!("No time difference for '{name}'")));
        }
        if value < last_value {
            return Err(CheckError::ignore(format!("Value overflow for '{name}'")));
        }
        Ok((value - last_value) / (time - last_time))
    }
}

impl Drop for ValueStoreNamespace {
    fn drop(&mut self) {
        let values = std::mem::take(&mut self.values);
        let mut namespaces = self.namespaces.lock();
        if values.is_empty() {
            namespaces.remove(&self.key);
        } else {
            namespaces.insert(self.key.clone(), values);
        }
    }
}

/// Sauvegarde en fin de run, sans faire échouer le run
pub fn save_or_warn(manager: &ValueStoreManager) {
    if let Err(e) = manager.save() {
        warn!("[value_store] could not persist value store: {}", e);
    }
}
