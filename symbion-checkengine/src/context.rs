/*!
CONTEXT - Contexte d'exécution d'un appel de plugin

RÔLE :
- `CurrentService` : quel service est en cours (messages d'erreur des helpers)
- `CheckContext` : service courant + namespace du value store, libérés au drop
- `InvocationLocks` : au plus un appel en vol par (hôte, plugin, item)
- `CancellationToken` : interruption coopérative d'un run
*/

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::EngineError;
use crate::models::{CheckPluginName, HostName, Item, ServiceName};
use crate::value_store::{NamespaceKey, ValueStoreManager, ValueStoreNamespace};

/// État partagé entre threads
pub type Shared<T> = Arc<Mutex<T>>;

pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Service en cours de check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentService {
    pub host: HostName,
    pub description: ServiceName,
    pub plugin: CheckPluginName,
    pub item: Item,
}

impl CurrentService {
    pub fn namespace_key(&self) -> NamespaceKey {
        NamespaceKey::new(
            self.host.clone(),
            crate::models::ServiceId {
                name: self.plugin.clone(),
                item: self.item.clone(),
            },
        )
    }
}

impl std::fmt::Display for CurrentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} on {}", self.description, self.host)
    }
}

/// Contexte passé à la fonction de check. Le namespace du value store est
/// réécrit dans le manager quand le contexte est droppé.
#[derive(Debug)]
pub struct CheckContext<'a> {
    service: &'a CurrentService,
    manager: &'a ValueStoreManager,
    value_store: ValueStoreNamespace,
}

impl<'a> CheckContext<'a> {
    pub fn new(service: &'a CurrentService, manager: &'a ValueStoreManager) -> Self {
        Self {
            service,
            manager,
            value_store: manager.namespace(service.namespace_key()),
        }
    }

    /// Contexte d'un noeud de cluster, avec son propre namespace
    pub fn for_node(&self, node: &HostName) -> CheckContext<'a> {
        CheckContext {
            service: self.service,
            manager: self.manager,
            value_store: self
                .manager
                .namespace(self.service.namespace_key().with_node(node.clone())),
        }
    }

    pub fn service(&self) -> &CurrentService {
        self.service
    }

    pub fn value_store(&mut self) -> &mut ValueStoreNamespace {
        &mut self.value_store
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InvocationKey {
    host: HostName,
    plugin: CheckPluginName,
    item: Item,
}

#[derive(Debug, Default)]
struct InFlight {
    keys: Mutex<HashSet<InvocationKey>>,
    released: Condvar,
}

/// Table des appels en cours, partagée entre tous les hôtes d'un run
#[derive(Debug, Clone, Default)]
pub struct InvocationLocks {
    in_flight: Arc<InFlight>,
}

impl InvocationLocks {
    /// Bloque tant qu'un appel pour la même clé est en cours
    pub fn acquire(&self, host: &HostName, plugin: &CheckPluginName, item: &Item) -> InvocationGuard {
        let key = InvocationKey {
            host: host.clone(),
            plugin: plugin.clone(),
            item: item.clone(),
        };
        let mut keys = self.in_flight.keys.lock();
        while keys.contains(&key) {
            self.in_flight.released.wait(&mut keys);
        }
        keys.insert(key.clone());
        InvocationGuard {
            in_flight: Arc::clone(&self.in_flight),
            key,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.keys.lock().len()
    }
}

/// Libère la clé au drop
#[derive(Debug)]
pub struct InvocationGuard {
    in_flight: Arc<InFlight>,
    key: InvocationKey,
}

impl Drop for InvocationGuard {
    fn drop(&mut self) {
        self.in_flight.keys.lock().remove(&self.key);
        self.in_flight.released.notify_all();
    }
}

/// Drapeau d'annulation partagé (clonable)
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// `Err(Timeout)` une fois annulé
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Timeout)
        } else {
            Ok(())
        }
    }
}
