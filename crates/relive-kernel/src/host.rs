//! Host hot-reload capability
//!
//! The runtime never decides when a module changed. It consumes this
//! per-module capability from the host:
//! - a data bag that survives reloads for the edit session
//! - registration of "module replaced" callbacks
//! - an invalidation signal forcing a full reload

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::warn;

use crate::module::Module;

/// Callback run when the host delivers a new module version, or `None` if
/// the update could not be resolved.
pub type AcceptCallback = Box<dyn Fn(Option<Arc<Module>>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Per-module hot-reload capability offered by the host.
pub trait HotContext: Send + Sync {
    /// Session data bag surviving reloads of this module.
    fn data(&self) -> &HotData;

    /// Register a callback for the next replacement of this module.
    fn accept(&self, callback: AcceptCallback);

    /// Request a full reload of the dependent graph.
    fn invalidate(&self, reason: &str);
}

/// Type-erased, namespaced storage surviving module reloads.
#[derive(Default)]
pub struct HotData {
    entries: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl HotData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the entry under `key`, creating it with `init` if absent.
    ///
    /// An entry of another type under `key` is replaced with a warning.
    pub fn get_or_insert_with<T, F>(&self, key: &str, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        if let Some(existing) = self.get::<T>(key) {
            return existing;
        }
        let mut entries = self.entries.write();
        // Re-check under the write lock.
        if let Some(existing) = entries
            .get(key)
            .and_then(|entry| entry.clone().downcast::<T>().ok())
        {
            return existing;
        }
        if entries.contains_key(key) {
            warn!("Replacing session data of another type under {}", key);
        }
        let value = Arc::new(init());
        entries.insert(key.to_string(), value.clone());
        value
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.entries
            .read()
            .get(key)
            .and_then(|entry| entry.clone().downcast::<T>().ok())
    }

    pub fn insert<T: Any + Send + Sync>(&self, key: &str, value: T) {
        self.entries.write().insert(key.to_string(), Arc::new(value));
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Drop every entry. Used by hosts performing a full reload.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for HotData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        let mut keys: Vec<&String> = entries.keys().collect();
        keys.sort();
        f.debug_struct("HotData").field("keys", &keys).finish()
    }
}
