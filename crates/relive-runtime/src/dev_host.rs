//! In-process development host
//!
//! A minimal host offering the hot-reload capability per module id. It
//! drives updates the way a dev server would: the callbacks registered by
//! the outgoing version run in order against the new version, and a module
//! that asks for invalidation loses its session data.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use relive_kernel::{AcceptCallback, HotContext, HotData, Module};
use tracing::{debug, info, warn};

/// Hot-reload capability of one module.
pub struct ModuleContext {
    id: String,
    data: HotData,
    callbacks: Mutex<Vec<AcceptCallback>>,
    invalidations: Mutex<Vec<String>>,
}

impl ModuleContext {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            data: HotData::new(),
            callbacks: Mutex::new(Vec::new()),
            invalidations: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// This context as the capability handed to loaders
    pub fn hot(self: &Arc<Self>) -> Arc<dyn HotContext> {
        self.clone()
    }

    /// Start a new evaluation of this module.
    ///
    /// Callbacks registered by the previous evaluation are dropped, so each
    /// evaluation owns exactly one callback per export.
    pub fn begin_evaluation(&self) -> usize {
        let dropped = std::mem::take(&mut *self.callbacks.lock()).len();
        if dropped > 0 {
            debug!("Dropped {} stale accept callbacks for {}", dropped, self.id);
        }
        dropped
    }

    /// Callbacks waiting for the next update
    pub fn pending_callbacks(&self) -> usize {
        self.callbacks.lock().len()
    }

    /// Every invalidation reason received so far
    pub fn invalidations(&self) -> Vec<String> {
        self.invalidations.lock().clone()
    }
}

impl HotContext for ModuleContext {
    fn data(&self) -> &HotData {
        &self.data
    }

    fn accept(&self, callback: AcceptCallback) {
        self.callbacks.lock().push(callback);
    }

    fn invalidate(&self, reason: &str) {
        warn!("Module {} invalidated: {}", self.id, reason);
        self.invalidations.lock().push(reason.to_string());
    }
}

impl std::fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContext")
            .field("id", &self.id)
            .field("data", &self.data)
            .field("pending_callbacks", &self.pending_callbacks())
            .finish()
    }
}

/// Result of delivering one module version
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostUpdate {
    /// Module ID
    pub module_id: String,
    /// Callbacks run
    pub callbacks_run: usize,
    /// Invalidation reasons raised during this update
    pub invalidations: Vec<String>,
}

impl HostUpdate {
    /// Whether the update escalated to a full reload
    pub fn invalidated(&self) -> bool {
        !self.invalidations.is_empty()
    }
}

/// Development host keeping one [`ModuleContext`] per module id.
#[derive(Debug, Default)]
pub struct DevHost {
    modules: RwLock<HashMap<String, Arc<ModuleContext>>>,
}

impl DevHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context of module `id`, created on first use.
    pub fn context(&self, id: &str) -> Arc<ModuleContext> {
        if let Some(context) = self.modules.read().get(id) {
            return context.clone();
        }
        self.modules
            .write()
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(ModuleContext::new(id)))
            .clone()
    }

    /// Capability for module `id`
    pub fn hot(&self, id: &str) -> Arc<dyn HotContext> {
        self.context(id).hot()
    }

    /// Capability for a fresh evaluation of module `id`.
    pub fn evaluate(&self, id: &str) -> Arc<dyn HotContext> {
        let context = self.context(id);
        context.begin_evaluation();
        context.hot()
    }

    pub fn module_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.modules.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Discard all session state of module `id`.
    pub fn full_reload(&self, id: &str) {
        let context = self.context(id);
        info!("Full reload of module {}", id);
        context.data.clear();
        context.callbacks.lock().clear();
    }

    /// Deliver a new version of module `id`.
    ///
    /// `None` models an update that could not be resolved; the callbacks
    /// stay registered for the next attempt.
    pub async fn update(&self, id: &str, module: Option<Module>) -> HostUpdate {
        let context = self.context(id);
        let module = module.map(Arc::new);

        let callbacks: Vec<AcceptCallback> = std::mem::take(&mut *context.callbacks.lock());
        let seen = context.invalidations.lock().len();
        debug!("Running {} accept callbacks for {}", callbacks.len(), id);

        for callback in &callbacks {
            callback(module.clone()).await;
        }

        let callbacks_run = callbacks.len();
        if module.is_none() {
            let mut pending = context.callbacks.lock();
            let registered_since = std::mem::take(&mut *pending);
            *pending = callbacks;
            pending.extend(registered_since);
        }

        let invalidations: Vec<String> = context.invalidations.lock()[seen..].to_vec();
        if !invalidations.is_empty() {
            self.full_reload(id);
        }

        HostUpdate {
            module_id: id.to_string(),
            callbacks_run,
            invalidations,
        }
    }
}
