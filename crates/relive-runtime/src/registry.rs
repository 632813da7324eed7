//! Export state store
//!
//! One [`ExportBinding`] per export name, kept in the host data bag so it
//! survives module reloads for the whole edit session.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use relive_kernel::{
    Configuration, Export, ExportKind, HotContext, Object, RuntimeConfig, Target, Value,
    WeakObject,
};
use tokio::sync::broadcast;
use tracing::debug;

use crate::event::SwapEvent;
use crate::handle::{ClassHandle, FunctionHandle, SkipToken, SwapHandle};

/// A tracked instance plus the arguments it was constructed with.
#[derive(Debug, Clone)]
pub struct InstanceRecord {
    /// Back-reference; the application owns the object.
    pub instance: WeakObject,
    pub args: Vec<Value>,
}

/// Ordered instance records of one class binding.
#[derive(Debug, Default)]
pub struct InstanceLog {
    records: Mutex<Vec<InstanceRecord>>,
}

impl InstanceLog {
    pub(crate) fn push(&self, instance: &Object, args: &[Value]) {
        self.records.lock().push(InstanceRecord {
            instance: instance.downgrade(),
            args: args.to_vec(),
        });
    }

    /// Number of records, including released instances not yet pruned.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Number of records whose instance is still alive.
    pub fn live_count(&self) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| !r.instance.is_collected())
            .count()
    }

    /// Live instances with their construction arguments, in creation order.
    pub fn live(&self) -> Vec<(Object, Vec<Value>)> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| r.instance.upgrade().map(|o| (o, r.args.clone())))
            .collect()
    }

    /// Drop records of released instances. Returns how many were dropped.
    pub fn prune(&self) -> usize {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| !r.instance.is_collected());
        before - records.len()
    }

    pub fn records(&self) -> Vec<InstanceRecord> {
        self.records.lock().clone()
    }
}

/// Live-swap state of one exported name.
#[derive(Debug)]
pub struct ExportBinding {
    name: String,
    kind: ExportKind,
    configuration: Configuration,
    instances: Arc<InstanceLog>,
    handle: SwapHandle,
    export: Export,
    swaps: AtomicU64,
}

impl ExportBinding {
    /// Create state and handle for a first load. `None` for plain values.
    pub(crate) fn create(
        name: &str,
        target: &Target,
        configuration: Configuration,
        skip: SkipToken,
    ) -> Option<Self> {
        let instances = Arc::new(InstanceLog::default());
        let handle = match target {
            Target::Function(f) => SwapHandle::Function(FunctionHandle::new(f.clone())),
            Target::Class(c) => {
                SwapHandle::Class(ClassHandle::new(c.clone(), instances.clone(), skip))
            }
            Target::Value(_) => return None,
        };
        let export = handle.to_export();
        Some(Self {
            name: name.to_string(),
            kind: handle.kind(),
            configuration,
            instances,
            handle,
            export,
            swaps: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ExportKind {
        self.kind
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn instances(&self) -> &InstanceLog {
        &self.instances
    }

    pub fn handle(&self) -> &SwapHandle {
        &self.handle
    }

    /// The value handed to calling code. Same allocation on every load.
    pub fn export(&self) -> Export {
        self.export.clone()
    }

    /// Successful swaps so far.
    pub fn swaps(&self) -> u64 {
        self.swaps.load(Ordering::Relaxed)
    }

    pub(crate) fn record_swap(&self) {
        self.swaps.fetch_add(1, Ordering::Relaxed);
    }
}

/// Per-session store of export bindings.
pub struct Registry {
    bindings: RwLock<HashMap<String, Arc<ExportBinding>>>,
    skip: SkipToken,
    event_tx: broadcast::Sender<SwapEvent>,
}

impl Registry {
    pub fn new(event_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));
        Self {
            bindings: RwLock::new(HashMap::new()),
            skip: SkipToken::generate(),
            event_tx,
        }
    }

    /// The registry stored in `hot`'s data bag, created on first use.
    pub fn for_context(hot: &dyn HotContext, config: &RuntimeConfig) -> Arc<Registry> {
        hot.data()
            .get_or_insert_with(&config.namespace, || Registry::new(config.event_capacity))
    }

    pub fn get(&self, name: &str) -> Option<Arc<ExportBinding>> {
        self.bindings.read().get(name).cloned()
    }

    /// Store `binding` unless one already exists for its name; returns the
    /// binding that ends up registered.
    pub(crate) fn bind(&self, binding: ExportBinding) -> Arc<ExportBinding> {
        let mut bindings = self.bindings.write();
        if let Some(existing) = bindings.get(binding.name()) {
            debug!("Binding for {} already registered, reusing", binding.name());
            return existing.clone();
        }
        let binding = Arc::new(binding);
        bindings.insert(binding.name().to_string(), binding.clone());
        binding
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.read().contains_key(name)
    }

    /// Bound export names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }

    /// Subscribe to swap events
    pub fn subscribe(&self) -> broadcast::Receiver<SwapEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: SwapEvent) {
        let _ = self.event_tx.send(event);
    }

    pub(crate) fn skip_token(&self) -> SkipToken {
        self.skip.clone()
    }

    /// Get registry statistics
    pub fn stats(&self) -> RegistryStats {
        let bindings = self.bindings.read();

        let mut stats = RegistryStats {
            total_bindings: bindings.len(),
            ..RegistryStats::default()
        };

        for binding in bindings.values() {
            if binding.kind() == ExportKind::Class {
                stats.class_bindings += 1;
                stats.live_instances += binding.instances().live_count();
            }
            stats.total_swaps += binding.swaps();
        }

        stats
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RuntimeConfig::default().event_capacity)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.names())
            .finish()
    }
}

/// Registry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Total export bindings
    pub total_bindings: usize,
    /// Bindings of class kind
    pub class_bindings: usize,
    /// Tracked instances still alive
    pub live_instances: usize,
    /// Successful swaps across all bindings
    pub total_swaps: u64,
}
