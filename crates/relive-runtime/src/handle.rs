//! Indirection handles
//!
//! A handle stands in for a function or class and forwards every call or
//! construction to a replaceable current target. The replacement slot is
//! private to this crate; only the loader and the update path install into it.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use relive_kernel::{
    CallResult, Callable, Class, Constructible, Export, ExportKind, Function, Object, Prototype,
    Target, Value,
};
use uuid::Uuid;

use crate::registry::InstanceLog;

/// Per-session sentinel marking a construction that must not be tracked.
///
/// Randomized per session so no user argument can collide with it.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct SkipToken(Arc<str>);

impl SkipToken {
    pub(crate) fn generate() -> Self {
        Self(Arc::from(format!(
            "__relive_skip_tracking_{}__",
            Uuid::new_v4().simple()
        )))
    }

    pub(crate) fn matches(&self, arg: Option<&Value>) -> bool {
        matches!(arg, Some(Value::String(s)) if s.as_str() == &*self.0)
    }

    /// `[token, ...args]`
    pub(crate) fn prepend(&self, args: &[Value]) -> Vec<Value> {
        let mut out = Vec::with_capacity(args.len() + 1);
        out.push(Value::String(self.0.to_string()));
        out.extend_from_slice(args);
        out
    }
}

impl fmt::Debug for SkipToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SkipToken(..)")
    }
}

struct FunctionSlot {
    original: Function,
    replacement: RwLock<Option<Function>>,
}

/// Stand-in for a function export.
#[derive(Clone)]
pub struct FunctionHandle(Arc<FunctionSlot>);

impl FunctionHandle {
    pub(crate) fn new(original: Function) -> Self {
        Self(Arc::new(FunctionSlot {
            original,
            replacement: RwLock::new(None),
        }))
    }

    /// The function calls currently go to.
    pub fn current(&self) -> Function {
        self.0
            .replacement
            .read()
            .clone()
            .unwrap_or_else(|| self.0.original.clone())
    }

    /// The function the handle was created for.
    pub fn original(&self) -> &Function {
        &self.0.original
    }

    pub fn is_replaced(&self) -> bool {
        self.0.replacement.read().is_some()
    }

    pub(crate) fn install(&self, target: Function) {
        *self.0.replacement.write() = Some(target);
    }

    pub fn ptr_eq(a: &FunctionHandle, b: &FunctionHandle) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl Callable for FunctionHandle {
    fn invoke(&self, this: Option<&Object>, args: &[Value]) -> CallResult<Value> {
        self.current().invoke(this, args)
    }
}

impl fmt::Debug for FunctionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionHandle")
            .field("original", &self.0.original.name())
            .field("replaced", &self.is_replaced())
            .finish()
    }
}

struct ClassSlot {
    original: Class,
    replacement: RwLock<Option<Class>>,
    instances: Arc<InstanceLog>,
    skip: SkipToken,
}

/// Stand-in for a class export. Tracks every instance it constructs.
#[derive(Clone)]
pub struct ClassHandle(Arc<ClassSlot>);

impl ClassHandle {
    pub(crate) fn new(original: Class, instances: Arc<InstanceLog>, skip: SkipToken) -> Self {
        Self(Arc::new(ClassSlot {
            original,
            replacement: RwLock::new(None),
            instances,
            skip,
        }))
    }

    /// The class constructions currently go to.
    pub fn current(&self) -> Class {
        self.0
            .replacement
            .read()
            .clone()
            .unwrap_or_else(|| self.0.original.clone())
    }

    /// The class the handle was created for.
    pub fn original(&self) -> &Class {
        &self.0.original
    }

    pub fn is_replaced(&self) -> bool {
        self.0.replacement.read().is_some()
    }

    /// Construct through `target`.
    ///
    /// A leading skip token bypasses tracking and forwards the remaining
    /// arguments; anything else is recorded with its arguments.
    pub(crate) fn construct_with(&self, target: &Class, args: &[Value]) -> CallResult<Object> {
        if self.0.skip.matches(args.first()) {
            return target.construct(&args[1..]);
        }
        let object = target.construct(args)?;
        self.0.instances.push(&object, args);
        Ok(object)
    }

    pub(crate) fn install(&self, target: Class) {
        *self.0.replacement.write() = Some(target);
    }

    pub(crate) fn skip_token(&self) -> &SkipToken {
        &self.0.skip
    }

    pub fn ptr_eq(a: &ClassHandle, b: &ClassHandle) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl Constructible for ClassHandle {
    fn construct(&self, args: &[Value]) -> CallResult<Object> {
        let target = self.current();
        self.construct_with(&target, args)
    }

    fn initialize(&self, this: &Object, args: &[Value]) -> CallResult<()> {
        self.current().initialize(this, args)
    }

    fn prototype(&self) -> Arc<Prototype> {
        self.current().prototype()
    }
}

impl fmt::Debug for ClassHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassHandle")
            .field("original", &self.0.original.name())
            .field("replaced", &self.is_replaced())
            .field("tracked", &self.0.instances.len())
            .finish()
    }
}

/// The handle of one export binding.
#[derive(Debug, Clone)]
pub enum SwapHandle {
    Function(FunctionHandle),
    Class(ClassHandle),
}

impl SwapHandle {
    pub fn kind(&self) -> ExportKind {
        match self {
            SwapHandle::Function(_) => ExportKind::Function,
            SwapHandle::Class(_) => ExportKind::Class,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionHandle> {
        match self {
            SwapHandle::Function(h) => Some(h),
            SwapHandle::Class(_) => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassHandle> {
        match self {
            SwapHandle::Class(h) => Some(h),
            SwapHandle::Function(_) => None,
        }
    }

    pub fn is_replaced(&self) -> bool {
        match self {
            SwapHandle::Function(h) => h.is_replaced(),
            SwapHandle::Class(h) => h.is_replaced(),
        }
    }

    /// Point the handle at `target`. `false` when the kinds differ.
    pub(crate) fn install(&self, target: &Target) -> bool {
        match (self, target) {
            (SwapHandle::Function(h), Target::Function(f)) => h.install(f.clone()),
            (SwapHandle::Class(h), Target::Class(c)) => h.install(c.clone()),
            _ => return false,
        }
        true
    }

    pub(crate) fn to_export(&self) -> Export {
        match self {
            SwapHandle::Function(h) => Export::Function(Arc::new(h.clone())),
            SwapHandle::Class(h) => Export::Class(Arc::new(h.clone())),
        }
    }
}
