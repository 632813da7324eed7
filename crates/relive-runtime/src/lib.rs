// =============================================================================
// relive runtime - live swapping of exported functions and classes
// =============================================================================
//
// Calling code receives a stable indirection handle instead of the raw
// function or class. When the host delivers a new module version, the handle
// is pointed at the new target and every live instance of a class is moved
// onto it in place, so references held elsewhere stay valid.
//
// Main Components:
// - Runtime / Loader: wraps each export on module evaluation
// - FunctionHandle / ClassHandle: forwarding stand-ins
// - Registry: per-session export state, kept in the host data bag
// - update: migration when a new module version arrives
// - DevHost: in-process host for development tools and tests
//
// =============================================================================

pub mod controller;
pub mod dev_host;
pub mod event;
pub mod handle;
pub mod registry;
pub mod update;

pub use controller::{Decorator, Loader, Runtime};
pub use dev_host::{DevHost, HostUpdate, ModuleContext};
pub use event::SwapEvent;
pub use handle::{ClassHandle, FunctionHandle, SwapHandle};
pub use registry::{ExportBinding, InstanceLog, InstanceRecord, Registry, RegistryStats};
pub use update::{InvalidationReason, UpdateOutcome};

// Kernel types needed to declare and call exports
pub use relive_kernel::{
    AcceptCallback, CallError, CallResult, Callable, Class, ClassBuilder, Configuration,
    Constructible, DEFAULT_EXPORT, Declaration, Export, ExportKind, Function, HotContext, HotData,
    Module, Object, RuntimeConfig, SwapError, SwapOptions, SwapResult, Target, Value,
};
