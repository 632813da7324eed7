//! relive kernel
//!
//! Core types shared by the live-swap runtime and its hosts:
//! - a small dynamic object model ([`Object`], [`Class`], [`Function`])
//! - the [`Callable`] / [`Constructible`] capabilities calling code uses
//! - module versions ([`Module`], [`Declaration`]) and declaration options
//! - structural equality for configuration values
//! - the host hot-reload capability ([`HotContext`])

// object model
pub mod class;
pub mod object;
pub use class::{Callable, Class, ClassBuilder, Constructible, Function, Prototype};
pub use object::{Object, WeakObject};

// exports and modules
pub mod export;
pub mod module;
pub use export::{Export, ExportKind, Target};
pub use module::{DEFAULT_EXPORT, Declaration, Module};

// options
pub mod equality;
pub mod options;
pub use options::{Configuration, SwapOptions};

// host capability
pub mod host;
pub use host::{AcceptCallback, HotContext, HotData};

// runtime configuration
pub mod config;
pub use config::RuntimeConfig;

// error module
pub mod error;
pub use error::{CallError, CallResult, SwapError, SwapResult};

pub use serde_json::Value;
