//! Typed errors for the live-swap kernel.

use thiserror::Error;

/// Errors raised synchronously while loading an export.
///
/// Recoverable divergences between module versions (kind change, options
/// change, missing export) are not errors: they are reported to the host as
/// invalidation requests instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SwapError {
    /// The declared value is neither a function nor a class.
    #[error(
        "Unsupported kind of export `{name}` ({found}). Only classes and functions are supported."
    )]
    UnsupportedKind {
        /// Export name.
        name: String,
        /// Short description of what was found instead.
        found: &'static str,
    },

    /// Runtime configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Result type for controller operations.
pub type SwapResult<T> = Result<T, SwapError>;

/// Errors raised while calling into the object model.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum CallError {
    /// No method with this name on the object's prototype chain.
    #[error("{class}.{method} is not a function")]
    MethodNotFound { class: String, method: String },

    /// The export is not invocable.
    #[error("{0} is not callable")]
    NotCallable(String),

    /// The export cannot be constructed with `new`.
    #[error("{0} is not a constructor")]
    NotConstructible(String),

    /// An argument had the wrong shape.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A user body failed.
    #[error("{0}")]
    Thrown(String),
}

impl CallError {
    /// Shorthand for a failure raised by user code.
    pub fn thrown(message: impl Into<String>) -> Self {
        Self::Thrown(message.into())
    }
}

/// Result type for object-model calls.
pub type CallResult<T> = Result<T, CallError>;
