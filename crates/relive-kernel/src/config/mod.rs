//! Runtime configuration
//!
//! [`RuntimeConfig`] controls the live-swap runtime as a whole (not the
//! per-export options written at declaration sites). It can be built in code
//! or loaded from a file, with `RELIVE_*` environment variables layered on
//! top:
//!
//! ```rust,ignore
//! use relive_kernel::config::load_config;
//!
//! // relive.toml:
//! //   namespace = "my-app"
//! //   prune_collected = false
//! let config = load_config("relive.toml")?;
//! ```

use std::path::Path;

use config::{Config as Cfg, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};


/// Environment variable prefix for overrides, e.g. `RELIVE_ENABLED=false`.
pub const ENV_PREFIX: &str = "RELIVE";

/// Default data bag namespace for runtime state.
pub const DEFAULT_NAMESPACE: &str = "relive";

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Live-swap runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Master switch. When `false` every export is returned verbatim, as if
    /// the host offered no hot-reload capability.
    pub enabled: bool,
    /// Key under which runtime state is stored in the host data bag
    pub namespace: String,
    /// Drop records of instances the application already released
    pub prune_collected: bool,
    /// Capacity of the swap event broadcast channel
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: DEFAULT_NAMESPACE.to_string(),
            prune_collected: true,
            event_capacity: 256,
        }
    }
}

impl RuntimeConfig {
    /// Create new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the runtime
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the data bag namespace
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    /// Set whether collected instances are pruned during migration
    pub fn with_prune_collected(mut self, prune: bool) -> Self {
        self.prune_collected = prune;
        self
    }

    /// Set the event channel capacity
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

/// Detect configuration format from file extension
///
/// Supported: `.toml`, `.json`, `.yaml` / `.yml`.
pub fn detect_format(path: &str) -> ConfigResult<FileFormat> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Load runtime configuration from a file, with environment overrides.
pub fn load_config(path: &str) -> ConfigResult<RuntimeConfig> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    from_str(&content, format)
}

/// Load runtime configuration from a string, with environment overrides.
pub fn from_str(content: &str, format: FileFormat) -> ConfigResult<RuntimeConfig> {
    let config = Cfg::builder()
        .add_source(File::from_str(content, format))
        .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Load runtime configuration from the environment only.
pub fn from_env() -> ConfigResult<RuntimeConfig> {
    let config = Cfg::builder()
        .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}
