//! Declaration options and resolved configuration

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::equality::deep_equal;

const RECONSTRUCT: &str = "reconstruct";

/// Options written at a declaration site.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwapOptions {
    /// Class only: rebuild instances from the new constructor on update and
    /// copy the fresh fields over the existing ones.
    ///
    /// If `false`, existing instances keep their fields and only gain the new
    /// methods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconstruct: Option<bool>,

    /// Any other keys; they take part in compatibility checks.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SwapOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reconstruct policy
    pub fn with_reconstruct(mut self, reconstruct: bool) -> Self {
        self.reconstruct = Some(reconstruct);
        self
    }

    /// Add an extra key.
    ///
    /// `reconstruct` is routed to the policy field; a non-boolean value for
    /// it is ignored.
    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if key == RECONSTRUCT {
            if let Some(reconstruct) = value.as_bool() {
                self.reconstruct = Some(reconstruct);
            }
            return self;
        }
        self.extra.insert(key.to_string(), value);
        self
    }
}

/// Fully resolved configuration of one export binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration(Map<String, Value>);

impl Configuration {
    /// Resolve the effective configuration for a call shape.
    ///
    /// A bare declaration resolves to `reconstruct = false`. An explicit
    /// options object merges over `reconstruct = true`.
    pub fn resolve(options: Option<&SwapOptions>) -> Self {
        let mut map = Map::new();
        match options {
            None => {
                map.insert(RECONSTRUCT.to_string(), Value::Bool(false));
            }
            Some(options) => {
                map.insert(RECONSTRUCT.to_string(), Value::Bool(true));
                for (key, value) in options.extra.iter().filter(|(key, _)| *key != RECONSTRUCT) {
                    map.insert(key.clone(), value.clone());
                }
                if let Some(reconstruct) = options.reconstruct {
                    map.insert(RECONSTRUCT.to_string(), Value::Bool(reconstruct));
                }
            }
        }
        Self(map)
    }

    pub fn reconstruct(&self) -> bool {
        self.0
            .get(RECONSTRUCT)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Structural comparison used across module versions.
    pub fn is_compatible_with(&self, other: &Configuration) -> bool {
        deep_equal(&self.to_value(), &other.to_value())
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}
