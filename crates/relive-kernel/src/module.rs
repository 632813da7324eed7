//! Module versions as delivered by the host

use std::collections::HashMap;

use crate::class::{Class, Function};
use crate::export::Target;
use crate::options::SwapOptions;

/// Export name used for default exports.
pub const DEFAULT_EXPORT: &str = "default";

/// One marked declaration: its target plus the options written next to it.
///
/// `options == None` is the bare call shape.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub target: Target,
    pub options: Option<SwapOptions>,
}

impl Declaration {
    pub fn new(target: impl Into<Target>) -> Self {
        Self {
            target: target.into(),
            options: None,
        }
    }

    pub fn with_options(options: SwapOptions, target: impl Into<Target>) -> Self {
        Self {
            target: target.into(),
            options: Some(options),
        }
    }
}

/// The declarations of one module version, keyed by export name.
#[derive(Debug, Clone, Default)]
pub struct Module {
    declarations: HashMap<String, Declaration>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declaration under `name`
    pub fn with(mut self, name: &str, declaration: Declaration) -> Self {
        self.declarations.insert(name.to_string(), declaration);
        self
    }

    /// Add a bare function declaration
    pub fn with_function(self, name: &str, function: Function) -> Self {
        self.with(name, Declaration::new(function))
    }

    /// Add a bare class declaration
    pub fn with_class(self, name: &str, class: Class) -> Self {
        self.with(name, Declaration::new(class))
    }

    pub fn insert(&mut self, name: &str, declaration: Declaration) {
        self.declarations.insert(name.to_string(), declaration);
    }

    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.declarations.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.declarations.contains_key(name)
    }

    /// Export names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.declarations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Declaration)> {
        self.declarations.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}
