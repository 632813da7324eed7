//! Declared targets and exported values

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::class::{Callable, Class, Constructible, Function, Prototype};
use crate::error::{CallError, CallResult};
use crate::object::Object;

/// Export kind, fixed at first load of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Function,
    Class,
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportKind::Function => write!(f, "function"),
            ExportKind::Class => write!(f, "class"),
        }
    }
}

/// A raw declaration as written in a module version.
#[derive(Debug, Clone)]
pub enum Target {
    Function(Function),
    Class(Class),
    /// Plain data. Never hot-swappable.
    Value(Value),
}

impl Target {
    /// Classify by declared form. `None` for anything that is not a
    /// function or class.
    pub fn kind(&self) -> Option<ExportKind> {
        match self {
            Target::Function(_) => Some(ExportKind::Function),
            Target::Class(_) => Some(ExportKind::Class),
            Target::Value(_) => None,
        }
    }

    /// Short description for diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            Target::Function(_) => "function",
            Target::Class(_) => "class",
            Target::Value(Value::Null) => "null",
            Target::Value(Value::Bool(_)) => "boolean",
            Target::Value(Value::Number(_)) => "number",
            Target::Value(Value::String(_)) => "string",
            Target::Value(Value::Array(_)) => "array",
            Target::Value(Value::Object(_)) => "object",
        }
    }
}

impl From<Function> for Target {
    fn from(f: Function) -> Self {
        Target::Function(f)
    }
}

impl From<Class> for Target {
    fn from(c: Class) -> Self {
        Target::Class(c)
    }
}

impl From<Value> for Target {
    fn from(v: Value) -> Self {
        Target::Value(v)
    }
}

/// What calling code receives for an export: the raw target in production,
/// an indirection handle during development.
#[derive(Clone)]
pub enum Export {
    Function(Arc<dyn Callable>),
    Class(Arc<dyn Constructible>),
    Value(Value),
}

impl Export {
    pub fn kind(&self) -> Option<ExportKind> {
        match self {
            Export::Function(_) => Some(ExportKind::Function),
            Export::Class(_) => Some(ExportKind::Class),
            Export::Value(_) => None,
        }
    }

    /// Whether both exports are the very same function or class allocation.
    pub fn ptr_eq(a: &Export, b: &Export) -> bool {
        match (a, b) {
            (Export::Function(x), Export::Function(y)) => {
                std::ptr::addr_eq(Arc::as_ptr(x), Arc::as_ptr(y))
            }
            (Export::Class(x), Export::Class(y)) => std::ptr::addr_eq(Arc::as_ptr(x), Arc::as_ptr(y)),
            _ => false,
        }
    }

    /// Invoke a function export.
    pub fn call(&self, args: &[Value]) -> CallResult<Value> {
        self.invoke(None, args)
    }

    /// Invoke a function export with a calling context.
    pub fn invoke(&self, this: Option<&Object>, args: &[Value]) -> CallResult<Value> {
        match self {
            Export::Function(f) => f.invoke(this, args),
            other => Err(CallError::NotCallable(other.describe())),
        }
    }

    /// Construct a class export.
    pub fn construct(&self, args: &[Value]) -> CallResult<Object> {
        match self {
            Export::Class(c) => c.construct(args),
            other => Err(CallError::NotConstructible(other.describe())),
        }
    }

    /// Prototype of a class export.
    pub fn prototype(&self) -> Option<Arc<Prototype>> {
        match self {
            Export::Class(c) => Some(c.prototype()),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Arc<dyn Callable>> {
        match self {
            Export::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_constructible(&self) -> Option<&Arc<dyn Constructible>> {
        match self {
            Export::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Export::Value(v) => Some(v),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Export::Function(_) => "function".to_string(),
            Export::Class(c) => format!("class {}", c.prototype().class_name()),
            Export::Value(v) => v.to_string(),
        }
    }
}

impl From<Target> for Export {
    fn from(target: Target) -> Self {
        match target {
            Target::Function(f) => Export::Function(Arc::new(f)),
            Target::Class(c) => Export::Class(Arc::new(c)),
            Target::Value(v) => Export::Value(v),
        }
    }
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Export({})", self.describe())
    }
}
