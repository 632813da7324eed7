//! Live objects
//!
//! An [`Object`] is a shared, identity-carrying handle to a cell of own
//! fields plus a pointer to its current implementation (prototype and
//! resolved constructor). Migration swaps that pointer in place, so every
//! clone of the handle observes the new behaviour.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::class::{Class, Constructible, Prototype};
use crate::error::{CallError, CallResult};

struct ObjectState {
    fields: Map<String, Value>,
    prototype: Arc<Prototype>,
    constructor: Class,
}

struct ObjectCell {
    state: RwLock<ObjectState>,
}

/// A live instance created by constructing a class.
#[derive(Clone)]
pub struct Object(Arc<ObjectCell>);

impl Object {
    /// Allocate an empty instance of `class`.
    ///
    /// The constructor body is not run; see [`crate::Constructible::construct`].
    pub fn allocate(class: &Class) -> Self {
        Self(Arc::new(ObjectCell {
            state: RwLock::new(ObjectState {
                fields: Map::new(),
                prototype: class.prototype(),
                constructor: class.clone(),
            }),
        }))
    }

    /// Read an own field.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.state.read().fields.get(key).cloned()
    }

    /// Read an own field as `i64`.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    /// Write an own field.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.0.state.write().fields.insert(key.to_string(), value.into());
    }

    /// Whether `key` is an own field.
    pub fn has_own(&self, key: &str) -> bool {
        self.0.state.read().fields.contains_key(key)
    }

    /// Snapshot of every own field.
    pub fn fields(&self) -> Map<String, Value> {
        self.0.state.read().fields.clone()
    }

    /// The prototype method lookups currently resolve against.
    pub fn prototype(&self) -> Arc<Prototype> {
        self.0.state.read().prototype.clone()
    }

    /// The class this instance currently reports as its constructor.
    pub fn constructor(&self) -> Class {
        self.0.state.read().constructor.clone()
    }

    /// Whether this instance's prototype is `class`'s prototype.
    pub fn is_instance_of(&self, class: &Class) -> bool {
        Arc::ptr_eq(&self.prototype(), &class.prototype())
    }

    /// Dispatch `method` through the prototype chain.
    pub fn call(&self, method: &str, args: &[Value]) -> CallResult<Value> {
        // Release the lock before running user code, which may write fields.
        let prototype = self.prototype();
        let body = prototype
            .lookup(method)
            .ok_or_else(|| CallError::MethodNotFound {
                class: prototype.class_name().to_string(),
                method: method.to_string(),
            })?;
        body(self, args)
    }

    /// Copy every own field of `source` onto this object, overwriting
    /// existing values. Fields absent from `source` are left alone.
    pub fn assign(&self, source: &Object) {
        if Object::ptr_eq(self, source) {
            return;
        }
        let fields = source.fields();
        let mut state = self.0.state.write();
        for (key, value) in fields {
            state.fields.insert(key, value);
        }
    }

    /// Point this instance at `class`: prototype and constructor both.
    pub fn rebind(&self, class: &Class) {
        let mut state = self.0.state.write();
        state.prototype = class.prototype();
        state.constructor = class.clone();
    }

    /// Identity comparison.
    pub fn ptr_eq(a: &Object, b: &Object) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Non-owning back-reference.
    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Arc::downgrade(&self.0))
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        Object::ptr_eq(self, other)
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.state.read();
        f.debug_struct("Object")
            .field("class", &state.prototype.class_name())
            .field("fields", &state.fields)
            .finish()
    }
}

/// A weak back-reference to an [`Object`].
#[derive(Clone, Default)]
pub struct WeakObject(Weak<ObjectCell>);

impl WeakObject {
    /// Upgrade if the object is still alive.
    pub fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(Object)
    }

    /// Whether the object has been dropped by its owner.
    pub fn is_collected(&self) -> bool {
        self.0.strong_count() == 0
    }
}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObject")
            .field("alive", &!self.is_collected())
            .finish()
    }
}
