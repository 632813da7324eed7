//! Functions, classes and prototypes
//!
//! These are the raw implementations a module declares. Both [`Function`]
//! and [`Class`] are cheap shared handles; identity is pointer identity.
//! The capability traits [`Callable`] and [`Constructible`] are what calling
//! code programs against, so a raw implementation and a swap handle are
//! interchangeable.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::CallResult;
use crate::object::Object;

/// Method body: receives the instance and positional arguments.
pub type MethodFn = Arc<dyn Fn(&Object, &[Value]) -> CallResult<Value> + Send + Sync>;

/// Constructor body: initializes fields on a freshly allocated instance.
pub type InitFn = Arc<dyn Fn(&Object, &[Value]) -> CallResult<()> + Send + Sync>;

/// Function body: receives the calling context (if any) and arguments.
pub type FunctionBody = Arc<dyn Fn(Option<&Object>, &[Value]) -> CallResult<Value> + Send + Sync>;

/// Something that can be invoked.
pub trait Callable: Send + Sync {
    /// Invoke with an optional calling context.
    fn invoke(&self, this: Option<&Object>, args: &[Value]) -> CallResult<Value>;

    /// Invoke without a calling context.
    fn call(&self, args: &[Value]) -> CallResult<Value> {
        self.invoke(None, args)
    }
}

/// Something that can be constructed with `new`.
pub trait Constructible: Send + Sync {
    /// Allocate and initialize a new instance.
    fn construct(&self, args: &[Value]) -> CallResult<Object>;

    /// Run the constructor body on an existing instance (a `super(...)` call).
    fn initialize(&self, this: &Object, args: &[Value]) -> CallResult<()>;

    /// Prototype that instances built right now would get.
    fn prototype(&self) -> Arc<Prototype>;
}

/// Method table shared by all instances of one class version.
pub struct Prototype {
    class_name: String,
    methods: HashMap<String, MethodFn>,
    parent: Option<Arc<dyn Constructible>>,
}

impl Prototype {
    /// Name of the class that owns this prototype.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Find `name` on this prototype or up the chain.
    ///
    /// The parent is consulted through its current prototype, so a live
    /// swap handle used as a base class resolves to its newest version.
    pub fn lookup(&self, name: &str) -> Option<MethodFn> {
        if let Some(method) = self.methods.get(name) {
            return Some(method.clone());
        }
        self.parent.as_ref()?.prototype().lookup(name)
    }

    /// Whether `name` is defined on this prototype itself.
    pub fn has_own(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Names of the methods defined on this prototype itself.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prototype")
            .field("class_name", &self.class_name)
            .field("methods", &self.method_names())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

struct ClassInner {
    name: String,
    init: Option<InitFn>,
    prototype: Arc<Prototype>,
    parent: Option<Arc<dyn Constructible>>,
}

/// A class: constructor body plus prototype.
#[derive(Clone)]
pub struct Class(Arc<ClassInner>);

impl Class {
    /// Start building a class.
    pub fn builder(name: &str) -> ClassBuilder {
        ClassBuilder {
            name: name.to_string(),
            init: None,
            methods: HashMap::new(),
            parent: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Base class, if any.
    pub fn parent(&self) -> Option<Arc<dyn Constructible>> {
        self.0.parent.clone()
    }

    /// Identity comparison.
    pub fn ptr_eq(a: &Class, b: &Class) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl Constructible for Class {
    fn construct(&self, args: &[Value]) -> CallResult<Object> {
        let object = Object::allocate(self);
        self.initialize(&object, args)?;
        Ok(object)
    }

    fn initialize(&self, this: &Object, args: &[Value]) -> CallResult<()> {
        match (&self.0.init, &self.0.parent) {
            (Some(init), _) => init(this, args),
            // Implicit constructor forwards to the base class.
            (None, Some(parent)) => parent.initialize(this, args),
            (None, None) => Ok(()),
        }
    }

    fn prototype(&self) -> Arc<Prototype> {
        self.0.prototype.clone()
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.0.name)
            .field("prototype", &self.0.prototype)
            .finish()
    }
}

/// Builder for [`Class`].
pub struct ClassBuilder {
    name: String,
    init: Option<InitFn>,
    methods: HashMap<String, MethodFn>,
    parent: Option<Arc<dyn Constructible>>,
}

impl ClassBuilder {
    /// Set the constructor body.
    pub fn constructor<F>(mut self, init: F) -> Self
    where
        F: Fn(&Object, &[Value]) -> CallResult<()> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(init));
        self
    }

    /// Add a method to the prototype.
    pub fn method<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&Object, &[Value]) -> CallResult<Value> + Send + Sync + 'static,
    {
        self.methods.insert(name.to_string(), Arc::new(body));
        self
    }

    /// Inherit from `parent`. Accepts a raw class or a swap handle.
    pub fn extends<C: Constructible + 'static>(mut self, parent: C) -> Self {
        self.parent = Some(Arc::new(parent));
        self
    }

    /// Inherit from an already shared constructible, such as a class export.
    pub fn extends_shared(mut self, parent: Arc<dyn Constructible>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn build(self) -> Class {
        let prototype = Arc::new(Prototype {
            class_name: self.name.clone(),
            methods: self.methods,
            parent: self.parent.clone(),
        });
        Class(Arc::new(ClassInner {
            name: self.name,
            init: self.init,
            prototype,
            parent: self.parent,
        }))
    }
}

struct FunctionInner {
    name: String,
    body: FunctionBody,
}

/// A plain function.
#[derive(Clone)]
pub struct Function(Arc<FunctionInner>);

impl Function {
    pub fn new<F>(name: &str, body: F) -> Self
    where
        F: Fn(Option<&Object>, &[Value]) -> CallResult<Value> + Send + Sync + 'static,
    {
        Self(Arc::new(FunctionInner {
            name: name.to_string(),
            body: Arc::new(body),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Identity comparison.
    pub fn ptr_eq(a: &Function, b: &Function) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl Callable for Function {
    fn invoke(&self, this: Option<&Object>, args: &[Value]) -> CallResult<Value> {
        (self.0.body)(this, args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function").field("name", &self.0.name).finish()
    }
}
