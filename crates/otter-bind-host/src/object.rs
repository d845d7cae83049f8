//! Objects of the host engine
//!
//! An object is reference counted. When the last reference goes away its
//! finalizers run, most-derived class first, each receiving the same
//! private slot. [`HostContext::finalize`](crate::HostContext::finalize)
//! runs them eagerly; they never run twice.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use otter_bind::PrivateData;
use otter_bind::class::ConstructHook;
use tracing::trace;

use crate::class::HostClass;
use crate::context::HostContext;
use crate::engine::HostEngine;
use crate::error::HostResult;
use crate::value::HostValue;

/// Native implementation of a callable object: `(ctx, this, args)`
pub type NativeFunction =
    Rc<dyn Fn(&HostContext, Option<&HostObject>, &[HostValue]) -> HostResult<HostValue>>;

pub(crate) enum ObjectKind {
    Plain,
    Array,
    Error,
    Function(NativeFunction),
    /// Default constructor bound to an instance class
    Constructor {
        construct: ConstructHook<HostEngine>,
        instance_class: HostClass,
    },
}

pub(crate) struct ObjectInner {
    kind: ObjectKind,
    class: Option<HostClass>,
    properties: RefCell<Vec<(String, HostValue)>>,
    private: RefCell<PrivateData>,
    methods: RefCell<HashMap<String, HostObject>>,
    finalized: Cell<bool>,
}

impl ObjectInner {
    fn run_finalizers(&self) {
        if self.finalized.replace(true) {
            return;
        }
        let Some(class) = &self.class else {
            return;
        };
        // Hooks run without any borrow of this object held.
        let mut private = self.private.borrow_mut().take();
        for class in class.chain() {
            if let Some(finalize) = &class.definition().finalize {
                trace!(class = %class.name(), "finalizing object");
                finalize(&mut private);
            }
        }
        drop(private);
    }
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        self.run_finalizers();
    }
}

/// Reference to a host object
#[derive(Clone)]
pub struct HostObject(Rc<ObjectInner>);

impl HostObject {
    pub(crate) fn new(kind: ObjectKind, class: Option<HostClass>, private: PrivateData) -> Self {
        Self(Rc::new(ObjectInner {
            kind,
            class,
            properties: RefCell::new(Vec::new()),
            private: RefCell::new(private),
            methods: RefCell::new(HashMap::new()),
            finalized: Cell::new(false),
        }))
    }

    pub(crate) fn kind(&self) -> &ObjectKind {
        &self.0.kind
    }

    pub fn class(&self) -> Option<&HostClass> {
        self.0.class.as_ref()
    }

    /// Class chain of this object, most derived first
    pub fn classes(&self) -> impl Iterator<Item = &HostClass> {
        self.0.class.iter().flat_map(HostClass::chain)
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class().map(HostClass::name)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.0.kind, ObjectKind::Function(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.0.kind, ObjectKind::Array)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.0.kind, ObjectKind::Error)
    }

    pub fn is_finalized(&self) -> bool {
        self.0.finalized.get()
    }

    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of live references to this object
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn private_data(&self) -> PrivateData {
        self.0.private.borrow().clone()
    }

    pub fn own_property(&self, name: &str) -> Option<HostValue> {
        self.0
            .properties
            .borrow()
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }

    pub fn set_own_property(&self, name: &str, value: HostValue) {
        let previous = {
            let mut properties = self.0.properties.borrow_mut();
            match properties.iter_mut().find(|(key, _)| key == name) {
                Some((_, slot)) => Some(std::mem::replace(slot, value)),
                None => {
                    properties.push((name.to_string(), value));
                    None
                }
            }
        };
        // The replaced value may be the last reference to an object.
        drop(previous);
    }

    /// Own property names in insertion order
    pub fn own_keys(&self) -> Vec<String> {
        self.0
            .properties
            .borrow()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub(crate) fn finalize(&self) {
        self.0.run_finalizers();
    }

    /// Function object for a class method, created once per object
    pub(crate) fn method(&self, name: &str, create: impl FnOnce() -> HostObject) -> HostObject {
        if let Some(method) = self.0.methods.borrow().get(name) {
            return method.clone();
        }
        let method = create();
        self.0
            .methods
            .borrow_mut()
            .insert(name.to_string(), method.clone());
        method
    }

    pub(crate) fn to_display_string(&self) -> String {
        match &self.0.kind {
            ObjectKind::Function(_) | ObjectKind::Constructor { .. } => "function".to_string(),
            ObjectKind::Error => match self.own_property("message") {
                Some(message) => format!("Error: {}", message.to_display_string()),
                None => "Error".to_string(),
            },
            ObjectKind::Array => {
                let length = self
                    .own_property("length")
                    .map(|len| len.to_number())
                    .unwrap_or(0.0) as usize;
                (0..length)
                    .map(|i| match self.own_property(&i.to_string()) {
                        Some(HostValue::Undefined | HostValue::Null) | None => String::new(),
                        Some(value) => value.to_display_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(",")
            }
            ObjectKind::Plain => match self.class_name() {
                Some(name) => format!("[object {name}]"),
                None => "[object Object]".to_string(),
            },
        }
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.0.kind {
            ObjectKind::Plain => "Object",
            ObjectKind::Array => "Array",
            ObjectKind::Error => "Error",
            ObjectKind::Function(_) => "Function",
            ObjectKind::Constructor { .. } => "Constructor",
        };
        match self.class_name() {
            Some(class) => write!(f, "{kind}<{class}>@{:p}", Rc::as_ptr(&self.0)),
            None => write!(f, "{kind}@{:p}", Rc::as_ptr(&self.0)),
        }
    }
}
