//! Execution context and script-level operations
//!
//! [`HostContext`] plays the part of running script code: property reads
//! and writes, enumeration, calls, `new` and `instanceof` all go through
//! the class hooks the way an engine would dispatch them.
//!
//! Lookup for a property read, per class in the object's chain (most
//! derived first): the `get_property` hook, then static values, then
//! static functions. Own properties come last. Writes try the
//! `set_property` hook and static value setters the same way before
//! falling back to an own property.

use std::cell::RefCell;
use std::rc::Rc;

use otter_bind::class::ScriptException;
use otter_bind::{PropertyAttributes, PropertyNameAccumulator};
use tracing::trace;

use crate::engine::HostEngine;
use crate::error::{HostError, HostResult};
use crate::object::{HostObject, NativeFunction, ObjectKind};
use crate::value::HostValue;

#[derive(Default)]
struct ContextInner {
    protected: RefCell<Vec<HostValue>>,
}

/// Global execution context
///
/// Clones share the same context.
#[derive(Clone, Default)]
pub struct HostContext {
    inner: Rc<ContextInner>,
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("protected", &self.protect_count())
            .finish()
    }
}

fn same_value(a: &HostValue, b: &HostValue) -> bool {
    match (a, b) {
        (HostValue::Number(x), HostValue::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => a == b,
    }
}

impl HostContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ptr_eq(&self, other: &HostContext) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn thrown(&self, exception: ScriptException<HostEngine>) -> HostError {
        HostError::thrown(self, exception.into_value())
    }

    /// Read `object[name]`
    pub fn get(&self, object: &HostObject, name: &str) -> HostResult<HostValue> {
        for class in object.classes() {
            if let Some(hook) = &class.definition().get_property {
                if let Some(value) = hook(self, object, name).map_err(|e| self.thrown(e))? {
                    return Ok(value);
                }
            }
            if let Some(static_value) = class.static_value(name) {
                return (static_value.get)(self, object, name).map_err(|e| self.thrown(e));
            }
            if let Some(function) = class.static_function(name) {
                let call = function.call.clone();
                let method = object.method(name, || {
                    let name = name.to_string();
                    self.function(move |ctx: &HostContext, this: Option<&HostObject>, args: &[HostValue]| {
                        let this = this.ok_or_else(|| {
                            HostError::type_error(format!("{name} called without an object"))
                        })?;
                        call(ctx, this, args).map_err(|e| ctx.thrown(e))
                    })
                });
                return Ok(HostValue::Object(method));
            }
        }
        Ok(object.own_property(name).unwrap_or(HostValue::Undefined))
    }

    /// Write `object[name] = value`
    pub fn set(&self, object: &HostObject, name: &str, value: impl Into<HostValue>) -> HostResult<()> {
        let value = value.into();
        for class in object.classes() {
            if let Some(hook) = &class.definition().set_property {
                if hook(self, object, name, &value).map_err(|e| self.thrown(e))? {
                    return Ok(());
                }
            }
            if let Some(static_value) = class.static_value(name) {
                if (static_value.set)(self, object, name, &value).map_err(|e| self.thrown(e))? {
                    return Ok(());
                }
                if static_value.attributes.contains(PropertyAttributes::READ_ONLY) {
                    return Ok(());
                }
            }
            if let Some(function) = class.static_function(name) {
                if function.attributes.contains(PropertyAttributes::READ_ONLY) {
                    trace!(property = name, "ignoring write to read-only function");
                    return Ok(());
                }
            }
        }
        object.set_own_property(name, value);
        Ok(())
    }

    /// Enumerable property names (`Object.keys`)
    ///
    /// Names from class hooks come first, then enumerable static values,
    /// then own properties. Duplicates are dropped.
    pub fn keys(&self, object: &HostObject) -> Vec<String> {
        let mut accumulator = PropertyNameAccumulator::new();
        for class in object.classes() {
            if let Some(hook) = &class.definition().get_property_names {
                hook(self, object, &mut accumulator);
            }
            for static_value in &class.definition().static_values {
                if !static_value.attributes.contains(PropertyAttributes::DONT_ENUM) {
                    accumulator.add(static_value.name.clone());
                }
            }
        }
        for key in object.own_keys() {
            accumulator.add(key);
        }

        let mut keys: Vec<String> = Vec::new();
        for name in accumulator.into_names() {
            if !keys.contains(&name) {
                keys.push(name);
            }
        }
        keys
    }

    /// Call `function` with `this` and `args`
    pub fn call(
        &self,
        function: &HostObject,
        this: Option<&HostObject>,
        args: &[HostValue],
    ) -> HostResult<HostValue> {
        match function.kind() {
            ObjectKind::Function(native) => native(self, this, args),
            _ => Err(HostError::type_error(format!("{function:?} is not a function"))),
        }
    }

    /// Evaluate `new constructor(...args)`
    pub fn construct(&self, constructor: &HostObject, args: &[HostValue]) -> HostResult<HostObject> {
        let hook = match constructor.kind() {
            ObjectKind::Constructor { construct, .. } => Some(construct.clone()),
            _ => constructor
                .classes()
                .find_map(|class| class.definition().call_as_constructor.clone()),
        };
        let Some(hook) = hook else {
            return Err(HostError::type_error(format!("{constructor:?} is not a constructor")));
        };

        let constructed = hook(self, constructor, args);
        match (constructed.object, constructed.exception) {
            (_, Some(exception)) => Err(HostError::thrown(self, exception)),
            (Some(object), None) => Ok(object),
            (None, None) => Err(HostError::type_error("constructor returned no object")),
        }
    }

    /// Evaluate `value instanceof constructor`
    pub fn instance_of(&self, value: &HostValue, constructor: &HostObject) -> HostResult<bool> {
        if let ObjectKind::Constructor { instance_class, .. } = constructor.kind() {
            return Ok(value
                .as_object()
                .and_then(HostObject::class)
                .is_some_and(|class| class.is_subclass_of(instance_class)));
        }
        match constructor
            .classes()
            .find_map(|class| class.definition().has_instance.clone())
        {
            Some(has_instance) => Ok(has_instance(self, constructor, value)),
            None => Err(HostError::type_error(format!(
                "{constructor:?} does not support instanceof"
            ))),
        }
    }

    /// Create a function object
    pub fn function<F>(&self, f: F) -> HostObject
    where
        F: Fn(&HostContext, Option<&HostObject>, &[HostValue]) -> HostResult<HostValue> + 'static,
    {
        let native: NativeFunction = Rc::new(f);
        HostObject::new(ObjectKind::Function(native), None, None)
    }

    pub fn object(&self) -> HostObject {
        HostObject::new(ObjectKind::Plain, None, None)
    }

    pub fn array(&self, values: &[HostValue]) -> HostObject {
        let array = HostObject::new(ObjectKind::Array, None, None);
        for (index, value) in values.iter().enumerate() {
            array.set_own_property(&index.to_string(), value.clone());
        }
        array.set_own_property("length", HostValue::Number(values.len() as f64));
        array
    }

    pub fn error(&self, message: &str) -> HostObject {
        let error = HostObject::new(ObjectKind::Error, None, None);
        error.set_own_property("name", HostValue::from("Error"));
        error.set_own_property("message", HostValue::from(message));
        error
    }

    /// Elements of an array object
    pub fn array_values(&self, array: &HostObject) -> HostResult<Vec<HostValue>> {
        let length = self.get(array, "length")?.to_number();
        if !length.is_finite() || length < 0.0 {
            return Err(HostError::type_error("invalid array length"));
        }
        (0..length as usize)
            .map(|index| self.get(array, &index.to_string()))
            .collect()
    }

    /// Message of a thrown value: an object's `message` property, or the value as a string
    pub fn exception_message(&self, exception: &HostValue) -> String {
        if let HostValue::Object(object) = exception {
            if let Some(message) = object.own_property("message") {
                return message.to_display_string();
            }
        }
        exception.to_display_string()
    }

    /// Run `object`'s finalizers now instead of when the last reference drops
    pub fn finalize(&self, object: &HostObject) {
        object.finalize();
    }

    pub fn protect(&self, value: &HostValue) {
        self.inner.protected.borrow_mut().push(value.clone());
    }

    pub fn unprotect(&self, value: &HostValue) {
        let removed = {
            let mut protected = self.inner.protected.borrow_mut();
            protected
                .iter()
                .rposition(|candidate| same_value(candidate, value))
                .map(|position| protected.remove(position))
        };
        // Releasing the last reference may finalize an object.
        drop(removed);
    }

    /// Number of outstanding protections
    pub fn protect_count(&self) -> usize {
        self.inner.protected.borrow().len()
    }

    /// Whether `value` is currently protected
    pub fn is_protected(&self, value: &HostValue) -> bool {
        self.inner
            .protected
            .borrow()
            .iter()
            .any(|candidate| same_value(candidate, value))
    }
}
