//! Object wrapping and property dispatch
//!
//! [`ObjectWrap`] turns a registered [`ClassDescriptor`] into engine classes
//! and wrapped objects. The functions in this module are the trampolines the
//! engine calls through the hooks of a [`ClassDefinition`]. Each one is a
//! catch boundary: native errors and panics are converted into script
//! exceptions before control returns to the engine.
//!
//! Three failure categories cross the boundary differently:
//!
//! | Failure | Surfaces as |
//! |---------|-------------|
//! | out-of-range index read | `undefined` |
//! | enumeration failure | nothing (logged) |
//! | anything else | script exception with the native message |

use std::any::{Any, type_name};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::class::{
    CallHook, ClassAttributes, ClassDefinition, ConstructHook, Constructed, HookResult,
    PropertyAttributes, PropertyNameAccumulator, ScriptException, SetterHook, StaticFunction,
    StaticValue,
};
use crate::descriptor::{ClassDescriptor, NativeMethodFn, PropertyDescriptor};
use crate::engine::{PrivateData, ScriptEngine};
use crate::error::{BindError, BindResult, ErrorKind};
use crate::registry::{ClassEntry, ClassRegistry, RegisteredClass, WeakClassRegistry};

/// Owned native instance stored in a wrapped object's private slot
///
/// The slot is empty between allocation and the constructor running, and
/// after the native instance has been taken out.
pub struct NativeSlot<T> {
    class_name: String,
    native: RefCell<Option<T>>,
}

impl<T> NativeSlot<T> {
    fn new(class_name: &str, native: Option<T>) -> Self {
        Self {
            class_name: class_name.to_string(),
            native: RefCell::new(native),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn is_initialized(&self) -> bool {
        self.native.try_borrow().map(|n| n.is_some()).unwrap_or(true)
    }

    /// Borrow the native instance
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> BindResult<R> {
        let guard = self.native.try_borrow().map_err(|_| self.busy())?;
        match guard.as_ref() {
            Some(native) => Ok(f(native)),
            None => Err(self.detached()),
        }
    }

    /// Mutably borrow the native instance
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> BindResult<R> {
        let mut guard = self.native.try_borrow_mut().map_err(|_| self.busy())?;
        match guard.as_mut() {
            Some(native) => Ok(f(native)),
            None => Err(self.detached()),
        }
    }

    /// Install `native`, releasing any previous instance
    pub fn set(&self, native: T) -> BindResult<()> {
        let previous = {
            let mut guard = self.native.try_borrow_mut().map_err(|_| self.busy())?;
            guard.replace(native)
        };
        drop(previous);
        Ok(())
    }

    /// Move the native instance out, leaving the slot empty
    pub fn take(&self) -> BindResult<Option<T>> {
        let mut guard = self.native.try_borrow_mut().map_err(|_| self.busy())?;
        Ok(guard.take())
    }

    fn detached(&self) -> BindError {
        BindError::Detached {
            class: self.class_name.clone(),
        }
    }

    fn busy(&self) -> BindError {
        BindError::internal(format!(
            "{} native instance is already borrowed",
            self.class_name
        ))
    }
}

impl<T> fmt::Debug for NativeSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeSlot")
            .field("class_name", &self.class_name)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// Handle binding a native type `T` to its engine class
pub struct ObjectWrap<E: ScriptEngine, T: 'static> {
    registry: ClassRegistry<E>,
    entry: Rc<ClassEntry<E, T>>,
}

impl<E: ScriptEngine, T: 'static> Clone for ObjectWrap<E, T> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            entry: self.entry.clone(),
        }
    }
}

impl<E: ScriptEngine, T: 'static> ObjectWrap<E, T> {
    pub(crate) fn new(registry: ClassRegistry<E>, entry: Rc<ClassEntry<E, T>>) -> Self {
        Self { registry, entry }
    }

    pub fn descriptor(&self) -> &ClassDescriptor<E, T> {
        &self.entry.descriptor
    }

    /// Engine class for `T`, created on first use
    pub fn get_class(&self) -> E::Class {
        self.entry.class(&self.registry)
    }

    /// Dedicated constructor class, or `None` when the default constructor suffices
    pub fn get_constructor_class(&self) -> Option<E::Class> {
        self.entry.constructor_class(&self.registry)
    }

    /// Wrap `instance` in a new script object; the object takes ownership
    pub fn create(&self, ctx: &E::Context, instance: Option<T>) -> E::Object {
        let slot: Rc<dyn Any> = Rc::new(NativeSlot::new(self.descriptor().name(), instance));
        E::make_object(ctx, Some(&self.get_class()), Some(slot))
    }

    /// Script-visible constructor object for `T`
    pub fn create_constructor(&self, ctx: &E::Context) -> E::Object {
        if let Some(constructor_class) = self.get_constructor_class() {
            return E::make_object(ctx, Some(&constructor_class), None);
        }
        E::make_constructor(
            ctx,
            &self.get_class(),
            construct_hook::<E, T>(self.registry.downgrade()),
        )
    }

    pub fn has_instance(&self, ctx: &E::Context, value: &E::Value) -> bool {
        E::is_object_of_class(ctx, value, &self.get_class())
    }

    /// Native slot of a wrapped object
    pub fn unwrap_native(object: &E::Object) -> BindResult<Rc<NativeSlot<T>>> {
        let private = E::private_data(object)
            .ok_or_else(|| BindError::type_error(short_type_name::<T>(), "object without native data"))?;
        private
            .downcast::<NativeSlot<T>>()
            .map_err(|_| BindError::type_error(short_type_name::<T>(), "object of another class"))
    }

    /// Run the native constructor against a fresh, unbound instance
    pub fn construct(&self, ctx: &E::Context, args: &[E::Value]) -> Constructed<E> {
        let Some(constructor) = self.descriptor().constructor.clone() else {
            return Constructed::failed(None, exception::<E>(ctx, &BindError::IllegalConstructor).0);
        };

        let this_object = self.create(ctx, None);
        match guard(|| constructor(ctx, &this_object, args)) {
            Ok(()) => Constructed::ok(this_object),
            Err(err) => {
                debug!(class = %self.descriptor().name(), error = %err, "native constructor failed");
                Constructed::failed(Some(this_object), exception::<E>(ctx, &err).0)
            }
        }
    }
}

fn short_type_name<T>() -> &'static str {
    let full = type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Run native code, converting panics into [`BindError::Unknown`]
pub(crate) fn guard<R>(f: impl FnOnce() -> BindResult<R>) -> BindResult<R> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(BindError::from_panic(payload)),
    }
}

/// Script exception for `err`. A thrown engine value is rethrown unchanged.
pub fn exception<E: ScriptEngine>(ctx: &E::Context, err: &BindError) -> ScriptException<E> {
    if let BindError::Thrown {
        value: Some(value), ..
    } = err
    {
        if let Some(value) = value.downcast_ref::<E::Value>() {
            return ScriptException(value.clone());
        }
    }
    ScriptException(E::exception_from_message(ctx, &err.script_message()))
}

/// Why a property name could not be used as an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexParseError {
    /// Not a decimal integer; the name belongs to the string path
    NotAnIndex,
    /// Integer outside `0..=u32::MAX`
    OutOfRange(String),
}

/// Parse a property name as a non-negative `u32` index
pub fn validated_positive_index(name: &str) -> Result<u32, IndexParseError> {
    let (negative, digits) = match name.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, name),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IndexParseError::NotAnIndex);
    }

    let too_large = || {
        IndexParseError::OutOfRange(format!(
            "Index {} cannot be greater than {}.",
            name,
            u32::MAX
        ))
    };
    let value = digits.parse::<u64>().map_err(|_| too_large())?;
    if negative && value != 0 {
        return Err(IndexParseError::OutOfRange(format!(
            "Index {} cannot be less than zero.",
            name
        )));
    }
    u32::try_from(value).map_err(|_| too_large())
}

/// Read `length` from an object as a `u32`
pub fn validated_get_length<E: ScriptEngine>(ctx: &E::Context, object: &E::Object) -> BindResult<u32> {
    let value = E::get_property(ctx, object, "length")?;
    let length = E::to_number(ctx, &value)?;
    if !length.is_finite() || length < 0.0 || length.fract() != 0.0 || length > u32::MAX as f64 {
        return Err(BindError::type_error("array length", length.to_string()));
    }
    Ok(length as u32)
}

pub(crate) fn get_property<E: ScriptEngine, T: 'static>(
    descriptor: &ClassDescriptor<E, T>,
    ctx: &E::Context,
    object: &E::Object,
    property: &str,
) -> HookResult<E, Option<E::Value>> {
    if let Some(index_getter) = &descriptor.index_accessor.getter {
        match validated_positive_index(property) {
            Ok(index) => {
                return match guard(|| index_getter(ctx, object, index)) {
                    Ok(value) => Ok(Some(value)),
                    // Out-of-bounds index getters should just return undefined.
                    Err(err) if err.kind() == ErrorKind::OutOfRange => Ok(Some(E::undefined(ctx))),
                    Err(err) => Err(exception::<E>(ctx, &err)),
                };
            }
            Err(IndexParseError::OutOfRange(_)) => return Ok(Some(E::undefined(ctx))),
            Err(IndexParseError::NotAnIndex) => {}
        }
    }
    if let Some(string_getter) = &descriptor.string_accessor.getter {
        return guard(|| string_getter(ctx, object, property)).map_err(|err| exception::<E>(ctx, &err));
    }
    Ok(None)
}

pub(crate) fn set_property<E: ScriptEngine, T: 'static>(
    descriptor: &ClassDescriptor<E, T>,
    ctx: &E::Context,
    object: &E::Object,
    property: &str,
    value: &E::Value,
) -> HookResult<E, bool> {
    let index_setter = &descriptor.index_accessor.setter;

    if index_setter.is_some() || descriptor.index_accessor.getter.is_some() {
        match validated_positive_index(property) {
            Ok(index) => {
                let result = match index_setter {
                    Some(setter) => guard(|| setter(ctx, object, index, value)),
                    None => Err(BindError::ReadOnlyIndex(index)),
                };
                return result.map_err(|err| exception::<E>(ctx, &err));
            }
            Err(IndexParseError::OutOfRange(message)) => {
                return Err(exception::<E>(ctx, &BindError::OutOfRange(message)));
            }
            Err(IndexParseError::NotAnIndex) => {}
        }
    }
    if let Some(string_setter) = &descriptor.string_accessor.setter {
        return guard(|| string_setter(ctx, object, property, value))
            .map_err(|err| exception::<E>(ctx, &err));
    }
    Ok(false)
}

fn set_readonly_property<E: ScriptEngine>(
    ctx: &E::Context,
    _object: &E::Object,
    property: &str,
    _value: &E::Value,
) -> HookResult<E, bool> {
    Err(exception::<E>(
        ctx,
        &BindError::ReadOnlyProperty(property.to_string()),
    ))
}

pub(crate) fn get_property_names<E: ScriptEngine, T: 'static>(
    descriptor: &ClassDescriptor<E, T>,
    enumerate_indices: bool,
    ctx: &E::Context,
    object: &E::Object,
    accumulator: &mut PropertyNameAccumulator,
) {
    // Enumerating properties never throws into script code.
    if enumerate_indices && descriptor.index_accessor.getter.is_some() {
        match guard(|| validated_get_length::<E>(ctx, object)) {
            Ok(length) => {
                for index in 0..length {
                    accumulator.add(index.to_string());
                }
            }
            Err(err) => {
                debug!(class = %descriptor.name(), error = %err, "length lookup failed during enumeration");
            }
        }
    }
    if let Some(enumerator) = &descriptor.string_accessor.enumerator {
        match guard(|| enumerator(ctx, object)) {
            Ok(names) => {
                for name in names {
                    accumulator.add(name);
                }
            }
            Err(err) => {
                debug!(class = %descriptor.name(), error = %err, "string enumerator failed");
            }
        }
    }
}

fn finalize<T: 'static>(private: &mut PrivateData) {
    // Called for the most derived class before superclasses.
    if let Some(slot) = private.take() {
        trace!(native = short_type_name::<T>(), "releasing native instance");
        drop(slot);
    }
}

fn method_functions<E: ScriptEngine>(
    methods: &BTreeMap<String, NativeMethodFn<E>>,
) -> Vec<StaticFunction<E>> {
    let attributes =
        PropertyAttributes::READ_ONLY | PropertyAttributes::DONT_ENUM | PropertyAttributes::DONT_DELETE;

    methods
        .iter()
        .map(|(name, method)| {
            let method = method.clone();
            let call: CallHook<E> = Rc::new(
                move |ctx: &E::Context, this: &E::Object, args: &[E::Value]| {
                    guard(|| method(ctx, this, args)).map_err(|err| exception::<E>(ctx, &err))
                },
            );
            StaticFunction {
                name: name.clone(),
                call,
                attributes,
            }
        })
        .collect()
}

fn property_values<E: ScriptEngine>(
    properties: &BTreeMap<String, PropertyDescriptor<E>>,
) -> Vec<StaticValue<E>> {
    let attributes = PropertyAttributes::DONT_ENUM | PropertyAttributes::DONT_DELETE;

    properties
        .iter()
        .map(|(name, property)| {
            let getter = property.getter.clone();
            let get = Rc::new(move |ctx: &E::Context, object: &E::Object, _name: &str| {
                guard(|| getter(ctx, object)).map_err(|err| exception::<E>(ctx, &err))
            });

            let set: SetterHook<E> = match property.setter.clone() {
                Some(setter) => Rc::new(
                    move |ctx: &E::Context, object: &E::Object, _name: &str, value: &E::Value| {
                        guard(|| setter(ctx, object, value))
                            .map(|()| true)
                            .map_err(|err| exception::<E>(ctx, &err))
                    },
                ),
                None => Rc::new(set_readonly_property::<E>),
            };

            StaticValue {
                name: name.clone(),
                get,
                set,
                attributes,
            }
        })
        .collect()
}

fn construct_hook<E: ScriptEngine, T: 'static>(registry: WeakClassRegistry<E>) -> ConstructHook<E> {
    Rc::new(
        move |ctx: &E::Context, _constructor: &E::Object, args: &[E::Value]| {
            match registry.upgrade().and_then(|registry| registry.wrap::<T>()) {
                Ok(wrap) => wrap.construct(ctx, args),
                Err(err) => Constructed::failed(None, exception::<E>(ctx, &err).0),
            }
        },
    )
}

pub(crate) fn build_class<E: ScriptEngine, T: 'static>(
    descriptor: &Rc<ClassDescriptor<E, T>>,
    registry: &ClassRegistry<E>,
) -> E::Class {
    let mut definition = ClassDefinition::<E>::empty(descriptor.name());
    definition.parent = registry.parent_class(descriptor.superclass());
    definition.finalize = Some(Rc::new(finalize::<T>));
    definition.static_functions = method_functions(&descriptor.methods);
    definition.static_values = property_values(&descriptor.properties);

    let index = &descriptor.index_accessor;
    let string = &descriptor.string_accessor;

    if index.getter.is_some() || string.getter.is_some() {
        let d = descriptor.clone();
        definition.get_property = Some(Rc::new(
            move |ctx: &E::Context, object: &E::Object, property: &str| {
                get_property(&d, ctx, object, property)
            },
        ));
    }
    if index.getter.is_some() || string.getter.is_some() || index.setter.is_some() || string.setter.is_some() {
        let d = descriptor.clone();
        definition.set_property = Some(Rc::new(
            move |ctx: &E::Context, object: &E::Object, property: &str, value: &E::Value| {
                set_property(&d, ctx, object, property, value)
            },
        ));
    }

    let enumerate_indices = registry.config().enumerate_indices;
    if (enumerate_indices && index.getter.is_some()) || string.enumerator.is_some() {
        let d = descriptor.clone();
        definition.get_property_names = Some(Rc::new(
            move |ctx: &E::Context, object: &E::Object, accumulator: &mut PropertyNameAccumulator| {
                get_property_names(&d, enumerate_indices, ctx, object, accumulator)
            },
        ));
    }

    debug!(
        class = %descriptor.name(),
        methods = descriptor.methods.len(),
        properties = descriptor.properties.len(),
        "creating script class"
    );
    E::create_class(definition)
}

pub(crate) fn build_constructor_class<E: ScriptEngine, T: 'static>(
    descriptor: &Rc<ClassDescriptor<E, T>>,
    registry: &ClassRegistry<E>,
) -> Option<E::Class> {
    // Skip creating a special constructor class if possible.
    if !descriptor.has_static_surface() {
        return None;
    }

    let mut definition = ClassDefinition::<E>::empty(descriptor.name());
    definition.attributes = ClassAttributes::NO_AUTOMATIC_PROTOTYPE;

    let weak = registry.downgrade();
    definition.has_instance = Some(Rc::new(
        move |ctx: &E::Context, _constructor: &E::Object, value: &E::Value| {
            weak.upgrade()
                .and_then(|registry| registry.wrap::<T>())
                .map(|wrap| wrap.has_instance(ctx, value))
                .unwrap_or(false)
        },
    ));

    if descriptor.constructor.is_some() {
        definition.call_as_constructor = Some(construct_hook::<E, T>(registry.downgrade()));
    }
    definition.static_functions = method_functions(&descriptor.static_methods);
    definition.static_values = property_values(&descriptor.static_properties);

    debug!(class = %descriptor.name(), "creating constructor class");
    Some(E::create_class(definition))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_parsing() {
        assert_eq!(validated_positive_index("0"), Ok(0));
        assert_eq!(validated_positive_index("42"), Ok(42));
        assert_eq!(validated_positive_index("4294967295"), Ok(u32::MAX));
        assert_eq!(validated_positive_index("-0"), Ok(0));
    }

    #[test]
    fn test_non_index_names() {
        for name in ["", "-", "length", "1a", "a1", " 1", "1.5", "+1", "0x10"] {
            assert_eq!(
                validated_positive_index(name),
                Err(IndexParseError::NotAnIndex),
                "{name:?}"
            );
        }
    }

    #[test]
    fn test_out_of_range_indices() {
        assert!(matches!(
            validated_positive_index("-1"),
            Err(IndexParseError::OutOfRange(msg)) if msg == "Index -1 cannot be less than zero."
        ));
        assert!(matches!(
            validated_positive_index("4294967296"),
            Err(IndexParseError::OutOfRange(_))
        ));
        assert!(matches!(
            validated_positive_index("99999999999999999999999"),
            Err(IndexParseError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_native_slot_lifecycle() {
        let slot = NativeSlot::new("Thing", None::<String>);
        assert!(!slot.is_initialized());
        assert!(matches!(slot.with(|s| s.len()), Err(BindError::Detached { .. })));

        slot.set("hello".to_string()).unwrap();
        assert_eq!(slot.with(|s| s.len()).unwrap(), 5);
        slot.with_mut(|s| s.push('!')).unwrap();
        assert_eq!(slot.take().unwrap().as_deref(), Some("hello!"));
        assert!(!slot.is_initialized());
    }

    #[test]
    fn test_native_slot_reentrant_borrow_is_error() {
        let slot = NativeSlot::new("Thing", Some(1u32));
        let nested = slot.with_mut(|_| slot.with(|v| *v)).unwrap();
        assert!(matches!(nested, Err(BindError::Internal(_))));
    }

    #[test]
    fn test_guard_converts_panics() {
        let result: BindResult<()> = guard(|| panic!("native blew up"));
        assert!(matches!(result, Err(BindError::Unknown)));
        assert_eq!(guard(|| Ok(7)).unwrap(), 7);
    }
}
