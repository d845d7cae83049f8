//! Engine-facing class definitions
//!
//! A [`ClassDefinition`] is what the dispatch framework hands to
//! [`ObjectModel::create_class`](crate::ObjectModel::create_class). It lists
//! static functions and values plus the optional hooks the engine invokes
//! with its own calling convention. Hooks that are not needed stay `None`
//! so the engine can apply its default behavior without a dispatch round trip.

use std::fmt;
use std::ops::BitOr;
use std::rc::Rc;

use crate::engine::{EngineTypes, PrivateData};

/// A script exception value thrown out of a hook
pub struct ScriptException<E: EngineTypes>(pub E::Value);

impl<E: EngineTypes> ScriptException<E> {
    pub fn into_value(self) -> E::Value {
        self.0
    }
}

impl<E: EngineTypes> fmt::Debug for ScriptException<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScriptException({:?})", self.0)
    }
}

/// Result of a hook: a value, or an exception for the engine to throw
pub type HookResult<E, T> = Result<T, ScriptException<E>>;

/// Function call hook: `(ctx, this, args)`
pub type CallHook<E> = Rc<
    dyn Fn(
        &<E as EngineTypes>::Context,
        &<E as EngineTypes>::Object,
        &[<E as EngineTypes>::Value],
    ) -> HookResult<E, <E as EngineTypes>::Value>,
>;

/// Static value getter: `(ctx, object, property_name)`
pub type GetterHook<E> = Rc<
    dyn Fn(
        &<E as EngineTypes>::Context,
        &<E as EngineTypes>::Object,
        &str,
    ) -> HookResult<E, <E as EngineTypes>::Value>,
>;

/// Property setter: `(ctx, object, property_name, value)`; `Ok(false)` means
/// not handled
pub type SetterHook<E> = Rc<
    dyn Fn(
        &<E as EngineTypes>::Context,
        &<E as EngineTypes>::Object,
        &str,
        &<E as EngineTypes>::Value,
    ) -> HookResult<E, bool>,
>;

/// Dynamic property getter; `Ok(None)` means "no such own property"
pub type GetPropertyHook<E> = Rc<
    dyn Fn(
        &<E as EngineTypes>::Context,
        &<E as EngineTypes>::Object,
        &str,
    ) -> HookResult<E, Option<<E as EngineTypes>::Value>>,
>;

/// Property name enumeration; must never throw
pub type GetPropertyNamesHook<E> = Rc<
    dyn Fn(&<E as EngineTypes>::Context, &<E as EngineTypes>::Object, &mut PropertyNameAccumulator),
>;

/// Construction: `(ctx, constructor, args)`
pub type ConstructHook<E> = Rc<
    dyn Fn(
        &<E as EngineTypes>::Context,
        &<E as EngineTypes>::Object,
        &[<E as EngineTypes>::Value],
    ) -> Constructed<E>,
>;

/// `instanceof` check: `(ctx, constructor, candidate)`
pub type HasInstanceHook<E> = Rc<
    dyn Fn(&<E as EngineTypes>::Context, &<E as EngineTypes>::Object, &<E as EngineTypes>::Value) -> bool,
>;

/// Finalizer; receives the private slot of the object being collected
pub type FinalizeHook = Rc<dyn Fn(&mut PrivateData)>;

/// Outcome of a construct hook
///
/// A constructor may fail after the object was allocated. The object is
/// still returned so that finalization releases any partial native state.
pub struct Constructed<E: EngineTypes> {
    pub object: Option<E::Object>,
    pub exception: Option<E::Value>,
}

impl<E: EngineTypes> Constructed<E> {
    pub fn ok(object: E::Object) -> Self {
        Self {
            object: Some(object),
            exception: None,
        }
    }

    pub fn failed(object: Option<E::Object>, exception: E::Value) -> Self {
        Self {
            object,
            exception: Some(exception),
        }
    }
}

/// Property attribute flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyAttributes(u32);

impl PropertyAttributes {
    pub const NONE: Self = Self(0);
    pub const READ_ONLY: Self = Self(1 << 1);
    pub const DONT_ENUM: Self = Self(1 << 2);
    pub const DONT_DELETE: Self = Self(1 << 3);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for PropertyAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Class attribute flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassAttributes(u32);

impl ClassAttributes {
    pub const NONE: Self = Self(0);
    /// Do not create a prototype object for instances of this class
    pub const NO_AUTOMATIC_PROTOTYPE: Self = Self(1 << 1);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// A named function installed on every instance of a class
pub struct StaticFunction<E: EngineTypes> {
    pub name: String,
    pub call: CallHook<E>,
    pub attributes: PropertyAttributes,
}

/// A named accessor property installed on every instance of a class
pub struct StaticValue<E: EngineTypes> {
    pub name: String,
    pub get: GetterHook<E>,
    pub set: SetterHook<E>,
    pub attributes: PropertyAttributes,
}

/// Collects names produced by a [`GetPropertyNamesHook`]
#[derive(Debug, Default)]
pub struct PropertyNameAccumulator {
    names: Vec<String>,
}

impl PropertyNameAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>) {
        self.names.push(name.into());
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn into_names(self) -> Vec<String> {
        self.names
    }
}

/// Everything an engine needs to create a class
pub struct ClassDefinition<E: EngineTypes> {
    pub class_name: String,
    pub parent: Option<E::Class>,
    pub attributes: ClassAttributes,
    pub static_functions: Vec<StaticFunction<E>>,
    pub static_values: Vec<StaticValue<E>>,
    pub get_property: Option<GetPropertyHook<E>>,
    pub set_property: Option<SetPropertyHook<E>>,
    pub get_property_names: Option<GetPropertyNamesHook<E>>,
    pub call_as_constructor: Option<ConstructHook<E>>,
    pub has_instance: Option<HasInstanceHook<E>>,
    pub finalize: Option<FinalizeHook>,
}

/// Dynamic property setter; same shape as a static value setter
pub type SetPropertyHook<E> = SetterHook<E>;

impl<E: EngineTypes> ClassDefinition<E> {
    /// An empty definition with every hook unset
    pub fn empty(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            parent: None,
            attributes: ClassAttributes::NONE,
            static_functions: Vec::new(),
            static_values: Vec::new(),
            get_property: None,
            set_property: None,
            get_property_names: None,
            call_as_constructor: None,
            has_instance: None,
            finalize: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_flags() {
        let attrs = PropertyAttributes::READ_ONLY | PropertyAttributes::DONT_ENUM;
        assert!(attrs.contains(PropertyAttributes::READ_ONLY));
        assert!(attrs.contains(PropertyAttributes::DONT_ENUM));
        assert!(!attrs.contains(PropertyAttributes::DONT_DELETE));
        assert!(attrs.contains(PropertyAttributes::NONE));
    }

    #[test]
    fn test_accumulator_keeps_order() {
        let mut acc = PropertyNameAccumulator::new();
        acc.add("0");
        acc.add(String::from("name"));
        assert_eq!(acc.names(), ["0", "name"]);
        assert_eq!(acc.into_names(), vec!["0".to_string(), "name".to_string()]);
    }
}
