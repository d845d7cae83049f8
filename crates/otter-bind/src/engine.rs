//! Capability contracts a host script engine implements
//!
//! The dispatch framework never names a concrete engine. Everything it needs
//! from the host is expressed through three traits:
//!
//! - [`ObjectModel`] - classes, objects, properties, calls, GC protection
//! - [`ValueConversion`] - moving primitive values across the boundary
//! - [`ExceptionTranslation`] - turning native failures into script exceptions
//!
//! Any type implementing all three is a [`ScriptEngine`].

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::class::{ClassDefinition, ConstructHook};
use crate::error::BindResult;

/// Per-object private storage owned by the engine
///
/// Holds the native side of a wrapped object. Finalizers take the value out,
/// so a slot is released at most once.
pub type PrivateData = Option<Rc<dyn Any>>;

/// Handle types exposed by a host engine
pub trait EngineTypes: Sized + 'static {
    /// Execution context. Cloning retains the underlying global context.
    type Context: Clone;
    /// Any script value
    type Value: Clone + fmt::Debug + 'static;
    /// Script object reference
    type Object: Clone + fmt::Debug;
    /// Callable script object reference
    type Function: Clone + fmt::Debug;
    /// Engine class created from a [`ClassDefinition`]
    type Class: Clone;
}

/// Object model of the host engine
pub trait ObjectModel: EngineTypes {
    /// Create an engine class. Classes are context independent.
    fn create_class(definition: ClassDefinition<Self>) -> Self::Class;

    /// Allocate an object of `class` (or a plain object) with private data attached
    fn make_object(
        ctx: &Self::Context,
        class: Option<&Self::Class>,
        private: PrivateData,
    ) -> Self::Object;

    /// Create a default constructor object for `class` that runs `construct`
    fn make_constructor(
        ctx: &Self::Context,
        class: &Self::Class,
        construct: ConstructHook<Self>,
    ) -> Self::Object;

    /// Private data attached to an object, if any
    fn private_data(object: &Self::Object) -> PrivateData;

    /// Whether `value` is an object created from `class` or one of its subclasses
    fn is_object_of_class(ctx: &Self::Context, value: &Self::Value, class: &Self::Class) -> bool;

    /// Create a plain empty object
    fn create_empty_object(ctx: &Self::Context) -> Self::Object;

    /// Create an array holding `values` in order
    fn create_array(ctx: &Self::Context, values: &[Self::Value]) -> BindResult<Self::Object>;

    /// Read a property, running the engine's full lookup
    fn get_property(
        ctx: &Self::Context,
        object: &Self::Object,
        name: &str,
    ) -> BindResult<Self::Value>;

    /// Write a property, running the engine's full assignment semantics
    fn set_property(
        ctx: &Self::Context,
        object: &Self::Object,
        name: &str,
        value: &Self::Value,
    ) -> BindResult<()>;

    /// Call `function` with an optional `this`
    fn call_function(
        ctx: &Self::Context,
        function: &Self::Function,
        this: Option<&Self::Object>,
        args: &[Self::Value],
    ) -> BindResult<Self::Value>;

    /// Keep `value` alive regardless of script reachability
    fn protect(ctx: &Self::Context, value: &Self::Value);

    /// Release one protection taken with [`ObjectModel::protect`]
    fn unprotect(ctx: &Self::Context, value: &Self::Value);

    /// Engine-level reference/value identity (`===`)
    fn strict_equals(ctx: &Self::Context, a: &Self::Value, b: &Self::Value) -> bool;
}

/// Value conversion between native and script representations
pub trait ValueConversion: EngineTypes {
    fn undefined(ctx: &Self::Context) -> Self::Value;
    fn from_bool(ctx: &Self::Context, value: bool) -> Self::Value;
    fn from_number(ctx: &Self::Context, value: f64) -> Self::Value;
    fn from_string(ctx: &Self::Context, value: &str) -> Self::Value;
    fn from_object(ctx: &Self::Context, object: &Self::Object) -> Self::Value;
    fn from_function(ctx: &Self::Context, function: &Self::Function) -> Self::Value;

    fn is_undefined(ctx: &Self::Context, value: &Self::Value) -> bool;
    fn is_object(ctx: &Self::Context, value: &Self::Value) -> bool;
    fn is_function(ctx: &Self::Context, value: &Self::Value) -> bool;

    /// Convert to an object, failing with a type error for primitives
    fn to_object(ctx: &Self::Context, value: &Self::Value) -> BindResult<Self::Object>;
    /// Convert to a function, failing with a type error for non-callables
    fn to_function(ctx: &Self::Context, value: &Self::Value) -> BindResult<Self::Function>;
    fn to_number(ctx: &Self::Context, value: &Self::Value) -> BindResult<f64>;
    fn to_string(ctx: &Self::Context, value: &Self::Value) -> BindResult<String>;
}

/// Translation between native failures and script exceptions
pub trait ExceptionTranslation: EngineTypes {
    /// Build the exception value thrown into script code for `message`
    fn exception_from_message(ctx: &Self::Context, message: &str) -> Self::Value;

    /// Human-readable message of a thrown script value
    fn exception_message(ctx: &Self::Context, exception: &Self::Value) -> String;
}

/// A host engine implementing every capability the framework needs
pub trait ScriptEngine: ObjectModel + ValueConversion + ExceptionTranslation {}

impl<E> ScriptEngine for E where E: ObjectModel + ValueConversion + ExceptionTranslation {}
