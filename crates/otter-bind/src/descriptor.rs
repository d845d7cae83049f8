//! Declarative class descriptors
//!
//! A [`ClassDescriptor`] records the script-visible surface of one native
//! type: methods, properties, index/string accessors, a constructor, static
//! members and the superclass link. It is plain data; the dispatch framework
//! in [`crate::wrap`] reads it to build engine classes.
//!
//! Descriptors are immutable once registered with a
//! [`ClassRegistry`](crate::ClassRegistry).
//!
//! ```ignore
//! let descriptor = ClassDescriptor::<MyEngine, Counter>::new("Counter")
//!     .constructor(|_ctx, this, _args| {
//!         ObjectWrap::<MyEngine, Counter>::unwrap_native(this)?.set(Counter::default());
//!         Ok(())
//!     })
//!     .native_method("increment", |ctx, counter: &mut Counter, _args| {
//!         counter.value += 1;
//!         Ok(MyEngine::undefined(ctx))
//!     })
//!     .native_getter("value", |ctx, counter: &Counter| Ok(MyEngine::from_number(ctx, counter.value)));
//! ```

use std::any::{TypeId, type_name};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::engine::{EngineTypes, ScriptEngine};
use crate::error::{BindError, BindResult};
use crate::wrap::ObjectWrap;

/// Native constructor: initializes the private slot of a freshly created object
pub type NativeConstructorFn<E> = Rc<
    dyn Fn(
        &<E as EngineTypes>::Context,
        &<E as EngineTypes>::Object,
        &[<E as EngineTypes>::Value],
    ) -> BindResult<()>,
>;

/// Native method: `(ctx, this, args)`
pub type NativeMethodFn<E> = Rc<
    dyn Fn(
        &<E as EngineTypes>::Context,
        &<E as EngineTypes>::Object,
        &[<E as EngineTypes>::Value],
    ) -> BindResult<<E as EngineTypes>::Value>,
>;

/// Named property getter
pub type PropertyGetterFn<E> = Rc<
    dyn Fn(&<E as EngineTypes>::Context, &<E as EngineTypes>::Object) -> BindResult<<E as EngineTypes>::Value>,
>;

/// Named property setter
pub type PropertySetterFn<E> = Rc<
    dyn Fn(
        &<E as EngineTypes>::Context,
        &<E as EngineTypes>::Object,
        &<E as EngineTypes>::Value,
    ) -> BindResult<()>,
>;

/// Index getter; report [`BindError::OutOfRange`] for positions past the end
pub type IndexGetterFn<E> = Rc<
    dyn Fn(
        &<E as EngineTypes>::Context,
        &<E as EngineTypes>::Object,
        u32,
    ) -> BindResult<<E as EngineTypes>::Value>,
>;

/// Index setter; `Ok(false)` leaves the assignment to the engine
pub type IndexSetterFn<E> = Rc<
    dyn Fn(
        &<E as EngineTypes>::Context,
        &<E as EngineTypes>::Object,
        u32,
        &<E as EngineTypes>::Value,
    ) -> BindResult<bool>,
>;

/// String getter; `Ok(None)` means "no such property"
pub type StringGetterFn<E> = Rc<
    dyn Fn(
        &<E as EngineTypes>::Context,
        &<E as EngineTypes>::Object,
        &str,
    ) -> BindResult<Option<<E as EngineTypes>::Value>>,
>;

/// String setter; `Ok(false)` leaves the assignment to the engine
pub type StringSetterFn<E> = Rc<
    dyn Fn(
        &<E as EngineTypes>::Context,
        &<E as EngineTypes>::Object,
        &str,
        &<E as EngineTypes>::Value,
    ) -> BindResult<bool>,
>;

/// Names contributed by a string accessor during enumeration
pub type StringEnumeratorFn<E> = Rc<
    dyn Fn(&<E as EngineTypes>::Context, &<E as EngineTypes>::Object) -> BindResult<Vec<String>>,
>;

/// Getter and optional setter of a named property
pub struct PropertyDescriptor<E: EngineTypes> {
    pub getter: PropertyGetterFn<E>,
    pub setter: Option<PropertySetterFn<E>>,
}

/// Accessors over integer positions
pub struct IndexAccessor<E: EngineTypes> {
    pub getter: Option<IndexGetterFn<E>>,
    pub setter: Option<IndexSetterFn<E>>,
}

impl<E: EngineTypes> Default for IndexAccessor<E> {
    fn default() -> Self {
        Self {
            getter: None,
            setter: None,
        }
    }
}

/// Accessors over arbitrary property names
pub struct StringAccessor<E: EngineTypes> {
    pub getter: Option<StringGetterFn<E>>,
    pub setter: Option<StringSetterFn<E>>,
    pub enumerator: Option<StringEnumeratorFn<E>>,
}

impl<E: EngineTypes> Default for StringAccessor<E> {
    fn default() -> Self {
        Self {
            getter: None,
            setter: None,
            enumerator: None,
        }
    }
}

/// Link to the parent class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Superclass {
    /// Top of every chain; resolves to "no parent class"
    Root,
    /// Another registered native type
    Of {
        type_id: TypeId,
        type_name: &'static str,
    },
}

impl Superclass {
    pub fn of<U: 'static>() -> Self {
        Self::Of {
            type_id: TypeId::of::<U>(),
            type_name: type_name::<U>(),
        }
    }
}

/// Script-visible surface of the native type `T`
pub struct ClassDescriptor<E: EngineTypes, T: 'static> {
    pub(crate) name: String,
    pub(crate) superclass: Superclass,
    pub(crate) constructor: Option<NativeConstructorFn<E>>,
    pub(crate) methods: BTreeMap<String, NativeMethodFn<E>>,
    pub(crate) properties: BTreeMap<String, PropertyDescriptor<E>>,
    pub(crate) index_accessor: IndexAccessor<E>,
    pub(crate) string_accessor: StringAccessor<E>,
    pub(crate) static_methods: BTreeMap<String, NativeMethodFn<E>>,
    pub(crate) static_properties: BTreeMap<String, PropertyDescriptor<E>>,
    _native: PhantomData<fn() -> T>,
}

impl<E: EngineTypes, T: 'static> ClassDescriptor<E, T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: Superclass::Root,
            constructor: None,
            methods: BTreeMap::new(),
            properties: BTreeMap::new(),
            index_accessor: IndexAccessor::default(),
            string_accessor: StringAccessor::default(),
            static_methods: BTreeMap::new(),
            static_properties: BTreeMap::new(),
            _native: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn superclass(&self) -> Superclass {
        self.superclass
    }

    pub fn has_constructor(&self) -> bool {
        self.constructor.is_some()
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn index_accessor(&self) -> &IndexAccessor<E> {
        &self.index_accessor
    }

    pub fn string_accessor(&self) -> &StringAccessor<E> {
        &self.string_accessor
    }

    /// Whether a dedicated constructor class is needed
    pub fn has_static_surface(&self) -> bool {
        self.constructor.is_some()
            || !self.static_methods.is_empty()
            || !self.static_properties.is_empty()
    }

    /// Inherit from the class registered for `U`
    pub fn extends<U: 'static>(mut self) -> Self {
        self.superclass = Superclass::of::<U>();
        self
    }

    pub fn constructor<F>(mut self, f: F) -> Self
    where
        F: Fn(&E::Context, &E::Object, &[E::Value]) -> BindResult<()> + 'static,
    {
        self.constructor = Some(Rc::new(f));
        self
    }

    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&E::Context, &E::Object, &[E::Value]) -> BindResult<E::Value> + 'static,
    {
        self.methods.insert(name.into(), Rc::new(f));
        self
    }

    /// Read-only property
    pub fn getter<G>(mut self, name: impl Into<String>, getter: G) -> Self
    where
        G: Fn(&E::Context, &E::Object) -> BindResult<E::Value> + 'static,
    {
        self.properties.insert(
            name.into(),
            PropertyDescriptor {
                getter: Rc::new(getter),
                setter: None,
            },
        );
        self
    }

    /// Read-write property
    pub fn property<G, S>(mut self, name: impl Into<String>, getter: G, setter: S) -> Self
    where
        G: Fn(&E::Context, &E::Object) -> BindResult<E::Value> + 'static,
        S: Fn(&E::Context, &E::Object, &E::Value) -> BindResult<()> + 'static,
    {
        self.properties.insert(
            name.into(),
            PropertyDescriptor {
                getter: Rc::new(getter),
                setter: Some(Rc::new(setter)),
            },
        );
        self
    }

    pub fn index_getter<G>(mut self, getter: G) -> Self
    where
        G: Fn(&E::Context, &E::Object, u32) -> BindResult<E::Value> + 'static,
    {
        self.index_accessor.getter = Some(Rc::new(getter));
        self
    }

    pub fn index_setter<S>(mut self, setter: S) -> Self
    where
        S: Fn(&E::Context, &E::Object, u32, &E::Value) -> BindResult<bool> + 'static,
    {
        self.index_accessor.setter = Some(Rc::new(setter));
        self
    }

    pub fn string_getter<G>(mut self, getter: G) -> Self
    where
        G: Fn(&E::Context, &E::Object, &str) -> BindResult<Option<E::Value>> + 'static,
    {
        self.string_accessor.getter = Some(Rc::new(getter));
        self
    }

    pub fn string_setter<S>(mut self, setter: S) -> Self
    where
        S: Fn(&E::Context, &E::Object, &str, &E::Value) -> BindResult<bool> + 'static,
    {
        self.string_accessor.setter = Some(Rc::new(setter));
        self
    }

    pub fn string_enumerator<N>(mut self, enumerator: N) -> Self
    where
        N: Fn(&E::Context, &E::Object) -> BindResult<Vec<String>> + 'static,
    {
        self.string_accessor.enumerator = Some(Rc::new(enumerator));
        self
    }

    pub fn static_method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&E::Context, &E::Object, &[E::Value]) -> BindResult<E::Value> + 'static,
    {
        self.static_methods.insert(name.into(), Rc::new(f));
        self
    }

    /// Read-write property on the constructor object
    pub fn static_property<G, S>(mut self, name: impl Into<String>, getter: G, setter: S) -> Self
    where
        G: Fn(&E::Context, &E::Object) -> BindResult<E::Value> + 'static,
        S: Fn(&E::Context, &E::Object, &E::Value) -> BindResult<()> + 'static,
    {
        self.static_properties.insert(
            name.into(),
            PropertyDescriptor {
                getter: Rc::new(getter),
                setter: Some(Rc::new(setter)),
            },
        );
        self
    }

    pub fn static_getter<G>(mut self, name: impl Into<String>, getter: G) -> Self
    where
        G: Fn(&E::Context, &E::Object) -> BindResult<E::Value> + 'static,
    {
        self.static_properties.insert(
            name.into(),
            PropertyDescriptor {
                getter: Rc::new(getter),
                setter: None,
            },
        );
        self
    }
}

impl<E: ScriptEngine, T: 'static> ClassDescriptor<E, T> {
    /// Method operating directly on the wrapped native instance
    pub fn native_method<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&E::Context, &mut T, &[E::Value]) -> BindResult<E::Value> + 'static,
    {
        self.method(name, move |ctx, this, args| {
            ObjectWrap::<E, T>::unwrap_native(this)?.with_mut(|native| f(ctx, native, args))?
        })
    }

    /// Read-only property computed from the wrapped native instance
    pub fn native_getter<G>(self, name: impl Into<String>, getter: G) -> Self
    where
        G: Fn(&E::Context, &T) -> BindResult<E::Value> + 'static,
    {
        self.getter(name, move |ctx, this| {
            ObjectWrap::<E, T>::unwrap_native(this)?.with(|native| getter(ctx, native))?
        })
    }
}

/// Reject calls with more than `max` arguments
pub fn validate_argument_count<V>(args: &[V], max: usize) -> BindResult<()> {
    if args.len() > max {
        return Err(BindError::invalid_argument(format!(
            "Invalid arguments: at most {} expected, but {} supplied.",
            max,
            args.len()
        )));
    }
    Ok(())
}

/// Reject calls with fewer than `min` or more than `max` arguments
pub fn validate_argument_count_range<V>(args: &[V], min: usize, max: usize) -> BindResult<()> {
    if args.len() < min || args.len() > max {
        return Err(BindError::invalid_argument(format!(
            "Invalid arguments: expected between {} and {}, but {} supplied.",
            min,
            max,
            args.len()
        )));
    }
    Ok(())
}
