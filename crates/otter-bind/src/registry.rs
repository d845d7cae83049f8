//! Process-wide class registry
//!
//! Descriptors are registered once during embedding initialization, in
//! superclass-first order, and the registry is read-only afterwards. Engine
//! classes are derived lazily from the descriptors on first use and cached
//! for as long as the registry lives, so each native type maps to exactly
//! one engine class.

use std::any::{Any, TypeId, type_name};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::config::BridgeConfig;
use crate::descriptor::{ClassDescriptor, Superclass};
use crate::engine::ScriptEngine;
use crate::error::{BindError, BindResult};
use crate::wrap::{self, ObjectWrap};

/// Type-erased view of a registered class
pub(crate) trait RegisteredClass<E: ScriptEngine> {
    fn name(&self) -> &str;
    fn superclass(&self) -> Superclass;
    fn class(&self, registry: &ClassRegistry<E>) -> E::Class;
    fn as_any(self: Rc<Self>) -> Rc<dyn Any>;
}

pub(crate) struct ClassEntry<E: ScriptEngine, T: 'static> {
    pub(crate) descriptor: Rc<ClassDescriptor<E, T>>,
    class: OnceCell<E::Class>,
    constructor_class: OnceCell<Option<E::Class>>,
}

impl<E: ScriptEngine, T: 'static> ClassEntry<E, T> {
    fn new(descriptor: ClassDescriptor<E, T>) -> Self {
        Self {
            descriptor: Rc::new(descriptor),
            class: OnceCell::new(),
            constructor_class: OnceCell::new(),
        }
    }

    pub(crate) fn constructor_class(&self, registry: &ClassRegistry<E>) -> Option<E::Class> {
        self.constructor_class
            .get_or_init(|| wrap::build_constructor_class::<E, T>(&self.descriptor, registry))
            .clone()
    }
}

impl<E: ScriptEngine, T: 'static> RegisteredClass<E> for ClassEntry<E, T> {
    fn name(&self) -> &str {
        self.descriptor.name()
    }

    fn superclass(&self) -> Superclass {
        self.descriptor.superclass()
    }

    fn class(&self, registry: &ClassRegistry<E>) -> E::Class {
        self.class
            .get_or_init(|| wrap::build_class::<E, T>(&self.descriptor, registry))
            .clone()
    }

    fn as_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

struct RegistryInner<E: ScriptEngine> {
    entries: HashMap<TypeId, Rc<dyn RegisteredClass<E>>>,
    config: BridgeConfig,
}

/// Registry of every class exposed to one embedding
pub struct ClassRegistry<E: ScriptEngine> {
    inner: Rc<RegistryInner<E>>,
}

impl<E: ScriptEngine> Clone for ClassRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Non-owning registry handle held by engine hooks
pub(crate) struct WeakClassRegistry<E: ScriptEngine> {
    inner: Weak<RegistryInner<E>>,
}

impl<E: ScriptEngine> Clone for WeakClassRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: ScriptEngine> WeakClassRegistry<E> {
    pub(crate) fn upgrade(&self) -> BindResult<ClassRegistry<E>> {
        self.inner
            .upgrade()
            .map(|inner| ClassRegistry { inner })
            .ok_or_else(|| BindError::internal("class registry has been dropped"))
    }
}

impl<E: ScriptEngine> ClassRegistry<E> {
    pub fn builder() -> ClassRegistryBuilder<E> {
        ClassRegistryBuilder::new()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.inner.entries.contains_key(&TypeId::of::<T>())
    }

    /// Handle for creating classes and objects of the native type `T`
    pub fn wrap<T: 'static>(&self) -> BindResult<ObjectWrap<E, T>> {
        let entry = self
            .inner
            .entries
            .get(&TypeId::of::<T>())
            .ok_or_else(|| BindError::UnregisteredClass(type_name::<T>().to_string()))?;
        let entry = entry
            .clone()
            .as_any()
            .downcast::<ClassEntry<E, T>>()
            .map_err(|_| BindError::internal(format!("class entry type mismatch for {}", type_name::<T>())))?;
        Ok(ObjectWrap::new(self.clone(), entry))
    }

    /// Class names from `T` up to the root, most derived first
    pub fn superclass_chain<T: 'static>(&self) -> BindResult<Vec<String>> {
        let mut chain = Vec::new();
        let mut next = Some(TypeId::of::<T>());
        while let Some(type_id) = next {
            let entry = self
                .inner
                .entries
                .get(&type_id)
                .ok_or_else(|| BindError::UnregisteredClass(type_name::<T>().to_string()))?;
            chain.push(entry.name().to_string());
            next = match entry.superclass() {
                Superclass::Root => None,
                Superclass::Of { type_id, .. } => Some(type_id),
            };
        }
        Ok(chain)
    }

    /// Engine class of the superclass, or `None` for the root sentinel
    pub(crate) fn parent_class(&self, superclass: Superclass) -> Option<E::Class> {
        match superclass {
            Superclass::Root => None,
            Superclass::Of { type_id, .. } => self
                .inner
                .entries
                .get(&type_id)
                .map(|entry| entry.class(self)),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakClassRegistry<E> {
        WeakClassRegistry {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

/// Collects descriptors before the registry is frozen
pub struct ClassRegistryBuilder<E: ScriptEngine> {
    entries: HashMap<TypeId, Rc<dyn RegisteredClass<E>>>,
    config: BridgeConfig,
}

impl<E: ScriptEngine> Default for ClassRegistryBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ScriptEngine> ClassRegistryBuilder<E> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            config: BridgeConfig::default(),
        }
    }

    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Register the descriptor for `T`
    ///
    /// The superclass must already be registered, which keeps every chain
    /// acyclic and terminated by the root sentinel.
    pub fn register<T: 'static>(mut self, descriptor: ClassDescriptor<E, T>) -> BindResult<Self> {
        let type_id = TypeId::of::<T>();
        if self.entries.contains_key(&type_id) {
            return Err(BindError::DuplicateClass(descriptor.name().to_string()));
        }

        if let Superclass::Of {
            type_id: parent,
            type_name: parent_name,
        } = descriptor.superclass()
        {
            if parent == type_id {
                return Err(BindError::CyclicSuperclass(descriptor.name().to_string()));
            }
            if !self.entries.contains_key(&parent) {
                return Err(BindError::UnknownSuperclass {
                    class: descriptor.name().to_string(),
                    superclass: parent_name.to_string(),
                });
            }
            self.check_acyclic(descriptor.name(), type_id, parent)?;
        }

        debug!(class = %descriptor.name(), "registering class descriptor");
        self.entries
            .insert(type_id, Rc::new(ClassEntry::new(descriptor)));
        Ok(self)
    }

    fn check_acyclic(&self, name: &str, start: TypeId, parent: TypeId) -> BindResult<()> {
        let mut next = Some(parent);
        let mut steps = 0usize;
        while let Some(type_id) = next {
            if type_id == start || steps > self.entries.len() {
                return Err(BindError::CyclicSuperclass(name.to_string()));
            }
            steps += 1;
            next = match self.entries.get(&type_id).map(|entry| entry.superclass()) {
                Some(Superclass::Of { type_id, .. }) => Some(type_id),
                _ => None,
            };
        }
        Ok(())
    }

    pub fn build(self) -> ClassRegistry<E> {
        ClassRegistry {
            inner: Rc::new(RegistryInner {
                entries: self.entries,
                config: self.config,
            }),
        }
    }
}
