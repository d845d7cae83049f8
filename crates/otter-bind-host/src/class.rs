//! Engine classes

use std::fmt;
use std::rc::Rc;

use otter_bind::class::{StaticFunction, StaticValue};
use otter_bind::{ClassAttributes, ClassDefinition};

use crate::engine::HostEngine;

/// A class created from a [`ClassDefinition`]
///
/// Clones share the class; identity is by pointer.
#[derive(Clone)]
pub struct HostClass(Rc<ClassDefinition<HostEngine>>);

impl HostClass {
    pub fn new(definition: ClassDefinition<HostEngine>) -> Self {
        Self(Rc::new(definition))
    }

    pub fn name(&self) -> &str {
        &self.0.class_name
    }

    pub fn parent(&self) -> Option<&HostClass> {
        self.0.parent.as_ref()
    }

    /// This class followed by its ancestors
    pub fn chain(&self) -> impl Iterator<Item = &HostClass> {
        std::iter::successors(Some(self), |class| class.parent())
    }

    /// Whether `self` is `other` or one of its subclasses
    pub fn is_subclass_of(&self, other: &HostClass) -> bool {
        self.chain().any(|class| class.ptr_eq(other))
    }

    pub fn ptr_eq(&self, other: &HostClass) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn attributes(&self) -> ClassAttributes {
        self.0.attributes
    }

    pub fn has_get_property_hook(&self) -> bool {
        self.0.get_property.is_some()
    }

    pub fn has_set_property_hook(&self) -> bool {
        self.0.set_property.is_some()
    }

    pub fn has_get_property_names_hook(&self) -> bool {
        self.0.get_property_names.is_some()
    }

    pub fn has_construct_hook(&self) -> bool {
        self.0.call_as_constructor.is_some()
    }

    pub fn has_instance_hook(&self) -> bool {
        self.0.has_instance.is_some()
    }

    pub fn has_finalize_hook(&self) -> bool {
        self.0.finalize.is_some()
    }

    pub fn static_function_names(&self) -> Vec<&str> {
        self.0.static_functions.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn static_value_names(&self) -> Vec<&str> {
        self.0.static_values.iter().map(|v| v.name.as_str()).collect()
    }

    pub(crate) fn definition(&self) -> &ClassDefinition<HostEngine> {
        &self.0
    }

    pub(crate) fn static_function(&self, name: &str) -> Option<&StaticFunction<HostEngine>> {
        self.0.static_functions.iter().find(|f| f.name == name)
    }

    pub(crate) fn static_value(&self, name: &str) -> Option<&StaticValue<HostEngine>> {
        self.0.static_values.iter().find(|v| v.name == name)
    }
}

impl fmt::Debug for HostClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostClass")
            .field("name", &self.name())
            .field("parent", &self.parent().map(HostClass::name))
            .finish()
    }
}
