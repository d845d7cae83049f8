//! Capability implementations for the host engine

use otter_bind::class::ConstructHook;
use otter_bind::{
    BindError, BindResult, ClassDefinition, EngineTypes, ExceptionTranslation, ObjectModel,
    PrivateData, ValueConversion,
};

use crate::class::HostClass;
use crate::context::HostContext;
use crate::object::{HostObject, ObjectKind};
use crate::value::HostValue;

/// The in-memory reference engine
#[derive(Debug, Clone, Copy, Default)]
pub struct HostEngine;

impl EngineTypes for HostEngine {
    type Context = HostContext;
    type Value = HostValue;
    type Object = HostObject;
    type Function = HostObject;
    type Class = HostClass;
}

impl ObjectModel for HostEngine {
    fn create_class(definition: ClassDefinition<Self>) -> HostClass {
        HostClass::new(definition)
    }

    fn make_object(_ctx: &HostContext, class: Option<&HostClass>, private: PrivateData) -> HostObject {
        HostObject::new(ObjectKind::Plain, class.cloned(), private)
    }

    fn make_constructor(
        _ctx: &HostContext,
        class: &HostClass,
        construct: ConstructHook<Self>,
    ) -> HostObject {
        HostObject::new(
            ObjectKind::Constructor {
                construct,
                instance_class: class.clone(),
            },
            None,
            None,
        )
    }

    fn private_data(object: &HostObject) -> PrivateData {
        object.private_data()
    }

    fn is_object_of_class(_ctx: &HostContext, value: &HostValue, class: &HostClass) -> bool {
        value
            .as_object()
            .and_then(HostObject::class)
            .is_some_and(|own| own.is_subclass_of(class))
    }

    fn create_empty_object(ctx: &HostContext) -> HostObject {
        ctx.object()
    }

    fn create_array(ctx: &HostContext, values: &[HostValue]) -> BindResult<HostObject> {
        Ok(ctx.array(values))
    }

    fn get_property(ctx: &HostContext, object: &HostObject, name: &str) -> BindResult<HostValue> {
        Ok(ctx.get(object, name)?)
    }

    fn set_property(
        ctx: &HostContext,
        object: &HostObject,
        name: &str,
        value: &HostValue,
    ) -> BindResult<()> {
        Ok(ctx.set(object, name, value.clone())?)
    }

    fn call_function(
        ctx: &HostContext,
        function: &HostObject,
        this: Option<&HostObject>,
        args: &[HostValue],
    ) -> BindResult<HostValue> {
        Ok(ctx.call(function, this, args)?)
    }

    fn protect(ctx: &HostContext, value: &HostValue) {
        ctx.protect(value);
    }

    fn unprotect(ctx: &HostContext, value: &HostValue) {
        ctx.unprotect(value);
    }

    fn strict_equals(_ctx: &HostContext, a: &HostValue, b: &HostValue) -> bool {
        a == b
    }
}

impl ValueConversion for HostEngine {
    fn undefined(_ctx: &HostContext) -> HostValue {
        HostValue::Undefined
    }

    fn from_bool(_ctx: &HostContext, value: bool) -> HostValue {
        HostValue::Bool(value)
    }

    fn from_number(_ctx: &HostContext, value: f64) -> HostValue {
        HostValue::Number(value)
    }

    fn from_string(_ctx: &HostContext, value: &str) -> HostValue {
        HostValue::from(value)
    }

    fn from_object(_ctx: &HostContext, object: &HostObject) -> HostValue {
        HostValue::Object(object.clone())
    }

    fn from_function(_ctx: &HostContext, function: &HostObject) -> HostValue {
        HostValue::Object(function.clone())
    }

    fn is_undefined(_ctx: &HostContext, value: &HostValue) -> bool {
        value.is_undefined()
    }

    fn is_object(_ctx: &HostContext, value: &HostValue) -> bool {
        value.is_object()
    }

    fn is_function(_ctx: &HostContext, value: &HostValue) -> bool {
        value.is_callable()
    }

    fn to_object(_ctx: &HostContext, value: &HostValue) -> BindResult<HostObject> {
        value
            .as_object()
            .cloned()
            .ok_or_else(|| BindError::type_error("object", value.type_name()))
    }

    fn to_function(_ctx: &HostContext, value: &HostValue) -> BindResult<HostObject> {
        match value.as_object() {
            Some(object) if object.is_callable() => Ok(object.clone()),
            _ => Err(BindError::type_error("function", value.type_name())),
        }
    }

    fn to_number(_ctx: &HostContext, value: &HostValue) -> BindResult<f64> {
        Ok(value.to_number())
    }

    fn to_string(_ctx: &HostContext, value: &HostValue) -> BindResult<String> {
        Ok(value.to_display_string())
    }
}

impl ExceptionTranslation for HostEngine {
    fn exception_from_message(ctx: &HostContext, message: &str) -> HostValue {
        HostValue::Object(ctx.error(message))
    }

    fn exception_message(ctx: &HostContext, exception: &HostValue) -> String {
        ctx.exception_message(exception)
    }
}
