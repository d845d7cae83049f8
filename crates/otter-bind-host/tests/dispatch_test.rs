//! Property dispatch through the reference engine

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use otter_bind::{
    BindError, BindResult, ClassDescriptor, ClassRegistry, ObjectModel, ObjectWrap, ValueConversion,
    validate_argument_count,
};
use otter_bind_host::{HostContext, HostEngine, HostError, HostObject, HostValue};

type Engine = HostEngine;

/// Growable list with an index setter
struct List {
    items: Vec<f64>,
}

/// List without an index setter
struct FrozenList {
    items: Vec<f64>,
}

/// List whose length cannot be read
struct BrokenList;

/// String-keyed map that records every name its accessors see
struct Dictionary {
    entries: Vec<(String, String)>,
    seen: Rc<RefCell<Vec<String>>>,
}

struct Point {
    x: f64,
    y: f64,
}

struct Shape;

struct Square {
    side: f64,
}

fn out_of_range(index: u32, length: usize) -> BindError {
    BindError::out_of_range(format!(
        "Requested index {index} greater than max {}",
        length as i64 - 1
    ))
}

fn list_descriptor() -> ClassDescriptor<Engine, List> {
    ClassDescriptor::new("List")
        .constructor(|ctx, this, args| {
            let items = args
                .iter()
                .map(|arg| Engine::to_number(ctx, arg))
                .collect::<BindResult<Vec<_>>>()?;
            if items.iter().any(|n| n.is_nan()) {
                return Err(BindError::invalid_argument("List items must be numbers"));
            }
            ObjectWrap::<Engine, List>::unwrap_native(this)?.set(List { items })
        })
        .index_getter(|ctx, this, index| {
            ObjectWrap::<Engine, List>::unwrap_native(this)?.with(|list| {
                list.items
                    .get(index as usize)
                    .map(|n| Engine::from_number(ctx, *n))
                    .ok_or_else(|| out_of_range(index, list.items.len()))
            })?
        })
        .index_setter(|ctx, this, index, value| {
            let number = Engine::to_number(ctx, value)?;
            ObjectWrap::<Engine, List>::unwrap_native(this)?.with_mut(|list| -> BindResult<bool> {
                let length = list.items.len();
                let slot = list
                    .items
                    .get_mut(index as usize)
                    .ok_or_else(|| out_of_range(index, length))?;
                *slot = number;
                Ok(true)
            })?
        })
        .native_getter("length", |ctx, list: &List| {
            Ok(Engine::from_number(ctx, list.items.len() as f64))
        })
        .native_method("push", |ctx, list: &mut List, args| {
            for arg in args {
                list.items.push(Engine::to_number(ctx, arg)?);
            }
            Ok(Engine::from_number(ctx, list.items.len() as f64))
        })
        .native_method("explode", |_ctx, _list: &mut List, _args| -> BindResult<HostValue> {
            panic!("native code failed")
        })
}

fn frozen_descriptor() -> ClassDescriptor<Engine, FrozenList> {
    ClassDescriptor::new("FrozenList")
        .index_getter(|ctx, this, index| {
            ObjectWrap::<Engine, FrozenList>::unwrap_native(this)?.with(|list| {
                list.items
                    .get(index as usize)
                    .map(|n| Engine::from_number(ctx, *n))
                    .ok_or_else(|| out_of_range(index, list.items.len()))
            })?
        })
        .native_getter("length", |ctx, list: &FrozenList| {
            Ok(Engine::from_number(ctx, list.items.len() as f64))
        })
}

fn broken_descriptor() -> ClassDescriptor<Engine, BrokenList> {
    ClassDescriptor::new("BrokenList")
        .index_getter(|ctx, _this, _index| Ok(Engine::undefined(ctx)))
        .getter("length", |_ctx, _this| Err(BindError::native("length unavailable")))
}

fn dictionary_descriptor() -> ClassDescriptor<Engine, Dictionary> {
    ClassDescriptor::new("Dictionary")
        .string_getter(|ctx, this, name| {
            ObjectWrap::<Engine, Dictionary>::unwrap_native(this)?.with(|dict| {
                dict.seen.borrow_mut().push(name.to_string());
                dict.entries
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| Engine::from_string(ctx, value))
            })
        })
        .string_setter(|ctx, this, name, value| {
            let value = Engine::to_string(ctx, value)?;
            ObjectWrap::<Engine, Dictionary>::unwrap_native(this)?.with_mut(|dict| {
                dict.seen.borrow_mut().push(name.to_string());
                dict.entries.push((name.to_string(), value));
                true
            })
        })
        .string_enumerator(|_ctx, this| {
            ObjectWrap::<Engine, Dictionary>::unwrap_native(this)?
                .with(|dict| dict.entries.iter().map(|(key, _)| key.clone()).collect())
        })
}

fn point_descriptor() -> ClassDescriptor<Engine, Point> {
    let precision = Rc::new(Cell::new(2.0));
    ClassDescriptor::new("Point")
        .constructor(|ctx, this, args| {
            validate_argument_count(args, 2)?;
            let coordinate = |i: usize| match args.get(i) {
                Some(arg) => Engine::to_number(ctx, arg),
                None => Ok(0.0),
            };
            let point = Point {
                x: coordinate(0)?,
                y: coordinate(1)?,
            };
            ObjectWrap::<Engine, Point>::unwrap_native(this)?.set(point)
        })
        .property(
            "x",
            |ctx, this| {
                let x = ObjectWrap::<Engine, Point>::unwrap_native(this)?.with(|p| p.x)?;
                Ok(Engine::from_number(ctx, x))
            },
            |ctx, this, value| {
                let x = Engine::to_number(ctx, value)?;
                ObjectWrap::<Engine, Point>::unwrap_native(this)?.with_mut(|p| p.x = x)
            },
        )
        .native_getter("y", |ctx, point: &Point| Ok(Engine::from_number(ctx, point.y)))
        .native_method("moveBy", |ctx, point: &mut Point, args| {
            validate_argument_count(args, 2)?;
            point.x += args.first().map_or(Ok(0.0), |a| Engine::to_number(ctx, a))?;
            point.y += args.get(1).map_or(Ok(0.0), |a| Engine::to_number(ctx, a))?;
            Ok(Engine::undefined(ctx))
        })
        .native_method("visit", |ctx, point: &mut Point, args| {
            let callback = args.first().cloned().unwrap_or_else(|| Engine::undefined(ctx));
            let callback = Engine::to_function(ctx, &callback)?;
            let x = Engine::from_number(ctx, point.x);
            Engine::call_function(ctx, &callback, None, &[x])
        })
        .static_getter("dimensions", |ctx, _constructor| Ok(Engine::from_number(ctx, 2.0)))
        .static_property(
            "precision",
            {
                let precision = precision.clone();
                move |ctx, _constructor| Ok(Engine::from_number(ctx, precision.get()))
            },
            move |ctx, _constructor, value| {
                precision.set(Engine::to_number(ctx, value)?);
                Ok(())
            },
        )
}

fn registry() -> ClassRegistry<Engine> {
    ClassRegistry::builder()
        .register(list_descriptor())
        .and_then(|b| b.register(frozen_descriptor()))
        .and_then(|b| b.register(broken_descriptor()))
        .and_then(|b| b.register(dictionary_descriptor()))
        .and_then(|b| b.register(point_descriptor()))
        .and_then(|b| {
            b.register(ClassDescriptor::<Engine, Shape>::new("Shape").method(
                "describe",
                |ctx, this, _args| {
                    let area = ctx.get(this, "area")?;
                    Ok(Engine::from_string(
                        ctx,
                        &format!("shape with area {}", area.to_display_string()),
                    ))
                },
            ))
        })
        .and_then(|b| {
            b.register(
                ClassDescriptor::<Engine, Square>::new("Square")
                    .extends::<Shape>()
                    .constructor(|ctx, this, args| {
                        let side = args.first().map_or(Ok(1.0), |a| Engine::to_number(ctx, a))?;
                        ObjectWrap::<Engine, Square>::unwrap_native(this)?.set(Square { side })
                    })
                    .native_getter("area", |ctx, square: &Square| {
                        Ok(Engine::from_number(ctx, square.side * square.side))
                    }),
            )
        })
        .expect("descriptors register")
        .build()
}

fn call_method(
    ctx: &HostContext,
    object: &HostObject,
    name: &str,
    args: &[HostValue],
) -> Result<HostValue, HostError> {
    let method = ctx.get(object, name)?;
    let function = method
        .as_object()
        .ok_or_else(|| HostError::type_error(format!("{name} is not a method")))?;
    ctx.call(function, Some(object), args)
}

fn list(ctx: &HostContext, registry: &ClassRegistry<Engine>, items: &[f64]) -> HostObject {
    registry.wrap::<List>().unwrap().create(
        ctx,
        Some(List {
            items: items.to_vec(),
        }),
    )
}

#[test]
fn test_index_read_within_bounds() {
    let ctx = HostContext::new();
    let registry = registry();
    let list = list(&ctx, &registry, &[10.0, 20.0, 30.0]);

    assert_eq!(ctx.get(&list, "0").unwrap(), HostValue::from(10));
    assert_eq!(ctx.get(&list, "2").unwrap(), HostValue::from(30));
    assert_eq!(ctx.get(&list, "length").unwrap(), HostValue::from(3));
}

#[test]
fn test_index_read_out_of_bounds_is_undefined() {
    let ctx = HostContext::new();
    let registry = registry();
    let list = list(&ctx, &registry, &[10.0]);

    for name in ["1", "100", "-1", "4294967295", "4294967296"] {
        assert_eq!(ctx.get(&list, name).unwrap(), HostValue::Undefined, "{name}");
    }
}

#[test]
fn test_index_write() {
    let ctx = HostContext::new();
    let registry = registry();
    let list = list(&ctx, &registry, &[1.0, 2.0]);

    ctx.set(&list, "1", 5).unwrap();
    assert_eq!(ctx.get(&list, "1").unwrap(), HostValue::from(5));

    let err = ctx.set(&list, "7", 5).unwrap_err();
    assert_eq!(err.message(), "Requested index 7 greater than max 1");

    let err = ctx.set(&list, "-1", 5).unwrap_err();
    assert_eq!(err.message(), "Index -1 cannot be less than zero.");
}

#[test]
fn test_index_write_without_setter_is_read_only() {
    let ctx = HostContext::new();
    let registry = registry();
    let frozen = registry
        .wrap::<FrozenList>()
        .unwrap()
        .create(&ctx, Some(FrozenList { items: vec![1.0] }));

    let err = ctx.set(&frozen, "0", 3).unwrap_err();
    assert_eq!(err.message(), "Cannot assign to read only index 0");
    assert_eq!(ctx.get(&frozen, "0").unwrap(), HostValue::from(1));

    // Non-index names fall through to ordinary properties.
    ctx.set(&frozen, "label", "frozen").unwrap();
    assert_eq!(ctx.get(&frozen, "label").unwrap(), HostValue::from("frozen"));
}

#[test]
fn test_read_only_property_rejects_every_value() {
    let ctx = HostContext::new();
    let registry = registry();
    let point = registry
        .wrap::<Point>()
        .unwrap()
        .create(&ctx, Some(Point { x: 1.0, y: 2.0 }));

    for value in [HostValue::from(3), HostValue::from("3"), HostValue::Undefined, HostValue::Null] {
        let err = ctx.set(&point, "y", value).unwrap_err();
        assert_eq!(err.message(), "Cannot assign to read only property 'y'");
    }
    assert_eq!(ctx.get(&point, "y").unwrap(), HostValue::from(2));

    ctx.set(&point, "x", 4).unwrap();
    assert_eq!(ctx.get(&point, "x").unwrap(), HostValue::from(4));
}

#[test]
fn test_numeric_names_on_index_only_class_use_index_path() {
    let ctx = HostContext::new();
    let registry = registry();
    let frozen = registry
        .wrap::<FrozenList>()
        .unwrap()
        .create(&ctx, Some(FrozenList { items: vec![7.0, 8.0] }));

    assert_eq!(ctx.get(&frozen, "1").unwrap(), HostValue::from(8));
    assert_eq!(ctx.get(&frozen, "01").unwrap(), HostValue::from(8));
    assert_eq!(ctx.get(&frozen, "name").unwrap(), HostValue::Undefined);
}

#[test]
fn test_numeric_names_on_string_only_class_reach_string_accessor() {
    let ctx = HostContext::new();
    let registry = registry();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let dict = registry.wrap::<Dictionary>().unwrap().create(
        &ctx,
        Some(Dictionary {
            entries: vec![("0".into(), "first".into())],
            seen: seen.clone(),
        }),
    );

    assert_eq!(ctx.get(&dict, "0").unwrap(), HostValue::from("first"));
    // Names the index path would reject as out of range are plain keys here.
    assert_eq!(ctx.get(&dict, "-1").unwrap(), HostValue::Undefined);
    assert_eq!(ctx.get(&dict, "4294967296").unwrap(), HostValue::Undefined);
    ctx.set(&dict, "4294967296", "big").unwrap();
    assert_eq!(ctx.get(&dict, "4294967296").unwrap(), HostValue::from("big"));
    assert_eq!(ctx.get(&dict, "-0").unwrap(), HostValue::Undefined);

    assert_eq!(
        *seen.borrow(),
        vec!["0", "-1", "4294967296", "4294967296", "4294967296", "-0"]
    );
}

#[test]
fn test_string_accessor_receives_names_verbatim() {
    let ctx = HostContext::new();
    let registry = registry();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let dict = registry.wrap::<Dictionary>().unwrap().create(
        &ctx,
        Some(Dictionary {
            entries: vec![("color".into(), "red".into())],
            seen: seen.clone(),
        }),
    );

    assert_eq!(ctx.get(&dict, "color").unwrap(), HostValue::from("red"));
    assert_eq!(ctx.get(&dict, "size").unwrap(), HostValue::Undefined);
    ctx.set(&dict, "size", 3).unwrap();
    assert_eq!(ctx.get(&dict, "size").unwrap(), HostValue::from("3"));
    ctx.set(&dict, "0", "zero").unwrap();
    assert_eq!(ctx.get(&dict, "0").unwrap(), HostValue::from("zero"));

    assert_eq!(
        *seen.borrow(),
        vec!["color", "size", "size", "size", "0", "0"]
    );
    assert_eq!(ctx.keys(&dict), vec!["color", "size", "0"]);
}

#[test]
fn test_enumeration_synthesizes_indices() {
    let ctx = HostContext::new();
    let registry = registry();
    let list = list(&ctx, &registry, &[1.0, 2.0, 3.0]);
    assert_eq!(ctx.keys(&list), vec!["0", "1", "2"]);

    let empty = self::list(&ctx, &registry, &[]);
    assert!(ctx.keys(&empty).is_empty());
}

#[test]
fn test_enumeration_failures_are_swallowed() {
    let ctx = HostContext::new();
    let registry = registry();
    let broken = registry.wrap::<BrokenList>().unwrap().create(&ctx, Some(BrokenList));

    assert!(ctx.keys(&broken).is_empty());
    assert!(ctx.get(&broken, "length").is_err());
}

#[test]
fn test_enumeration_can_be_disabled() {
    let ctx = HostContext::new();
    let registry = ClassRegistry::<Engine>::builder()
        .config(otter_bind::BridgeConfig::new().enumerate_indices(false))
        .register(list_descriptor())
        .unwrap()
        .build();
    let wrap = registry.wrap::<List>().unwrap();
    let list = wrap.create(&ctx, Some(List { items: vec![1.0] }));

    assert!(ctx.keys(&list).is_empty());
    assert!(!wrap.get_class().has_get_property_names_hook());
    assert_eq!(ctx.get(&list, "0").unwrap(), HostValue::from(1));
}

#[test]
fn test_hooks_are_wired_only_when_needed() {
    let registry = registry();

    let list = registry.wrap::<List>().unwrap().get_class();
    assert!(list.has_get_property_hook());
    assert!(list.has_set_property_hook());
    assert!(list.has_get_property_names_hook());
    assert!(list.has_finalize_hook());

    let point = registry.wrap::<Point>().unwrap().get_class();
    assert!(!point.has_get_property_hook());
    assert!(!point.has_set_property_hook());
    assert!(!point.has_get_property_names_hook());
    assert_eq!(point.static_function_names(), vec!["moveBy", "visit"]);
    assert_eq!(point.static_value_names(), vec!["x", "y"]);

    let dict = registry.wrap::<Dictionary>().unwrap().get_class();
    assert!(dict.has_get_property_hook());
    assert!(dict.has_get_property_names_hook());
}

#[test]
fn test_methods() {
    let ctx = HostContext::new();
    let registry = registry();
    let list = list(&ctx, &registry, &[1.0]);

    let length = call_method(&ctx, &list, "push", &[2.into(), 3.into()]).unwrap();
    assert_eq!(length, HostValue::from(3));
    assert_eq!(ctx.get(&list, "2").unwrap(), HostValue::from(3));

    // Method objects are stable and cannot be overwritten.
    assert_eq!(ctx.get(&list, "push").unwrap(), ctx.get(&list, "push").unwrap());
    ctx.set(&list, "push", 1).unwrap();
    assert!(ctx.get(&list, "push").unwrap().is_callable());

    // Methods are not enumerable.
    assert!(!ctx.keys(&list).contains(&"push".to_string()));
}

#[test]
fn test_native_errors_become_exceptions() {
    let ctx = HostContext::new();
    let registry = registry();
    let point = registry
        .wrap::<Point>()
        .unwrap()
        .create(&ctx, Some(Point { x: 0.0, y: 0.0 }));

    let err = call_method(&ctx, &point, "moveBy", &[1.into(), 2.into(), 3.into()]).unwrap_err();
    assert_eq!(
        err.message(),
        "Invalid arguments: at most 2 expected, but 3 supplied."
    );
    match err {
        HostError::Thrown { value, .. } => assert!(value.as_object().unwrap().is_error()),
        other => panic!("expected a thrown exception, got {other:?}"),
    }

    call_method(&ctx, &point, "moveBy", &[1.into(), 2.into()]).unwrap();
    assert_eq!(ctx.get(&point, "y").unwrap(), HostValue::from(2));
}

#[test]
fn test_script_exception_rethrown_unchanged() {
    let ctx = HostContext::new();
    let registry = registry();
    let point = registry
        .wrap::<Point>()
        .unwrap()
        .create(&ctx, Some(Point { x: 0.0, y: 0.0 }));

    let throws_string = ctx.function(|ctx, _, _| Err(HostError::thrown(ctx, "not an error".into())));
    let err = call_method(&ctx, &point, "visit", &[HostValue::from(&throws_string)]).unwrap_err();
    match err {
        HostError::Thrown { value, .. } => assert_eq!(value, HostValue::from("not an error")),
        other => panic!("expected a thrown exception, got {other:?}"),
    }

    let error = ctx.error("bad callback");
    let thrown = error.clone();
    let throws_error =
        ctx.function(move |ctx, _, _| Err(HostError::thrown(ctx, HostValue::from(&thrown))));
    let err = call_method(&ctx, &point, "visit", &[HostValue::from(&throws_error)]).unwrap_err();
    assert_eq!(err.message(), "bad callback");
    assert_eq!(err.into_value(&ctx), HostValue::from(&error));
}

#[test]
fn test_native_panic_becomes_unknown_error() {
    let ctx = HostContext::new();
    let registry = registry();
    let list = list(&ctx, &registry, &[]);

    let err = call_method(&ctx, &list, "explode", &[]).unwrap_err();
    assert_eq!(err.message(), "unknown error");

    // The object is still usable afterwards.
    assert_eq!(call_method(&ctx, &list, "push", &[1.into()]).unwrap(), HostValue::from(1));
}

#[test]
fn test_detached_object() {
    let ctx = HostContext::new();
    let registry = registry();
    let point = registry.wrap::<Point>().unwrap().create(&ctx, None);

    let err = ctx.get(&point, "y").unwrap_err();
    assert_eq!(err.message(), "Point object has no native instance");
}

#[test]
fn test_construct() {
    let ctx = HostContext::new();
    let registry = registry();
    let wrap = registry.wrap::<List>().unwrap();
    let constructor = wrap.create_constructor(&ctx);

    let list = ctx.construct(&constructor, &[4.into(), 5.into()]).unwrap();
    assert_eq!(ctx.get(&list, "1").unwrap(), HostValue::from(5));
    assert!(ctx.instance_of(&HostValue::from(&list), &constructor).unwrap());
    assert!(wrap.has_instance(&ctx, &HostValue::from(&list)));
    assert!(!wrap.has_instance(&ctx, &HostValue::from(ctx.object())));

    let err = ctx.construct(&constructor, &["four".into()]).unwrap_err();
    assert_eq!(err.message(), "List items must be numbers");
}

#[test]
fn test_constructor_with_static_surface() {
    let ctx = HostContext::new();
    let registry = registry();
    let wrap = registry.wrap::<Point>().unwrap();
    let constructor_class = wrap.get_constructor_class().expect("constructor class");
    assert!(
        constructor_class
            .attributes()
            .contains(otter_bind::ClassAttributes::NO_AUTOMATIC_PROTOTYPE)
    );
    assert!(constructor_class.has_instance_hook());
    assert!(constructor_class.has_construct_hook());

    let constructor = wrap.create_constructor(&ctx);
    assert_eq!(ctx.get(&constructor, "dimensions").unwrap(), HostValue::from(2));

    let point = ctx.construct(&constructor, &[3.into(), 4.into()]).unwrap();
    assert_eq!(ctx.get(&point, "x").unwrap(), HostValue::from(3));
    assert!(ctx.instance_of(&HostValue::from(&point), &constructor).unwrap());
    assert!(!ctx.instance_of(&HostValue::from(7), &constructor).unwrap());
}

#[test]
fn test_static_properties_read_and_write() {
    let ctx = HostContext::new();
    let registry = registry();
    let constructor = registry.wrap::<Point>().unwrap().create_constructor(&ctx);

    assert_eq!(ctx.get(&constructor, "precision").unwrap(), HostValue::from(2));
    ctx.set(&constructor, "precision", 5).unwrap();
    assert_eq!(ctx.get(&constructor, "precision").unwrap(), HostValue::from(5));

    let err = ctx.set(&constructor, "dimensions", 3).unwrap_err();
    assert_eq!(err.message(), "Cannot assign to read only property 'dimensions'");
    assert_eq!(ctx.get(&constructor, "dimensions").unwrap(), HostValue::from(2));
}

#[test]
fn test_illegal_constructor() {
    let ctx = HostContext::new();
    let registry = registry();
    let wrap = registry.wrap::<FrozenList>().unwrap();
    assert!(wrap.get_constructor_class().is_none());

    let constructor = wrap.create_constructor(&ctx);
    let err = ctx.construct(&constructor, &[]).unwrap_err();
    assert_eq!(err.message(), "Illegal constructor");
}

#[test]
fn test_superclass_members_are_inherited() {
    let ctx = HostContext::new();
    let registry = registry();
    let squares = registry.wrap::<Square>().unwrap();
    let shapes = registry.wrap::<Shape>().unwrap();

    let square = ctx.construct(&squares.create_constructor(&ctx), &[3.into()]).unwrap();
    assert_eq!(
        call_method(&ctx, &square, "describe", &[]).unwrap(),
        HostValue::from("shape with area 9")
    );
    assert!(shapes.has_instance(&ctx, &HostValue::from(&square)));
    assert_eq!(
        squares.get_class().parent().map(|p| p.name().to_string()),
        Some("Shape".to_string())
    );
    assert!(shapes.get_class().parent().is_none());
}

#[test]
fn test_unwrap_native_rejects_other_classes() {
    let ctx = HostContext::new();
    let registry = registry();
    let point = registry
        .wrap::<Point>()
        .unwrap()
        .create(&ctx, Some(Point { x: 0.0, y: 0.0 }));

    assert!(matches!(
        ObjectWrap::<Engine, List>::unwrap_native(&point),
        Err(BindError::TypeError { .. })
    ));
    assert!(matches!(
        ObjectWrap::<Engine, List>::unwrap_native(&ctx.object()),
        Err(BindError::TypeError { .. })
    ));
}
