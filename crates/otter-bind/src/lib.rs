//! Bridge between native objects and an embedded script engine.
//!
//! Native code describes a type's script-visible surface once with a
//! [`ClassDescriptor`], registers it in a [`ClassRegistry`], and gets
//! engine classes, wrapped objects and property dispatch from
//! [`ObjectWrap`]. Native change tracking reaches script listeners through
//! a [`ChangeSource`] and the [`ObservableCollection`] façade.
//!
//! The crate never names a concrete engine. A host implements the
//! capability traits in [`engine`] ([`ObjectModel`], [`ValueConversion`],
//! [`ExceptionTranslation`]) and every other type is generic over it.
//!
//! # Example
//!
//! ```ignore
//! use otter_bind::{ClassDescriptor, ClassRegistry, ValueConversion};
//!
//! #[derive(Default)]
//! struct Point { x: f64 }
//!
//! let registry = ClassRegistry::<MyEngine>::builder()
//!     .register(
//!         ClassDescriptor::<MyEngine, Point>::new("Point")
//!             .native_getter("x", |ctx, p: &Point| Ok(MyEngine::from_number(ctx, p.x))),
//!     )?
//!     .build();
//!
//! let point = registry.wrap::<Point>()?.create(&ctx, Some(Point { x: 1.0 }));
//! ```
//!
//! # Thread Safety
//!
//! Everything here is `!Send` and lives on the engine thread, except
//! [`ChangeSender`], which native producers on other threads use to queue
//! change sets for [`ChangeNotifier::deliver_pending`].

pub mod change_set;
pub mod class;
pub mod collection;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod marshal;
pub mod notifier;
pub mod protected;
pub mod registry;
pub mod wrap;

pub use change_set::{CollectionChangeSet, IndexSet};
pub use class::{
    ClassAttributes, ClassDefinition, Constructed, HookResult, PropertyAttributes,
    PropertyNameAccumulator, ScriptException,
};
pub use collection::{Collection, Observable, ObservableCollection, collection_descriptor};
pub use config::BridgeConfig;
pub use descriptor::{
    ClassDescriptor, Superclass, validate_argument_count, validate_argument_count_range,
};
pub use engine::{
    EngineTypes, ExceptionTranslation, ObjectModel, PrivateData, ScriptEngine, ValueConversion,
};
pub use error::{BindError, BindResult, ErrorKind, ThrownValue, UNKNOWN_ERROR_MESSAGE};
pub use marshal::{create_collection_change_set, index_array};
pub use notifier::{
    ChangeEvent, ChangeNotifier, ChangeSender, ChangeSource, CollectionChangeCallback,
    NotificationError, NotificationToken,
};
pub use protected::{
    Protected, ProtectedFunction, ProtectedObject, ProtectedValue, protect_function,
    protect_object, protect_value,
};
pub use registry::{ClassRegistry, ClassRegistryBuilder};
pub use wrap::{
    IndexParseError, NativeSlot, ObjectWrap, exception, validated_get_length,
    validated_positive_index,
};
