//! In-memory reference engine for `otter-bind`.
//!
//! [`HostEngine`] implements the capability traits of `otter-bind` on top
//! of reference-counted objects, so the dispatch framework and listener
//! façade can be embedded and tested without a native script engine.
//!
//! The [`HostContext`] stands in for running script code:
//!
//! ```ignore
//! use otter_bind_host::{HostContext, HostEngine};
//!
//! let ctx = HostContext::new();
//! let wrap = registry.wrap::<Counter>()?;
//! let counter = wrap.create(&ctx, Some(Counter::default()));
//! let increment = ctx.get(&counter, "increment")?;
//! ctx.call(increment.as_object().unwrap(), Some(&counter), &[])?;
//! ```
//!
//! Objects are finalized when their last reference is dropped, which makes
//! native instance lifetimes directly observable in tests.

mod class;
mod context;
mod engine;
mod error;
mod object;
mod value;

pub use class::HostClass;
pub use context::HostContext;
pub use engine::HostEngine;
pub use error::{HostError, HostResult};
pub use object::{HostObject, NativeFunction};
pub use value::HostValue;
