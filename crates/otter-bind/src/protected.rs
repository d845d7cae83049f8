//! GC-protected handles for values carried across native callbacks
//!
//! A [`Protected`] handle keeps a script value alive independently of the
//! engine's reachability analysis. Handles are reference counted: clones
//! share one protection, which is released when the last clone is dropped.
//! A handle captured by a notification callback must outlive every future
//! invocation of that callback, not just the call that registered it.

use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use crate::engine::{EngineTypes, ScriptEngine};

struct ProtectedInner<E: ScriptEngine, H> {
    ctx: E::Context,
    handle: H,
    value: E::Value,
}

impl<E: ScriptEngine, H> Drop for ProtectedInner<E, H> {
    fn drop(&mut self) {
        E::unprotect(&self.ctx, &self.value);
    }
}

/// Shared, GC-protected reference to a script value of handle type `H`
///
/// The handle also retains the context it was created in, so callbacks can
/// run against it after the registering call has returned.
pub struct Protected<E: ScriptEngine, H> {
    inner: Rc<ProtectedInner<E, H>>,
}

/// Protected script value
pub type ProtectedValue<E> = Protected<E, <E as EngineTypes>::Value>;
/// Protected script object
pub type ProtectedObject<E> = Protected<E, <E as EngineTypes>::Object>;
/// Protected script function
pub type ProtectedFunction<E> = Protected<E, <E as EngineTypes>::Function>;

impl<E: ScriptEngine, H> Protected<E, H> {
    /// Protect `handle`, whose engine value representation is `value`
    pub fn new(ctx: &E::Context, handle: H, value: E::Value) -> Self {
        E::protect(ctx, &value);
        Self {
            inner: Rc::new(ProtectedInner {
                ctx: ctx.clone(),
                handle,
                value,
            }),
        }
    }

    pub fn get(&self) -> &H {
        &self.inner.handle
    }

    /// The protected handle as a plain script value
    pub fn value(&self) -> &E::Value {
        &self.inner.value
    }

    /// Context retained by this handle
    pub fn context(&self) -> &E::Context {
        &self.inner.ctx
    }

    /// Engine-level identity comparison (`===`), across handle types
    pub fn same_as<H2>(&self, other: &Protected<E, H2>) -> bool {
        E::strict_equals(&self.inner.ctx, &self.inner.value, &other.inner.value)
    }

    /// Number of live clones sharing this protection
    pub fn share_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }
}

impl<E: ScriptEngine, H> Clone for Protected<E, H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: ScriptEngine, H> Deref for Protected<E, H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.inner.handle
    }
}

impl<E: ScriptEngine, H> fmt::Debug for Protected<E, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Protected({:?})", self.inner.value)
    }
}

pub fn protect_value<E: ScriptEngine>(ctx: &E::Context, value: &E::Value) -> ProtectedValue<E> {
    Protected::new(ctx, value.clone(), value.clone())
}

pub fn protect_object<E: ScriptEngine>(ctx: &E::Context, object: &E::Object) -> ProtectedObject<E> {
    Protected::new(ctx, object.clone(), E::from_object(ctx, object))
}

pub fn protect_function<E: ScriptEngine>(
    ctx: &E::Context,
    function: &E::Function,
) -> ProtectedFunction<E> {
    Protected::new(ctx, function.clone(), E::from_function(ctx, function))
}
