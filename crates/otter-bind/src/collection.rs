//! Script-facing listener registration for observable collections
//!
//! [`ObservableCollection`] keeps one `(identity, token)` pair per
//! registered listener. The identity is the protected listener value passed
//! by script code (a function, or an options object with optional
//! `before`/`after`/`error` functions); removal compares identities with
//! the engine's `===`.
//!
//! Every value a listener needs later (context, bound object, callables) is
//! held through a [`Protected`](crate::Protected) handle, since the change
//! source fires outside the script call that registered the listener.

use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::change_set::CollectionChangeSet;
use crate::descriptor::{ClassDescriptor, validate_argument_count};
use crate::engine::ScriptEngine;
use crate::error::{BindError, BindResult};
use crate::marshal::{create_collection_change_set, index_array};
use crate::notifier::{ChangeSource, CollectionChangeCallback, NotificationError, NotificationToken};
use crate::protected::{
    ProtectedFunction, ProtectedObject, ProtectedValue, protect_function, protect_object,
    protect_value,
};
use crate::wrap::{ObjectWrap, guard};

/// Call a listener function, logging failures instead of propagating them
fn call_listener<E: ScriptEngine>(
    phase: &'static str,
    function: &ProtectedFunction<E>,
    this: &ProtectedObject<E>,
    args: impl FnOnce(&E::Context) -> BindResult<Vec<E::Value>>,
) {
    let ctx = function.context();
    let result = guard(|| {
        let args = args(ctx)?;
        E::call_function(ctx, function.get(), Some(this.get()), &args)
    });
    if let Err(err) = result {
        warn!(phase, error = %err, "change listener threw");
    }
}

/// `listener(object, changes)`
struct FunctionListener<E: ScriptEngine> {
    this: ProtectedObject<E>,
    function: ProtectedFunction<E>,
}

impl<E: ScriptEngine> CollectionChangeCallback for FunctionListener<E> {
    fn after(&mut self, changes: &CollectionChangeSet) {
        call_listener("change", &self.function, &self.this, |ctx| {
            let change_set = create_collection_change_set::<E>(ctx, changes)?;
            Ok(vec![
                self.this.value().clone(),
                E::from_object(ctx, &change_set),
            ])
        });
    }

    fn error(&mut self, error: &NotificationError) {
        warn!(error = %error, "change computation failed; function listener not invoked");
    }
}

/// `{ before(object, deletions, modifications), after(object, insertions, modifications), error(object, message) }`
struct ListenerCallbacks<E: ScriptEngine> {
    this: ProtectedObject<E>,
    before: Option<ProtectedFunction<E>>,
    after: Option<ProtectedFunction<E>>,
    error: Option<ProtectedFunction<E>>,
}

impl<E: ScriptEngine> CollectionChangeCallback for ListenerCallbacks<E> {
    fn before(&mut self, changes: &CollectionChangeSet) {
        if let Some(before) = &self.before {
            call_listener("before", before, &self.this, |ctx| {
                Ok(vec![
                    self.this.value().clone(),
                    index_array::<E>(ctx, &changes.deletions)?,
                    index_array::<E>(ctx, &changes.modifications)?,
                ])
            });
        }
    }

    fn after(&mut self, changes: &CollectionChangeSet) {
        if let Some(after) = &self.after {
            call_listener("after", after, &self.this, |ctx| {
                Ok(vec![
                    self.this.value().clone(),
                    index_array::<E>(ctx, &changes.insertions)?,
                    index_array::<E>(ctx, &changes.modifications_new)?,
                ])
            });
        }
    }

    fn error(&mut self, error: &NotificationError) {
        match &self.error {
            Some(callback) => call_listener("error", callback, &self.this, |ctx| {
                Ok(vec![
                    self.this.value().clone(),
                    E::from_string(ctx, error.message()),
                ])
            }),
            None => debug!(error = %error, "change computation failed; no error listener"),
        }
    }
}

fn describe<E: ScriptEngine>(ctx: &E::Context, value: &E::Value) -> String {
    if E::is_undefined(ctx, value) {
        return "undefined".to_string();
    }
    E::to_string(ctx, value).unwrap_or_else(|_| "value".to_string())
}

/// Optional callable field of a listener options object
fn listener_field<E: ScriptEngine>(
    ctx: &E::Context,
    options: &E::Object,
    name: &str,
) -> BindResult<Option<ProtectedFunction<E>>> {
    let value = E::get_property(ctx, options, name)?;
    if E::is_undefined(ctx, &value) {
        return Ok(None);
    }
    if !E::is_function(ctx, &value) {
        return Err(BindError::type_error(
            format!("Function for listener '{name}'"),
            describe::<E>(ctx, &value),
        ));
    }
    let function = E::to_function(ctx, &value)?;
    Ok(Some(protect_function::<E>(ctx, &function)))
}

struct ListenerEntry<E: ScriptEngine> {
    identity: ProtectedValue<E>,
    _token: NotificationToken,
}

/// Listener registry owned by an observable wrapped collection
pub struct ObservableCollection<E: ScriptEngine> {
    source: Rc<dyn ChangeSource>,
    listeners: Vec<ListenerEntry<E>>,
}

impl<E: ScriptEngine> ObservableCollection<E> {
    pub fn new(source: Rc<dyn ChangeSource>) -> Self {
        Self {
            source,
            listeners: Vec::new(),
        }
    }

    /// Register `listener` for changes to the collection bound to `this`
    ///
    /// `listener` is either a function called as `listener(this, changes)`,
    /// or an object whose optional `before`, `after` and `error` fields are
    /// functions.
    pub fn add_listener(
        &mut self,
        ctx: &E::Context,
        this: &E::Object,
        listener: &E::Value,
    ) -> BindResult<()> {
        let bound = protect_object::<E>(ctx, this);

        let callback: Box<dyn CollectionChangeCallback> = if E::is_function(ctx, listener) {
            let function = E::to_function(ctx, listener)?;
            Box::new(FunctionListener {
                this: bound,
                function: protect_function::<E>(ctx, &function),
            })
        } else if E::is_object(ctx, listener) {
            let options = E::to_object(ctx, listener)?;
            Box::new(ListenerCallbacks {
                this: bound,
                before: listener_field::<E>(ctx, &options, "before")?,
                after: listener_field::<E>(ctx, &options, "after")?,
                error: listener_field::<E>(ctx, &options, "error")?,
            })
        } else {
            return Err(BindError::type_error(
                "Function or listener object",
                describe::<E>(ctx, listener),
            ));
        };

        let token = self.source.add_notification_callback(callback);
        self.listeners.push(ListenerEntry {
            identity: protect_value::<E>(ctx, listener),
            _token: token,
        });
        debug!(listeners = self.listeners.len(), "listener added");
        Ok(())
    }

    /// Remove every registration whose identity is `===` to `identity`
    ///
    /// Returns the number of registrations removed.
    pub fn remove_listener(&mut self, identity: &ProtectedValue<E>) -> usize {
        self.remove_matching(|entry| entry.identity.same_as(identity))
    }

    /// [`remove_listener`](Self::remove_listener) for an unprotected value
    pub fn remove_listener_value(&mut self, ctx: &E::Context, listener: &E::Value) -> usize {
        self.remove_matching(|entry| E::strict_equals(ctx, entry.identity.value(), listener))
    }

    /// Drop every registration; no listener is called afterwards
    pub fn remove_all_listeners(&mut self) {
        let removed = std::mem::take(&mut self.listeners);
        debug!(removed = removed.len(), "all listeners removed");
        drop(removed);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn source(&self) -> &Rc<dyn ChangeSource> {
        &self.source
    }

    fn remove_matching(&mut self, matches: impl Fn(&ListenerEntry<E>) -> bool) -> usize {
        let (removed, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.listeners).into_iter().partition(|entry| matches(entry));
        self.listeners = kept;
        debug!(removed = removed.len(), remaining = self.listeners.len(), "listener removed");
        removed.len()
    }
}

impl<E: ScriptEngine> fmt::Debug for ObservableCollection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableCollection")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Native types exposing a listener registry to script code
pub trait Observable<E: ScriptEngine> {
    fn listeners(&mut self) -> &mut ObservableCollection<E>;
}

fn first_argument<E: ScriptEngine>(ctx: &E::Context, args: &[E::Value]) -> BindResult<E::Value> {
    validate_argument_count(args, 1)?;
    args.first()
        .cloned()
        .ok_or_else(|| BindError::type_error("Function or listener object", "undefined"))
}

impl<E: ScriptEngine, T: Observable<E> + 'static> ClassDescriptor<E, T> {
    /// Add `addListener`, `removeListener` and `removeAllListeners` methods
    pub fn observable(self) -> Self {
        self.method(
            "addListener",
            |ctx: &E::Context, this: &E::Object, args: &[E::Value]| {
                let listener = first_argument::<E>(ctx, args)?;
                ObjectWrap::<E, T>::unwrap_native(this)?
                    .with_mut(|native| native.listeners().add_listener(ctx, this, &listener))??;
                Ok(E::undefined(ctx))
            },
        )
        .method(
            "removeListener",
            |ctx: &E::Context, this: &E::Object, args: &[E::Value]| {
                let listener = first_argument::<E>(ctx, args)?;
                ObjectWrap::<E, T>::unwrap_native(this)?
                    .with_mut(|native| native.listeners().remove_listener_value(ctx, &listener))?;
                Ok(E::undefined(ctx))
            },
        )
        .method(
            "removeAllListeners",
            |ctx: &E::Context, this: &E::Object, args: &[E::Value]| {
                validate_argument_count(args, 0)?;
                ObjectWrap::<E, T>::unwrap_native(this)?
                    .with_mut(|native| native.listeners().remove_all_listeners())?;
                Ok(E::undefined(ctx))
            },
        )
    }
}

/// Root class that collection types extend
#[derive(Debug, Default)]
pub struct Collection;

/// Descriptor for the `"Collection"` root class
pub fn collection_descriptor<E: ScriptEngine>() -> ClassDescriptor<E, Collection> {
    ClassDescriptor::new("Collection")
}
