//! Native change source and notification tokens
//!
//! [`ChangeNotifier`] stands in for the native change-tracking primitive.
//! Producers on any thread post change sets through a [`ChangeSender`];
//! the engine thread calls [`ChangeNotifier::deliver_pending`] to run the
//! registered callbacks. Script values are only touched from that call.
//!
//! Delivery order for one change set is every callback's `before`, then
//! every callback's `after`. A delivery works on a snapshot of the
//! registered callbacks: a callback whose token is dropped before its turn
//! is skipped, a callback that is already running completes.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::rc::{Rc, Weak};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};
use thiserror::Error;
use tracing::{debug, trace};

use crate::change_set::CollectionChangeSet;
use crate::config::BridgeConfig;
use crate::error::{BindError, BindResult, UNKNOWN_ERROR_MESSAGE};

/// Failure of the native change computation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    /// Recognized native failure with its message
    #[error("{0}")]
    Failed(String),
    /// Failure without a usable description
    #[error("unknown error")]
    Unknown,
}

impl NotificationError {
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.is_empty() {
            Self::Unknown
        } else {
            Self::Failed(message)
        }
    }

    /// Message handed to script `error` listeners
    pub fn message(&self) -> &str {
        match self {
            Self::Failed(message) => message,
            Self::Unknown => UNKNOWN_ERROR_MESSAGE,
        }
    }
}

impl From<&BindError> for NotificationError {
    fn from(err: &BindError) -> Self {
        match err {
            BindError::Unknown => Self::Unknown,
            other => Self::failed(other.script_message()),
        }
    }
}

/// Receiver of change notifications
///
/// Every method defaults to doing nothing so implementors only handle the
/// phases they care about.
pub trait CollectionChangeCallback {
    /// Called before the change is visible; positions are pre-change
    fn before(&mut self, _changes: &CollectionChangeSet) {}

    /// Called after the change; insertions and `modifications_new` are post-change
    fn after(&mut self, _changes: &CollectionChangeSet) {}

    /// Called instead of `before`/`after` when the change computation failed
    fn error(&mut self, _error: &NotificationError) {}
}

/// Something that accepts change callbacks
pub trait ChangeSource {
    /// Subscribe `callback`; it stays registered until the token is dropped
    fn add_notification_callback(
        &self,
        callback: Box<dyn CollectionChangeCallback>,
    ) -> NotificationToken;
}

/// Owned subscription to a change source; dropping it unsubscribes
#[must_use = "dropping a NotificationToken unsubscribes immediately"]
pub struct NotificationToken {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl NotificationToken {
    /// Token that runs `unsubscribe` when dropped
    pub fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Token for a source that never fires
    pub fn inert() -> Self {
        Self { unsubscribe: None }
    }

    pub fn is_inert(&self) -> bool {
        self.unsubscribe.is_none()
    }
}

impl Drop for NotificationToken {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for NotificationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationToken")
            .field("inert", &self.is_inert())
            .finish()
    }
}

/// One queued notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Changes(CollectionChangeSet),
    Error(NotificationError),
}

/// Cloneable, thread-safe handle for posting change events
#[derive(Debug, Clone)]
pub struct ChangeSender {
    tx: Sender<ChangeEvent>,
    capacity: Option<usize>,
}

impl ChangeSender {
    pub fn send(&self, event: ChangeEvent) -> BindResult<()> {
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => BindError::QueueFull {
                capacity: self.capacity.unwrap_or_default(),
            },
            TrySendError::Disconnected(_) => BindError::Disconnected,
        })
    }

    pub fn send_changes(&self, changes: CollectionChangeSet) -> BindResult<()> {
        self.send(ChangeEvent::Changes(changes))
    }

    pub fn send_error(&self, error: NotificationError) -> BindResult<()> {
        self.send(ChangeEvent::Error(error))
    }
}

type SharedCallback = Rc<RefCell<Box<dyn CollectionChangeCallback>>>;

struct NotifierInner {
    callbacks: RefCell<BTreeMap<u64, SharedCallback>>,
    next_id: Cell<u64>,
    delivering: Cell<bool>,
    tx: Sender<ChangeEvent>,
    rx: Receiver<ChangeEvent>,
    capacity: Option<usize>,
    batch_limit: Option<usize>,
}

impl NotifierInner {
    fn is_registered(&self, id: u64) -> bool {
        self.callbacks.borrow().contains_key(&id)
    }

    fn snapshot(&self) -> Vec<(u64, SharedCallback)> {
        self.callbacks
            .borrow()
            .iter()
            .map(|(id, callback)| (*id, callback.clone()))
            .collect()
    }

    fn remove(&self, id: u64) {
        // Drop the callback after the map borrow ends; its destructor may
        // release tokens of this notifier.
        let removed = self.callbacks.borrow_mut().remove(&id);
        if removed.is_some() {
            trace!(callback = id, "notification callback removed");
        }
        drop(removed);
    }

    fn dispatch(&self, event: &ChangeEvent) {
        let snapshot = self.snapshot();
        let each = |f: &dyn Fn(&mut dyn CollectionChangeCallback)| {
            for (id, callback) in &snapshot {
                if !self.is_registered(*id) {
                    continue;
                }
                match callback.try_borrow_mut() {
                    Ok(mut callback) => f(callback.as_mut()),
                    Err(_) => debug!(callback = id, "skipping callback that is already running"),
                }
            }
        };

        match event {
            ChangeEvent::Changes(changes) => {
                each(&|callback| callback.before(changes));
                each(&|callback| callback.after(changes));
            }
            ChangeEvent::Error(error) => each(&|callback| callback.error(error)),
        }
    }
}

struct DeliveryGuard<'a>(&'a Cell<bool>);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Engine-thread change source fed through a channel
#[derive(Clone)]
pub struct ChangeNotifier {
    inner: Rc<NotifierInner>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(&BridgeConfig::default())
    }
}

impl ChangeNotifier {
    pub fn new(config: &BridgeConfig) -> Self {
        let capacity = config.notification_capacity.map(NonZeroUsize::get);
        let (tx, rx) = match capacity {
            Some(capacity) => bounded(capacity),
            None => unbounded(),
        };
        Self {
            inner: Rc::new(NotifierInner {
                callbacks: RefCell::new(BTreeMap::new()),
                next_id: Cell::new(0),
                delivering: Cell::new(false),
                tx,
                rx,
                capacity,
                batch_limit: config.delivery_batch_limit.map(NonZeroUsize::get),
            }),
        }
    }

    /// Handle for posting events from any thread
    pub fn sender(&self) -> ChangeSender {
        ChangeSender {
            tx: self.inner.tx.clone(),
            capacity: self.inner.capacity,
        }
    }

    pub fn callback_count(&self) -> usize {
        self.inner.callbacks.borrow().len()
    }

    /// Events queued but not yet delivered
    pub fn pending_count(&self) -> usize {
        self.inner.rx.len()
    }

    /// Deliver queued events to the registered callbacks
    ///
    /// Returns the number of events delivered. Calls made from inside a
    /// callback deliver nothing and return 0.
    pub fn deliver_pending(&self) -> usize {
        let inner = &self.inner;
        if inner.delivering.replace(true) {
            trace!("nested deliver_pending ignored");
            return 0;
        }
        let _guard = DeliveryGuard(&inner.delivering);

        let limit = inner.batch_limit.unwrap_or(usize::MAX);
        let mut delivered = 0;
        while delivered < limit {
            let Ok(event) = inner.rx.try_recv() else {
                break;
            };
            trace!(
                callbacks = inner.callbacks.borrow().len(),
                failed = matches!(event, ChangeEvent::Error(_)),
                "delivering change notification"
            );
            inner.dispatch(&event);
            delivered += 1;
        }
        delivered
    }
}

impl ChangeSource for ChangeNotifier {
    fn add_notification_callback(
        &self,
        callback: Box<dyn CollectionChangeCallback>,
    ) -> NotificationToken {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .callbacks
            .borrow_mut()
            .insert(id, Rc::new(RefCell::new(callback)));
        trace!(callback = id, "notification callback added");

        let weak: Weak<NotifierInner> = Rc::downgrade(&self.inner);
        NotificationToken::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove(id);
            }
        })
    }
}
