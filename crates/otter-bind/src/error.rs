//! Error types for native/script boundary crossings
//!
//! Every native failure that can reach a dispatch entry point is expressed
//! as a [`BindError`]. The dispatch layer never inspects the concrete
//! variant to decide how to surface a failure; it branches on the coarse
//! [`ErrorKind`] tag instead.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// Result type alias for binding operations
pub type BindResult<T> = Result<T, BindError>;

/// Message used for failures that carry no recognizable description
pub const UNKNOWN_ERROR_MESSAGE: &str = "unknown error";

/// Coarse classification used by the dispatch layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Position outside the valid range (index reads degrade to undefined)
    OutOfRange,
    /// Argument that cannot be interpreted (e.g. a property name that is not an index)
    InvalidArgument,
    /// Everything else
    Other,
}

/// Structured error types for native bindings
#[derive(Debug, Error)]
pub enum BindError {
    /// Index or position outside the valid range
    #[error("{0}")]
    OutOfRange(String),

    /// Invalid argument supplied by script code
    #[error("{0}")]
    InvalidArgument(String),

    /// Value had an unexpected type
    #[error("{expected} expected, got {actual}")]
    TypeError { expected: String, actual: String },

    /// Write to an index of a collection without an index setter
    #[error("Cannot assign to read only index {0}")]
    ReadOnlyIndex(u32),

    /// Write to a declared property without a setter
    #[error("Cannot assign to read only property '{0}'")]
    ReadOnlyProperty(String),

    /// Construction of a class without a native constructor
    #[error("Illegal constructor")]
    IllegalConstructor,

    /// Wrapped object has no native instance (not constructed yet, or finalized)
    #[error("{class} object has no native instance")]
    Detached { class: String },

    /// Script code threw while the engine ran an operation on our behalf
    ///
    /// `value` carries the thrown script value when the engine supplied it,
    /// so the dispatch boundary can rethrow it unchanged.
    #[error("{message}")]
    Thrown {
        message: String,
        value: Option<ThrownValue>,
    },

    /// Failure reported by native accessor or constructor code
    #[error("{0}")]
    Native(String),

    /// Failure without a recognizable description
    #[error("unknown error")]
    Unknown,

    /// A descriptor for the same native type was registered twice
    #[error("Class '{0}' is already registered")]
    DuplicateClass(String),

    /// Superclass must be registered before its subclasses
    #[error("Superclass of '{class}' is not registered: {superclass}")]
    UnknownSuperclass { class: String, superclass: String },

    /// Superclass chain loops back onto itself
    #[error("Superclass chain of '{0}' is cyclic")]
    CyclicSuperclass(String),

    /// No descriptor has been registered for the native type
    #[error("No class registered for native type {0}")]
    UnregisteredClass(String),

    /// Bounded notification queue is full
    #[error("Notification queue is full ({capacity} pending)")]
    QueueFull { capacity: usize },

    /// Receiving side of a notification queue is gone
    #[error("Notification receiver has been dropped")]
    Disconnected,

    /// Configuration could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Internal/unexpected error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BindError {
    /// Create an out-of-range error
    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::OutOfRange(message.into())
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a type error
    pub fn type_error(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeError {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a native failure
    pub fn native(message: impl Into<String>) -> Self {
        Self::Native(message.into())
    }

    /// Script exception known only by its message
    pub fn thrown(message: impl Into<String>) -> Self {
        Self::Thrown {
            message: message.into(),
            value: None,
        }
    }

    /// Script exception carrying the engine value that was thrown
    pub fn thrown_value<V: Any>(message: impl Into<String>, value: V) -> Self {
        Self::Thrown {
            message: message.into(),
            value: Some(ThrownValue::new(value)),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Classify this error for the dispatch layer
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OutOfRange(_) => ErrorKind::OutOfRange,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            _ => ErrorKind::Other,
        }
    }

    /// Message placed into the script exception for this error
    pub fn script_message(&self) -> String {
        let message = self.to_string();
        if message.is_empty() {
            UNKNOWN_ERROR_MESSAGE.to_string()
        } else {
            message
        }
    }

    /// Build an error from a caught panic payload
    ///
    /// Payloads are not a stable description of the failure, so every panic
    /// surfaces as [`BindError::Unknown`].
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned());
        tracing::debug!(panic = ?detail, "native code panicked at binding boundary");
        Self::Unknown
    }
}

/// Engine value thrown by script code, with its engine type erased
#[derive(Clone)]
pub struct ThrownValue(Rc<dyn Any>);

impl ThrownValue {
    pub fn new<V: Any>(value: V) -> Self {
        Self(Rc::new(value))
    }

    pub fn downcast_ref<V: Any>(&self) -> Option<&V> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for ThrownValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ThrownValue(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_messages() {
        assert_eq!(
            BindError::ReadOnlyIndex(3).to_string(),
            "Cannot assign to read only index 3"
        );
        assert_eq!(
            BindError::ReadOnlyProperty("length".into()).to_string(),
            "Cannot assign to read only property 'length'"
        );
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(BindError::out_of_range("x").kind(), ErrorKind::OutOfRange);
        assert_eq!(
            BindError::invalid_argument("x").kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(BindError::native("x").kind(), ErrorKind::Other);
        assert_eq!(BindError::IllegalConstructor.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_native_message_preserved() {
        let err = BindError::native("Realm is closed");
        assert_eq!(err.script_message(), "Realm is closed");
    }

    #[test]
    fn test_empty_message_becomes_unknown() {
        assert_eq!(BindError::native("").script_message(), "unknown error");
        assert_eq!(BindError::Unknown.script_message(), "unknown error");
    }

    #[test]
    fn test_panic_payload_is_unknown() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert!(matches!(BindError::from_panic(payload), BindError::Unknown));
    }

    #[test]
    fn test_thrown_value_keeps_engine_value() {
        let err = BindError::thrown_value("42", 42_i64);
        assert_eq!(err.script_message(), "42");
        match err {
            BindError::Thrown { value: Some(value), .. } => {
                assert_eq!(value.downcast_ref::<i64>(), Some(&42));
                assert!(value.downcast_ref::<String>().is_none());
            }
            other => panic!("expected a thrown value, got {other:?}"),
        }
        assert!(matches!(
            BindError::thrown("boom"),
            BindError::Thrown { value: None, .. }
        ));
    }

    #[test]
    fn test_type_error_display() {
        let err = BindError::type_error("function", "number");
        assert_eq!(err.to_string(), "function expected, got number");
    }
}
