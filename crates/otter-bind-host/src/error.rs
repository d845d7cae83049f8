//! Errors raised by host engine operations

use otter_bind::BindError;
use thiserror::Error;

use crate::context::HostContext;
use crate::value::HostValue;

/// Result type alias for host engine operations
pub type HostResult<T> = Result<T, HostError>;

/// A script-level failure inside the host engine
#[derive(Debug, Clone, Error)]
pub enum HostError {
    /// An exception value was thrown
    #[error("{message}")]
    Thrown { message: String, value: HostValue },

    /// Operation applied to a value of the wrong type
    #[error("{0}")]
    TypeError(String),
}

impl HostError {
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError(message.into())
    }

    /// Exception carrying `value`, described with the context's message rules
    pub fn thrown(ctx: &HostContext, value: HostValue) -> Self {
        Self::Thrown {
            message: ctx.exception_message(&value),
            value,
        }
    }

    /// Message of the thrown exception
    pub fn message(&self) -> &str {
        match self {
            Self::Thrown { message, .. } => message,
            Self::TypeError(message) => message,
        }
    }

    /// The exception as a script value
    pub fn into_value(self, ctx: &HostContext) -> HostValue {
        match self {
            Self::Thrown { value, .. } => value,
            Self::TypeError(message) => HostValue::Object(ctx.error(&message)),
        }
    }
}

impl From<HostError> for BindError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Thrown { message, value } => BindError::thrown_value(message, value),
            HostError::TypeError(message) => BindError::thrown(message),
        }
    }
}
