//! Error taxonomy for compiled and executed operations.

use std::time::Duration;

use crate::expression::ExpressionError;
use crate::transport::TransportError;

/// Terminal error returned by every Dynaflow operation.
#[derive(Debug, thiserror::Error)]
pub enum DynaflowError {
    /// The request was rejected before any network call.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An expression could not be compiled.
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    /// An attempt lost the race against its deadline.
    #[error("attempt timed out after {after:?}")]
    Timeout {
        /// The deadline that expired.
        after: Duration,
    },

    /// A failure that may succeed on a later attempt.
    #[error("transient failure: {0}")]
    Transient(#[source] TransportError),

    /// A failure that will not succeed on retry.
    #[error(transparent)]
    Fatal(TransportError),
}

impl DynaflowError {
    /// Build a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Classify a transport failure as transient or fatal.
    #[must_use]
    pub fn from_transport(err: TransportError) -> Self {
        if err.is_retryable() {
            Self::Transient(err)
        } else {
            Self::Fatal(err)
        }
    }

    /// Whether the executor may issue another attempt after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transient(_))
    }
}

/// Convenience result type for Dynaflow operations.
pub type DynaflowResult<T> = Result<T, DynaflowError>;
