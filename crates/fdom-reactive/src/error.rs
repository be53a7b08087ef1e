#![forbid(unsafe_code)]

//! Error types for effect execution.

use std::any::Any;

/// Failure of a single effect body or cleanup.
///
/// Effect errors are isolated at the run/flush boundary: they are logged and
/// never returned to the caller of [`Runtime::flush`](crate::Runtime::flush).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EffectError {
    /// The body panicked.
    #[error("effect panicked: {message}")]
    Panicked { message: String },
    /// The body returned an `Err`.
    #[error("effect failed: {message}")]
    Failed { message: String },
}

impl EffectError {
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::Panicked {
            message: panic_message(payload),
        }
    }
}

/// Best-effort extraction of a panic payload message.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
