#![forbid(unsafe_code)]

//! Deferred-flush scopes.
//!
//! While a [`BatchScope`] is alive, signal writes still update values and
//! mark subscribers pending, but no frame is requested. When the outermost
//! scope drops, the pending set is flushed once, synchronously, so N writes
//! collapse into at most one run per affected effect.
//!
//! # Invariants
//!
//! 1. Values are visible immediately inside the scope.
//! 2. Nested scopes are supported; only the outermost triggers the flush.
//! 3. A scope closed while a flush is already running (a batch inside an
//!    effect body) defers to the next pass instead of flushing re-entrantly.
//! 4. A scope dropped during unwinding requests a frame instead of flushing.

use std::fmt;

use crate::runtime::Runtime;

/// RAII guard that defers flushing until it is dropped.
#[must_use = "dropping the scope ends the batch immediately"]
pub struct BatchScope {
    runtime: Runtime,
}

impl BatchScope {
    /// Open a batch on `runtime`.
    pub fn new(runtime: &Runtime) -> Self {
        runtime.begin_batch();
        Self {
            runtime: runtime.clone(),
        }
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        self.runtime.end_batch();
    }
}

impl fmt::Debug for BatchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchScope")
            .field("pending", &self.runtime.pending_count())
            .finish()
    }
}
