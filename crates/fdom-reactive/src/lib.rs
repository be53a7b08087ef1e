#![forbid(unsafe_code)]

//! Signals, effects, and a paint-aligned effect scheduler.
//!
//! This crate provides:
//! - [`Runtime`], the explicit execution context owning the observer slot,
//!   the effect arena, and the pending set
//! - [`Signal`] (replace-on-write) and [`DeepSignal`] (merge-on-write)
//! - [`Effect`] with automatic dependency tracking, [`DepsEffect`] gated
//!   on an explicit dependency value, and [`DomEffect`] deferred to the next
//!   frame
//! - [`Computed`] and [`Memo`] derived values
//! - [`BatchScope`] for collapsing writes into one flush
//! - [`Store`], [`Trigger`], and [`Context`] helpers
//! - [`FrameHost`], the paint-timing seam, with [`ManualFrameHost`] for tests
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use fdom_reactive::{ManualFrameHost, Runtime};
//!
//! let host = ManualFrameHost::new();
//! let rt = Runtime::new(host.clone());
//! let count = rt.signal(0);
//! let seen = Rc::new(Cell::new(0));
//!
//! let (c, s) = (count.clone(), Rc::clone(&seen));
//! let _effect = rt.create_effect(move || s.set(c.get()));
//!
//! count.set(3);
//! host.advance_frame();
//! assert_eq!(seen.get(), 3);
//! ```

pub mod batch;
pub mod context;
#[cfg(feature = "deep")]
pub mod deep;
pub mod derived;
pub mod effect;
pub mod error;
pub mod frame;
pub mod runtime;
pub mod signal;
pub mod store;
pub mod trigger;

pub use batch::BatchScope;
pub use context::Context;
#[cfg(feature = "deep")]
pub use deep::{DeepSignal, MAX_ARRAY_PADDING};
pub use derived::{Computed, Memo};
pub use effect::{Cleanup, DepsEffect, DomEffect, Effect, EffectReturn, EffectState, Tracking};
pub use error::{EffectError, panic_message};
pub use frame::{FrameHost, ManualFrameHost, Task};
pub use runtime::{EffectId, Runtime, RuntimeConfig, WeakRuntime};
pub use signal::{ReadSignal, Signal, WriteSignal, create_signal};
pub use store::Store;
pub use trigger::Trigger;
