#![forbid(unsafe_code)]

//! Replace-on-write reactive value cells.
//!
//! A [`Signal<T>`] owns a value and a subscriber set. Reading through
//! [`get`](Signal::get) or [`with`](Signal::with) while an effect runs
//! subscribes that effect; writing a value that differs from the current one
//! schedules every subscriber. Writes never run effects synchronously.
//!
//! # Invariants
//!
//! 1. `get()` always returns the most recently set value.
//! 2. Setting a value equal to the current one is a no-op: no
//!    notifications, no scheduling.
//! 3. Clones share one cell; the cell is released with the last handle.
//! 4. In a host-less runtime, writes update the value and stop there.
//!
//! # Failure Modes
//!
//! - Writing while a [`with`](Signal::with) borrow of the same signal is
//!   alive panics (`RefCell` double borrow).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::runtime::{EffectId, FastIndexSet, Runtime, WeakRuntime, fast_index_set};

/// Subscriber bookkeeping shared by every trackable source.
pub(crate) struct SignalCore {
    pub(crate) subscribers: RefCell<FastIndexSet<EffectId>>,
}

impl SignalCore {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            subscribers: RefCell::new(fast_index_set()),
        })
    }
}

/// Track and notify helpers shared by [`Signal`] and the deep signal nodes.
#[derive(Clone)]
pub(crate) struct Source {
    runtime: WeakRuntime,
    core: Rc<SignalCore>,
}

impl Source {
    pub(crate) fn new(runtime: &Runtime) -> Self {
        Self::from_weak(runtime.downgrade())
    }

    pub(crate) fn from_weak(runtime: WeakRuntime) -> Self {
        Self {
            runtime,
            core: SignalCore::new(),
        }
    }

    pub(crate) fn track(&self) {
        if let Some(rt) = self.runtime.upgrade() {
            rt.track(&self.core);
        }
    }

    pub(crate) fn notify(&self) {
        if let Some(rt) = self.runtime.upgrade() {
            rt.notify(&self.core);
        }
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.core.subscribers.borrow().len()
    }

    /// No other handle shares this source and nothing is subscribed.
    pub(crate) fn is_orphan(&self) -> bool {
        Rc::strong_count(&self.core) == 1 && self.core.subscribers.borrow().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Signal<T>
// ---------------------------------------------------------------------------

/// A reactive value cell with change notification.
pub struct Signal<T> {
    source: Source,
    value: Rc<RefCell<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            value: Rc::clone(&self.value),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("value", &*self.value.borrow())
            .field("subscribers", &self.source.subscriber_count())
            .finish()
    }
}

impl<T: 'static> Signal<T> {
    /// Create a signal owned by `runtime`.
    pub fn new(runtime: &Runtime, initial: T) -> Self {
        Self {
            source: Source::new(runtime),
            value: Rc::new(RefCell::new(initial)),
        }
    }

    /// Current value; subscribes the running effect.
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.source.track();
        self.value.borrow().clone()
    }

    /// Current value without subscribing.
    #[must_use]
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.value.borrow().clone()
    }

    /// Borrow the current value; subscribes the running effect.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.source.track();
        f(&self.value.borrow())
    }

    /// Store `value` and schedule subscribers, unless it equals the current value.
    pub fn set(&self, value: T)
    where
        T: PartialEq,
    {
        {
            let mut slot = self.value.borrow_mut();
            if *slot == value {
                return;
            }
            *slot = value;
        }
        self.source.notify();
    }

    /// `set(f(&current))`.
    pub fn update(&self, f: impl FnOnce(&T) -> T)
    where
        T: PartialEq,
    {
        let next = f(&self.value.borrow());
        self.set(next);
    }

    /// Mutate the value in place. Always notifies, since the change cannot
    /// be compared cheaply.
    pub fn update_in_place(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.value.borrow_mut());
        self.source.notify();
    }

    /// Number of effects currently subscribed.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.source.subscriber_count()
    }

    /// Whether both handles address the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.value, &other.value)
    }

    /// Read-only view of this signal.
    #[must_use]
    pub fn read_only(&self) -> ReadSignal<T> {
        ReadSignal(self.clone())
    }

    /// Write-only view of this signal.
    #[must_use]
    pub fn write_only(&self) -> WriteSignal<T> {
        WriteSignal(self.clone())
    }
}

/// The getter half of [`create_signal`].
pub struct ReadSignal<T>(Signal<T>);

impl<T> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadSignal").field(&self.0).finish()
    }
}

impl<T: 'static> ReadSignal<T> {
    /// Current value; subscribes the running effect.
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.0.get()
    }

    /// Current value without subscribing.
    #[must_use]
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.0.get_untracked()
    }

    /// Borrow the current value; subscribes the running effect.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.0.with(f)
    }
}

/// The setter half of [`create_signal`].
pub struct WriteSignal<T>(Signal<T>);

impl<T> Clone for WriteSignal<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> fmt::Debug for WriteSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteSignal").finish_non_exhaustive()
    }
}

impl<T: PartialEq + 'static> WriteSignal<T> {
    /// See [`Signal::set`].
    pub fn set(&self, value: T) {
        self.0.set(value);
    }

    /// See [`Signal::update`].
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.0.update(f);
    }

    /// See [`Signal::update_in_place`].
    pub fn update_in_place(&self, f: impl FnOnce(&mut T)) {
        self.0.update_in_place(f);
    }
}

/// Create a signal and split it into getter and setter handles.
pub fn create_signal<T: 'static>(runtime: &Runtime, initial: T) -> (ReadSignal<T>, WriteSignal<T>) {
    let signal = Signal::new(runtime, initial);
    (signal.read_only(), signal.write_only())
}

impl Runtime {
    /// Create a signal owned by this runtime.
    pub fn signal<T: 'static>(&self, initial: T) -> Signal<T> {
        Signal::new(self, initial)
    }
}
