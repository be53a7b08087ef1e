#![forbid(unsafe_code)]

//! The reactive runtime: observer tracking, effect storage, and scheduling.
//!
//! A [`Runtime`] is the explicit execution context every signal and effect
//! belongs to. It owns:
//!
//! - the **observer slot**: the effect currently executing, installed for
//!   exactly one body execution through [`ObserverGuard`] and restored on
//!   drop (including during unwinding);
//! - the **effect arena**: a slab of effect records addressed by [`EffectId`];
//! - the **pending set**: effects scheduled for the next flush, deduplicated
//!   and kept in first-scheduled order.
//!
//! # Scheduling
//!
//! [`Runtime::schedule`] never runs an effect. It records the effect as
//! pending and, outside a batch, asks the [`FrameHost`] for the next frame;
//! the frame callback queues a microtask that calls [`Runtime::flush`].
//! A runtime without a host ([`Runtime::server`]) suppresses scheduling
//! entirely: effects never execute server-side.
//!
//! # Invariants
//!
//! 1. At most one execution of a given effect body is in progress; a request
//!    to run a `Running` effect is deferred to the next flush.
//! 2. A flush runs the pending set as it was when the flush started.
//!    Effects scheduled during the flush run in the next pass.
//! 3. The previous cleanup runs immediately before each body execution and
//!    on disposal.
//! 4. A failing effect is logged and never stops the rest of its flush.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use slab::Slab;
use smallvec::SmallVec;
use tracing::{debug, error, trace, warn};
use web_time::Instant;

use crate::effect::{EffectBody, EffectRecord, EffectState, Tracking};
use crate::error::EffectError;
use crate::frame::FrameHost;
use crate::signal::SignalCore;

pub(crate) type FastIndexSet<T> = IndexSet<T, ahash::RandomState>;

pub(crate) fn fast_index_set<T>() -> FastIndexSet<T> {
    IndexSet::with_hasher(ahash::RandomState::new())
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Runtime tuning knobs.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Upper bound on passes performed by [`Runtime::flush_until_idle`].
    /// Effects that keep re-scheduling each other past this bound are left
    /// pending and a warning is logged.
    /// Default: 100
    pub max_flush_passes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_passes: 100,
        }
    }
}

impl RuntimeConfig {
    /// Set the pass limit for [`Runtime::flush_until_idle`].
    #[must_use]
    pub fn max_flush_passes(mut self, passes: usize) -> Self {
        self.max_flush_passes = passes.max(1);
        self
    }
}

// ---------------------------------------------------------------------------
// EffectId
// ---------------------------------------------------------------------------

/// Handle to an effect record in a runtime's arena.
///
/// The generation makes ids of disposed effects stale even when their slot
/// is reused.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct EffectId {
    slot: u32,
    generation: u32,
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

struct RuntimeInner {
    host: Option<Rc<dyn FrameHost>>,
    config: RuntimeConfig,
    effects: RefCell<Slab<Rc<EffectRecord>>>,
    next_generation: Cell<u32>,
    pending: RefCell<FastIndexSet<EffectId>>,
    observer: Cell<Option<EffectId>>,
    batch_depth: Cell<usize>,
    frame_requested: Cell<bool>,
    flushing: Cell<bool>,
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        let records: Vec<Rc<EffectRecord>> = self.effects.get_mut().drain().collect();
        for record in records {
            record.disposed.set(true);
            let Some(cleanup) = record.cleanup.borrow_mut().take() else {
                continue;
            };
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| cleanup.run())) {
                let err = EffectError::from_panic(payload.as_ref());
                error!(error = %err, "effect cleanup failed during runtime teardown");
            }
        }
    }
}

/// Shared handle to a reactive runtime.
///
/// Cloning is cheap; all clones address the same runtime. The runtime is
/// single-threaded (`!Send`).
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// Non-owning runtime handle.
///
/// Signals and long-lived closures hold this so that the runtime is released
/// with its last [`Runtime`] handle.
#[derive(Clone)]
pub struct WeakRuntime {
    inner: Weak<RuntimeInner>,
}

impl WeakRuntime {
    /// The runtime, unless it has been dropped.
    #[must_use]
    pub fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }
}

impl Runtime {
    /// Create a client runtime driven by `host`.
    #[must_use]
    pub fn new(host: Rc<dyn FrameHost>) -> Self {
        Self::with_config(host, RuntimeConfig::default())
    }

    /// Create a client runtime with explicit configuration.
    #[must_use]
    pub fn with_config(host: Rc<dyn FrameHost>, config: RuntimeConfig) -> Self {
        Self::build(Some(host), config)
    }

    /// Create a host-less (server) runtime.
    ///
    /// Signals still hold and update values, but nothing is tracked,
    /// scheduled, or executed.
    #[must_use]
    pub fn server() -> Self {
        Self::build(None, RuntimeConfig::default())
    }

    fn build(host: Option<Rc<dyn FrameHost>>, config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                host,
                config,
                effects: RefCell::new(Slab::new()),
                next_generation: Cell::new(0),
                pending: RefCell::new(fast_index_set()),
                observer: Cell::new(None),
                batch_depth: Cell::new(0),
                frame_requested: Cell::new(false),
                flushing: Cell::new(false),
            }),
        }
    }

    /// Whether a paint host is attached. `false` means a server context.
    #[must_use]
    pub fn has_host(&self) -> bool {
        self.inner.host.is_some()
    }

    /// Runtime configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Whether two handles address the same runtime.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Non-owning handle to this runtime.
    #[must_use]
    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// The effect currently installed as observer, if any.
    #[must_use]
    pub fn current_observer(&self) -> Option<EffectId> {
        self.inner.observer.get()
    }

    /// Number of effects waiting for the next flush.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Number of live effects in the arena.
    #[must_use]
    pub fn effect_count(&self) -> usize {
        self.inner.effects.borrow().len()
    }

    /// Whether a frame has been requested and not yet flushed.
    #[must_use]
    pub fn is_flush_requested(&self) -> bool {
        self.inner.frame_requested.get()
    }

    /// Whether a [`BatchScope`](crate::BatchScope) is open.
    #[must_use]
    pub fn in_batch(&self) -> bool {
        self.inner.batch_depth.get() > 0
    }

    /// Run `f` with no observer installed, so reads inside do not subscribe.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = ObserverGuard::new(self, None);
        f()
    }

    // -----------------------------------------------------------------------
    // Tracking
    // -----------------------------------------------------------------------

    fn record(&self, id: EffectId) -> Option<Rc<EffectRecord>> {
        self.inner
            .effects
            .borrow()
            .get(id.slot as usize)
            .filter(|record| record.generation == id.generation)
            .cloned()
    }

    pub(crate) fn effect_state(&self, id: EffectId) -> Option<EffectState> {
        self.record(id).map(|record| record.state.get())
    }

    /// Subscribe the current observer to `core`.
    pub(crate) fn track(&self, core: &Rc<SignalCore>) {
        let Some(id) = self.inner.observer.get() else {
            return;
        };
        let Some(record) = self.record(id) else {
            return;
        };
        if core.subscribers.borrow_mut().insert(id) {
            record.sources.borrow_mut().push(Rc::downgrade(core));
        }
    }

    /// Schedule every subscriber of `core`.
    pub(crate) fn notify(&self, core: &SignalCore) {
        if !self.has_host() {
            trace!("no host; signal write takes the value-only path");
            return;
        }
        let subscribers: SmallVec<[EffectId; 8]> =
            core.subscribers.borrow().iter().copied().collect();
        for id in subscribers {
            self.schedule(id);
        }
    }

    // -----------------------------------------------------------------------
    // Effect arena
    // -----------------------------------------------------------------------

    pub(crate) fn insert_effect(&self, body: EffectBody, tracking: Tracking) -> EffectId {
        let generation = self.inner.next_generation.get().wrapping_add(1);
        self.inner.next_generation.set(generation);
        let record = Rc::new(EffectRecord::new(body, tracking, generation));
        let slot = self.inner.effects.borrow_mut().insert(record);
        let id = EffectId {
            slot: u32::try_from(slot).unwrap_or(u32::MAX),
            generation,
        };
        trace!(effect = ?id, ?tracking, "effect created");
        id
    }

    /// Dispose an effect: drop it from tracking structures and run its cleanup.
    /// Dispose an effect by id: drop its subscriptions and run its cleanup.
    ///
    /// Unknown or already disposed ids are ignored.
    pub fn dispose_effect(&self, id: EffectId) {
        let record = {
            let mut effects = self.inner.effects.borrow_mut();
            match effects.get(id.slot as usize) {
                Some(record) if record.generation == id.generation => {
                    effects.remove(id.slot as usize)
                }
                _ => return,
            }
        };
        self.inner.pending.borrow_mut().shift_remove(&id);
        record.disposed.set(true);
        record.unsubscribe_all(id);
        self.run_cleanup(id, &record);
        debug!(effect = ?id, "effect disposed");
    }

    /// Run an effect now: cleanup, body under the observer guard, store the
    /// new cleanup.
    ///
    /// Returns `true` when the body executed (even if it failed).
    pub fn run(&self, id: EffectId) -> bool {
        let Some(record) = self.record(id) else {
            return false;
        };
        if record.state.get() == EffectState::Running {
            debug!(effect = ?id, "effect is already running; deferring re-run");
            match record.tracking {
                Tracking::Auto => self.schedule(id),
                Tracking::Explicit => record.rerun.set(true),
            }
            return false;
        }

        self.inner.pending.borrow_mut().shift_remove(&id);
        record.state.set(EffectState::Running);
        self.run_cleanup(id, &record);
        record.unsubscribe_all(id);

        let observer = match record.tracking {
            Tracking::Auto => Some(id),
            Tracking::Explicit => None,
        };
        let outcome = {
            let _guard = ObserverGuard::new(self, observer);
            panic::catch_unwind(AssertUnwindSafe(|| {
                let mut body = record.body.borrow_mut();
                (&mut **body)()
            }))
        };
        let outcome = outcome.unwrap_or_else(|payload| Err(EffectError::from_panic(payload.as_ref())));

        let next = if self.inner.pending.borrow().contains(&id) {
            EffectState::Scheduled
        } else {
            EffectState::Idle
        };
        record.state.set(next);

        match outcome {
            Ok(cleanup) => {
                *record.cleanup.borrow_mut() = cleanup;
                if record.disposed.get() {
                    // Disposed from inside its own body.
                    self.run_cleanup(id, &record);
                }
            }
            Err(err) => {
                error!(effect = ?id, error = %err, "effect execution failed");
            }
        }
        if record.rerun.replace(false) && !record.disposed.get() {
            trace!(effect = ?id, "running deferred explicit re-run");
            self.run(id);
        }
        true
    }

    fn run_cleanup(&self, id: EffectId, record: &EffectRecord) {
        let cleanup = record.cleanup.borrow_mut().take();
        let Some(cleanup) = cleanup else {
            return;
        };
        let _guard = ObserverGuard::new(self, None);
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| cleanup.run())) {
            let err = EffectError::from_panic(payload.as_ref());
            error!(effect = ?id, error = %err, "effect cleanup failed");
        }
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Mark an effect pending and arrange for a flush at the next frame.
    ///
    /// No-op in a host-less runtime or for disposed effects.
    pub fn schedule(&self, id: EffectId) {
        if !self.has_host() {
            return;
        }
        let Some(record) = self.record(id) else {
            return;
        };
        if record.tracking == Tracking::Explicit {
            // Explicit effects only run through their dependency gate.
            return;
        }
        let inserted = self.inner.pending.borrow_mut().insert(id);
        if record.state.get() == EffectState::Idle {
            record.state.set(EffectState::Scheduled);
        }
        if inserted {
            trace!(effect = ?id, "effect scheduled");
        }
        if self.inner.batch_depth.get() == 0 {
            self.request_frame();
        }
    }

    pub(crate) fn host(&self) -> Option<Rc<dyn FrameHost>> {
        self.inner.host.clone()
    }

    fn request_frame(&self) {
        let Some(host) = self.inner.host.clone() else {
            return;
        };
        if self.inner.frame_requested.replace(true) {
            return;
        }
        let weak = self.downgrade();
        host.request_frame(Box::new(move || {
            let Some(rt) = weak.upgrade() else {
                return;
            };
            let Some(host) = rt.inner.host.clone() else {
                return;
            };
            let weak = rt.downgrade();
            host.queue_microtask(Box::new(move || {
                if let Some(rt) = weak.upgrade() {
                    rt.flush();
                }
            }));
        }));
    }

    /// Run every effect pending at the start of the call exactly once, in
    /// first-scheduled order.
    ///
    /// Effects scheduled while the flush runs are left for the next pass (a
    /// new frame is requested for them). Failures are logged per effect.
    /// Returns the number of effect bodies executed.
    pub fn flush(&self) -> usize {
        if !self.has_host() {
            return 0;
        }
        if self.inner.flushing.get() {
            debug!("flush requested during a flush; deferring to the next pass");
            self.request_frame();
            return 0;
        }
        self.inner.frame_requested.set(false);
        let snapshot: Vec<EffectId> = self.inner.pending.borrow_mut().drain(..).collect();
        if snapshot.is_empty() {
            return 0;
        }

        let _span = tracing::debug_span!("fdom.flush", pending = snapshot.len()).entered();
        let started = Instant::now();
        let _flushing = FlushGuard::new(self);
        let mut ran = 0;
        for id in snapshot {
            if self.run(id) {
                ran += 1;
            }
        }
        debug!(
            ran,
            elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
            "flush complete"
        );
        ran
    }

    /// Flush repeatedly until nothing is pending or the configured pass
    /// limit is reached. Returns the total number of bodies executed.
    pub fn flush_until_idle(&self) -> usize {
        let mut total = 0;
        for _ in 0..self.inner.config.max_flush_passes {
            if self.pending_count() == 0 {
                return total;
            }
            total += self.flush();
        }
        if self.pending_count() > 0 {
            warn!(
                pending = self.pending_count(),
                passes = self.inner.config.max_flush_passes,
                "effects still pending after the flush pass limit"
            );
        }
        total
    }

    // -----------------------------------------------------------------------
    // Batching
    // -----------------------------------------------------------------------

    /// Run `f` with flushing deferred until it returns.
    ///
    /// Writes inside `f` schedule as usual; the outermost batch flushes once
    /// on exit, so N writes cause at most one run per affected subscriber.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _scope = crate::BatchScope::new(self);
        f()
    }

    pub(crate) fn begin_batch(&self) {
        self.inner.batch_depth.set(self.inner.batch_depth.get() + 1);
    }

    pub(crate) fn end_batch(&self) {
        let depth = self.inner.batch_depth.get().saturating_sub(1);
        self.inner.batch_depth.set(depth);
        if depth > 0 || !self.has_host() || self.pending_count() == 0 {
            return;
        }
        if self.inner.flushing.get() || std::thread::panicking() {
            self.request_frame();
        } else {
            self.flush();
        }
    }
}

impl PartialEq for Runtime {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Runtime {}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("has_host", &self.has_host())
            .field("effects", &self.effect_count())
            .field("pending", &self.pending_count())
            .field("batch_depth", &self.inner.batch_depth.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Installs an observer for the guard's lifetime and restores the previous
/// one on drop, including during unwinding.
pub(crate) struct ObserverGuard<'a> {
    runtime: &'a Runtime,
    previous: Option<EffectId>,
}

impl<'a> ObserverGuard<'a> {
    pub(crate) fn new(runtime: &'a Runtime, observer: Option<EffectId>) -> Self {
        let previous = runtime.inner.observer.replace(observer);
        Self { runtime, previous }
    }
}

impl Drop for ObserverGuard<'_> {
    fn drop(&mut self) {
        self.runtime.inner.observer.set(self.previous);
    }
}

struct FlushGuard<'a> {
    runtime: &'a Runtime,
}

impl<'a> FlushGuard<'a> {
    fn new(runtime: &'a Runtime) -> Self {
        runtime.inner.flushing.set(true);
        Self { runtime }
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.runtime.inner.flushing.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ManualFrameHost;

    fn client() -> (Runtime, Rc<ManualFrameHost>) {
        let host = ManualFrameHost::new();
        (Runtime::new(host.clone()), host)
    }

    #[test]
    fn observer_guard_restores_previous_on_panic() {
        let (rt, _host) = client();
        let outer = rt.insert_effect(Box::new(|| Ok(None)), Tracking::Auto);
        let inner = rt.insert_effect(Box::new(|| Ok(None)), Tracking::Auto);

        let _outer_guard = ObserverGuard::new(&rt, Some(outer));
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _guard = ObserverGuard::new(&rt, Some(inner));
            assert_eq!(rt.current_observer(), Some(inner));
            panic!("boom");
        }));

        assert!(result.is_err());
        assert_eq!(rt.current_observer(), Some(outer));
    }

    #[test]
    fn untracked_clears_observer() {
        let (rt, _host) = client();
        let id = rt.insert_effect(Box::new(|| Ok(None)), Tracking::Auto);
        let _guard = ObserverGuard::new(&rt, Some(id));
        rt.untracked(|| assert_eq!(rt.current_observer(), None));
        assert_eq!(rt.current_observer(), Some(id));
    }

    #[test]
    fn stale_ids_are_ignored_after_slot_reuse() {
        let (rt, _host) = client();
        let first = rt.insert_effect(Box::new(|| Ok(None)), Tracking::Auto);
        rt.dispose_effect(first);
        let second = rt.insert_effect(Box::new(|| Ok(None)), Tracking::Auto);

        assert_ne!(first, second);
        assert!(rt.effect_state(first).is_none());
        assert!(!rt.run(first));
        assert_eq!(rt.effect_state(second), Some(EffectState::Idle));
    }

    #[test]
    fn schedule_requests_a_single_frame() {
        let (rt, host) = client();
        let a = rt.insert_effect(Box::new(|| Ok(None)), Tracking::Auto);
        let b = rt.insert_effect(Box::new(|| Ok(None)), Tracking::Auto);

        rt.schedule(a);
        rt.schedule(b);
        rt.schedule(a);

        assert_eq!(rt.pending_count(), 2);
        assert_eq!(host.pending_frames(), 1);
        assert!(rt.is_flush_requested());
        assert_eq!(rt.effect_state(a), Some(EffectState::Scheduled));
    }

    #[test]
    fn server_runtime_never_schedules() {
        let rt = Runtime::server();
        let id = rt.insert_effect(Box::new(|| Ok(None)), Tracking::Auto);
        rt.schedule(id);
        assert_eq!(rt.pending_count(), 0);
        assert_eq!(rt.flush(), 0);
        assert!(!rt.has_host());
    }

    #[test]
    fn config_builder_clamps_passes() {
        let config = RuntimeConfig::default().max_flush_passes(0);
        assert_eq!(config.max_flush_passes, 1);
        assert_eq!(RuntimeConfig::default().max_flush_passes, 100);
    }

    #[test]
    fn debug_format_reports_counts() {
        let (rt, _host) = client();
        let _ = rt.insert_effect(Box::new(|| Ok(None)), Tracking::Auto);
        let debug = format!("{rt:?}");
        assert!(debug.contains("effects: 1"));
        assert!(debug.contains("has_host: true"));
    }
}
