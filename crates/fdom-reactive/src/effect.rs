#![forbid(unsafe_code)]

//! Effects: side-effectful computations re-run when their dependencies change.
//!
//! Two dependency models share one effect record:
//!
//! - **Automatic tracking** ([`Runtime::create_effect`]): the effect
//!   subscribes to every signal read during its last run. This is the
//!   canonical model.
//! - **Explicit dependencies** ([`DepsEffect`]): a gate over an untracked
//!   effect record. [`DepsEffect::update`] compares the new dependency value
//!   with the previous one and runs the body synchronously only when they
//!   differ. A call made from inside the running body stores the new deps
//!   and re-runs once the body returns.
//!
//! [`Runtime::dom_effect`] defers creating an automatic effect to the next
//! frame, once the document is ready.
//!
//! An effect body may return `()`, a [`Cleanup`], `Option<Cleanup>`, or a
//! `Result` of any of those (see [`EffectReturn`]). The cleanup runs right
//! before the next execution and on disposal.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──schedule──▶ Scheduled ──flush──▶ Running ──▶ Idle
//!   ▲                                         │
//!   └──────────── (rescheduled while running) ┘ → Scheduled
//! ```
//!
//! Dropping an [`Effect`] disposes it; [`Effect::detach`] hands ownership to
//! the runtime instead.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::error::EffectError;
use crate::runtime::{EffectId, Runtime};
use crate::signal::SignalCore;

/// Execution state of an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectState {
    /// Not pending and not executing.
    Idle,
    /// Waiting in the pending set for the next flush.
    Scheduled,
    /// Body currently executing.
    Running,
}

/// Dependency model of an effect record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracking {
    /// Subscribes to signals read during each run.
    Auto,
    /// Runs only through a dependency gate; reads never subscribe.
    Explicit,
}

// ---------------------------------------------------------------------------
// Cleanup / EffectReturn
// ---------------------------------------------------------------------------

/// Teardown returned by an effect body.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    /// Wrap a teardown closure.
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }

    pub(crate) fn run(self) {
        (self.0)();
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup(..)")
    }
}

/// Values an effect body may return.
pub trait EffectReturn {
    /// Convert into the stored cleanup, or the failure to log.
    fn into_cleanup(self) -> Result<Option<Cleanup>, EffectError>;
}

impl EffectReturn for () {
    fn into_cleanup(self) -> Result<Option<Cleanup>, EffectError> {
        Ok(None)
    }
}

impl EffectReturn for Cleanup {
    fn into_cleanup(self) -> Result<Option<Cleanup>, EffectError> {
        Ok(Some(self))
    }
}

impl EffectReturn for Option<Cleanup> {
    fn into_cleanup(self) -> Result<Option<Cleanup>, EffectError> {
        Ok(self)
    }
}

impl<R: EffectReturn, E: fmt::Display> EffectReturn for Result<R, E> {
    fn into_cleanup(self) -> Result<Option<Cleanup>, EffectError> {
        match self {
            Ok(value) => value.into_cleanup(),
            Err(err) => Err(EffectError::Failed {
                message: err.to_string(),
            }),
        }
    }
}

pub(crate) type EffectBody = Box<dyn FnMut() -> Result<Option<Cleanup>, EffectError>>;

fn box_body<R: EffectReturn>(mut body: impl FnMut() -> R + 'static) -> EffectBody {
    Box::new(move || body().into_cleanup())
}

// ---------------------------------------------------------------------------
// EffectRecord
// ---------------------------------------------------------------------------

pub(crate) struct EffectRecord {
    pub(crate) body: RefCell<EffectBody>,
    pub(crate) cleanup: RefCell<Option<Cleanup>>,
    pub(crate) sources: RefCell<Vec<Weak<SignalCore>>>,
    pub(crate) state: Cell<EffectState>,
    pub(crate) tracking: Tracking,
    pub(crate) generation: u32,
    pub(crate) disposed: Cell<bool>,
    /// An explicit run was requested while the body was running.
    pub(crate) rerun: Cell<bool>,
}

impl EffectRecord {
    pub(crate) fn new(body: EffectBody, tracking: Tracking, generation: u32) -> Self {
        Self {
            body: RefCell::new(body),
            cleanup: RefCell::new(None),
            sources: RefCell::new(Vec::new()),
            state: Cell::new(EffectState::Idle),
            tracking,
            generation,
            disposed: Cell::new(false),
            rerun: Cell::new(false),
        }
    }

    /// Drop every subscription taken during the previous run.
    pub(crate) fn unsubscribe_all(&self, id: EffectId) {
        let sources: Vec<Weak<SignalCore>> = self.sources.borrow_mut().drain(..).collect();
        for source in sources {
            if let Some(core) = source.upgrade() {
                core.subscribers.borrow_mut().shift_remove(&id);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Effect
// ---------------------------------------------------------------------------

/// Owning handle to an effect. Dropping it disposes the effect.
#[must_use = "dropping an Effect disposes it; call `detach()` to keep it running"]
pub struct Effect {
    runtime: Runtime,
    id: Option<EffectId>,
}

impl Effect {
    fn inert(runtime: &Runtime) -> Self {
        Self {
            runtime: runtime.clone(),
            id: None,
        }
    }

    /// Arena id, or `None` for an inert effect (host-less runtime).
    #[must_use]
    pub fn id(&self) -> Option<EffectId> {
        self.id
    }

    /// Current lifecycle state, `None` once disposed or when inert.
    #[must_use]
    pub fn state(&self) -> Option<EffectState> {
        self.id.and_then(|id| self.runtime.effect_state(id))
    }

    /// Whether the effect is live in its runtime.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state().is_some()
    }

    /// Run the effect now, bypassing the scheduler.
    pub fn run(&self) -> bool {
        self.id.is_some_and(|id| self.runtime.run(id))
    }

    /// Schedule the effect for the next flush.
    pub fn schedule(&self) {
        if let Some(id) = self.id {
            self.runtime.schedule(id);
        }
    }

    /// Dispose now: run the cleanup and drop all subscriptions.
    pub fn dispose(mut self) {
        if let Some(id) = self.id.take() {
            self.runtime.dispose_effect(id);
        }
    }

    /// Give up the handle; the effect lives as long as its runtime.
    pub fn detach(mut self) {
        self.id = None;
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.runtime.dispose_effect(id);
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// DepsEffect
// ---------------------------------------------------------------------------

/// An effect gated by an explicit dependency value.
///
/// Dependencies compare with `PartialEq`: for tuples, arrays, slices and
/// `Vec`s that is a shallow slot-by-slot comparison of equal-length lists.
pub struct DepsEffect<D> {
    effect: Effect,
    deps: RefCell<Option<D>>,
}

impl<D: PartialEq> DepsEffect<D> {
    /// Run the body synchronously if `deps` differs from the previous value.
    ///
    /// Returns `true` when the body ran. Always `false` in a host-less
    /// runtime. Called from inside its own body, the new deps are stored and
    /// the body runs again once the current run returns.
    pub fn update(&self, deps: D) -> bool {
        let Some(id) = self.effect.id else {
            return false;
        };
        {
            let mut stored = self.deps.borrow_mut();
            if stored.as_ref() == Some(&deps) {
                trace!(effect = ?id, "dependencies unchanged; skipping run");
                return false;
            }
            *stored = Some(deps);
        }
        self.effect.runtime.run(id)
    }

    /// Underlying effect handle.
    #[must_use]
    pub fn effect(&self) -> &Effect {
        &self.effect
    }
}

impl<D: fmt::Debug> fmt::Debug for DepsEffect<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepsEffect")
            .field("effect", &self.effect)
            .field("deps", &*self.deps.borrow())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Runtime entry points
// ---------------------------------------------------------------------------

impl Runtime {
    /// Create an auto-tracked effect and run it immediately.
    ///
    /// In a host-less runtime the body never runs and an inert handle is
    /// returned.
    pub fn create_effect<R: EffectReturn>(&self, body: impl FnMut() -> R + 'static) -> Effect {
        if !self.has_host() {
            debug!("no host; effect suppressed");
            return Effect::inert(self);
        }
        let id = self.insert_effect(box_body(body), Tracking::Auto);
        self.run(id);
        Effect {
            runtime: self.clone(),
            id: Some(id),
        }
    }

    /// Create an explicit-dependency effect. Nothing runs until the first
    /// [`DepsEffect::update`].
    pub fn deps_effect<D: PartialEq, R: EffectReturn>(
        &self,
        body: impl FnMut() -> R + 'static,
    ) -> DepsEffect<D> {
        let effect = if self.has_host() {
            let id = self.insert_effect(box_body(body), Tracking::Explicit);
            Effect {
                runtime: self.clone(),
                id: Some(id),
            }
        } else {
            Effect::inert(self)
        };
        DepsEffect {
            effect,
            deps: RefCell::new(None),
        }
    }

    /// Run `body` once on the client, untracked. Its cleanup runs when the
    /// returned effect is disposed.
    pub fn effect_once<R: EffectReturn>(&self, body: impl FnOnce() -> R + 'static) -> Effect {
        let mut body = Some(body);
        let runtime = self.downgrade();
        self.create_effect(move || -> Result<Option<Cleanup>, EffectError> {
            let Some(body) = body.take() else {
                return Ok(None);
            };
            match runtime.upgrade() {
                Some(rt) => rt.untracked(body).into_cleanup(),
                None => body().into_cleanup(),
            }
        })
    }

    /// Run `f` only when a host is attached.
    pub fn client_only<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        self.has_host().then(f)
    }

    /// Create an auto-tracked effect once the document is ready, that is at
    /// the host's next frame.
    ///
    /// In a host-less runtime nothing is scheduled and the handle stays
    /// waiting forever. Dropping the handle before the frame cancels the
    /// effect.
    pub fn dom_effect<R: EffectReturn>(&self, body: impl FnMut() -> R + 'static) -> DomEffect {
        let slot = Rc::new(DomSlot::default());
        let Some(host) = self.host() else {
            debug!("no host; DOM effect never runs");
            return DomEffect { slot };
        };
        let pending = Rc::clone(&slot);
        let runtime = self.downgrade();
        host.request_frame(Box::new(move || {
            if pending.cancelled.get() {
                trace!("DOM effect dropped before the document was ready");
                return;
            }
            let Some(rt) = runtime.upgrade() else {
                return;
            };
            let effect = rt.create_effect(body);
            if pending.detached.get() {
                effect.detach();
            } else {
                *pending.effect.borrow_mut() = Some(effect);
            }
        }));
        DomEffect { slot }
    }
}

// ---------------------------------------------------------------------------
// DomEffect
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DomSlot {
    effect: RefCell<Option<Effect>>,
    cancelled: Cell<bool>,
    detached: Cell<bool>,
}

/// Handle to an effect created at the next frame by
/// [`Runtime::dom_effect`].
///
/// Dropping it cancels the effect if it has not started yet and disposes it
/// otherwise.
#[must_use = "dropping a DomEffect cancels or disposes it"]
pub struct DomEffect {
    slot: Rc<DomSlot>,
}

impl DomEffect {
    /// Whether the frame has arrived and the effect exists.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.slot.effect.borrow().is_some()
    }

    /// Lifecycle state of the effect, `None` while waiting or once disposed.
    #[must_use]
    pub fn state(&self) -> Option<EffectState> {
        self.slot.effect.borrow().as_ref().and_then(Effect::state)
    }

    /// Cancel or dispose now.
    pub fn dispose(self) {}

    /// Give up the handle; the effect still starts at the next frame and
    /// lives as long as its runtime.
    pub fn detach(self) {
        self.slot.detached.set(true);
        let effect = self.slot.effect.borrow_mut().take();
        if let Some(effect) = effect {
            effect.detach();
        }
    }
}

impl Drop for DomEffect {
    fn drop(&mut self) {
        if self.slot.detached.get() {
            return;
        }
        self.slot.cancelled.set(true);
        let effect = self.slot.effect.borrow_mut().take();
        drop(effect);
    }
}

impl fmt::Debug for DomEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomEffect")
            .field("ready", &self.is_ready())
            .field("state", &self.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
