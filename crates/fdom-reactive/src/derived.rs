#![forbid(unsafe_code)]

//! Derived values: signals recomputed by an effect.
//!
//! - [`Computed<T>`] re-evaluates whenever a signal read inside its function
//!   changes (automatic tracking).
//! - [`Memo<T, D>`] re-evaluates only when its explicit dependency value
//!   changes (the [`DepsEffect`] gate).
//!
//! Both expose only a getter. Reading one inside an effect subscribes that
//! effect to the derived value, not to the underlying sources, so a
//! recomputation that produces an equal value notifies nobody.

use std::fmt;

use crate::effect::{DepsEffect, Effect};
use crate::runtime::Runtime;
use crate::signal::Signal;

/// A value derived from other signals, recomputed on change.
pub struct Computed<T> {
    value: Signal<T>,
    _effect: Effect,
}

impl<T: Clone + 'static> Computed<T> {
    /// Current value; subscribes the running effect.
    #[must_use]
    pub fn get(&self) -> T {
        self.value.get()
    }

    /// Current value without subscribing.
    #[must_use]
    pub fn get_untracked(&self) -> T {
        self.value.get_untracked()
    }

    /// Borrow the current value; subscribes the running effect.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.value.with(f)
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed").field("value", &self.value).finish()
    }
}

/// A value recomputed only when its explicit dependencies change.
pub struct Memo<T, D> {
    value: Signal<T>,
    gate: DepsEffect<D>,
}

impl<T: Clone + 'static, D: PartialEq> Memo<T, D> {
    /// Current value; subscribes the running effect.
    #[must_use]
    pub fn get(&self) -> T {
        self.value.get()
    }

    /// Current value without subscribing.
    #[must_use]
    pub fn get_untracked(&self) -> T {
        self.value.get_untracked()
    }

    /// Feed the current dependency value; recomputes if it changed.
    ///
    /// Returns `true` when the function ran.
    pub fn update_deps(&self, deps: D) -> bool {
        self.gate.update(deps)
    }
}

impl<T: fmt::Debug, D: fmt::Debug> fmt::Debug for Memo<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("value", &self.value)
            .field("gate", &self.gate)
            .finish()
    }
}

impl Runtime {
    /// Derive a value from `f`, recomputed whenever a signal it reads
    /// changes.
    ///
    /// The value is seeded with an untracked call to `f`; in a host-less
    /// runtime it is never recomputed.
    pub fn computed<T: Clone + PartialEq + 'static>(
        &self,
        f: impl Fn() -> T + 'static,
    ) -> Computed<T> {
        let value = self.signal(self.untracked(&f));
        let target = value.clone();
        let effect = self.create_effect(move || target.set(f()));
        Computed {
            value,
            _effect: effect,
        }
    }

    /// Derive a value from `f`, recomputed only when `deps` changes through
    /// [`Memo::update_deps`].
    pub fn memo<T: Clone + PartialEq + 'static, D: PartialEq>(
        &self,
        f: impl Fn() -> T + 'static,
        deps: D,
    ) -> Memo<T, D> {
        let value = self.signal(self.untracked(&f));
        let target = value.clone();
        let gate = self.deps_effect(move || target.set(f()));
        gate.update(deps);
        Memo { value, gate }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::frame::ManualFrameHost;

    fn client() -> (Runtime, Rc<ManualFrameHost>) {
        let host = ManualFrameHost::new();
        (Runtime::new(host.clone()), host)
    }

    #[test]
    fn computed_follows_sources() {
        let (rt, host) = client();
        let width = rt.signal(10);
        let height = rt.signal(20);

        let (w, h) = (width.clone(), height.clone());
        let area = rt.computed(move || w.get() * h.get());
        assert_eq!(area.get(), 200);

        width.set(5);
        host.advance_frame();
        assert_eq!(area.get(), 100);
    }

    #[test]
    fn computed_notifies_downstream_only_on_change() {
        let (rt, host) = client();
        let n = rt.signal(2);
        let s = n.clone();
        let parity = rt.computed(move || s.get() % 2);

        let runs = Rc::new(Cell::new(0));
        let r = Rc::clone(&runs);
        let p = parity.get_untracked();
        assert_eq!(p, 0);
        let parity = Rc::new(parity);
        let pc = Rc::clone(&parity);
        let _effect = rt.create_effect(move || {
            let _ = pc.get();
            r.set(r.get() + 1);
        });

        n.set(4);
        host.advance_frame();
        host.advance_frame();
        assert_eq!(runs.get(), 1, "parity unchanged");

        n.set(5);
        host.advance_frame();
        host.advance_frame();
        assert_eq!(runs.get(), 2);
        assert_eq!(parity.get_untracked(), 1);
    }

    #[test]
    fn memo_recomputes_only_when_deps_change() {
        let (rt, _host) = client();
        let evaluations = Rc::new(Cell::new(0));
        let input = rt.signal(3);

        let (e, i) = (Rc::clone(&evaluations), input.clone());
        let doubled = rt.memo(
            move || {
                e.set(e.get() + 1);
                i.get_untracked() * 2
            },
            [input.get_untracked()],
        );
        let seeded = evaluations.get();
        assert_eq!(doubled.get(), 6);

        assert!(!doubled.update_deps([3]));
        assert_eq!(evaluations.get(), seeded);

        input.set(4);
        assert_eq!(doubled.get(), 6, "memo ignores tracked reads");
        assert!(doubled.update_deps([4]));
        assert_eq!(doubled.get(), 8);
        assert_eq!(evaluations.get(), seeded + 1);
    }

    #[test]
    fn server_computed_is_seeded_once() {
        let rt = Runtime::server();
        let source = rt.signal(1);
        let s = source.clone();
        let plus_one = rt.computed(move || s.get() + 1);
        assert_eq!(plus_one.get(), 2);

        source.set(10);
        assert_eq!(plus_one.get(), 2);
    }
}
