#![forbid(unsafe_code)]

//! Component scopes: the ownership tree behind per-component render
//! effects.
//!
//! Every component mounted by a scoped [`Reconciler`](crate::Reconciler)
//! gets a [`Scope`] and an effect of its own. The scope records the live
//! nodes the component occupies (its footprint) so a re-run can patch that
//! run of siblings in place, and the child scopes created during its last
//! run so they can be disposed before the next one.
//!
//! A footprint is a list of segments. A nested component appears as a
//! [`Segment::Scope`], so a child re-run that grows or shrinks its output
//! is seen by its owner without the owner re-running.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use fdom_reactive::{Cleanup, EffectId, WeakRuntime};
use tracing::trace;

/// One position in a footprint.
pub(crate) enum Segment<N> {
    Node(N),
    Scope(Rc<Scope<N>>),
}

/// Where a scope's first run lands: the live nodes it may adopt, and the
/// node to insert before once they run out.
pub(crate) struct Placement<N> {
    pub(crate) parent: N,
    pub(crate) available: Vec<N>,
    pub(crate) anchor: Option<N>,
}

pub(crate) struct Scope<N> {
    name: String,
    effect: Cell<Option<EffectId>>,
    placement: RefCell<Option<Placement<N>>>,
    consumed: Cell<usize>,
    footprint: RefCell<Vec<Segment<N>>>,
    children: RefCell<Vec<Rc<Scope<N>>>>,
}

impl<N: Clone> Scope<N> {
    /// Scope of a mount root. It owns scopes but has no footprint.
    pub(crate) fn root() -> Rc<Self> {
        Self::new("<root>", None)
    }

    pub(crate) fn new(name: &str, placement: Option<Placement<N>>) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_owned(),
            effect: Cell::new(None),
            placement: RefCell::new(placement),
            consumed: Cell::new(0),
            footprint: RefCell::new(Vec::new()),
            children: RefCell::new(Vec::new()),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_effect(&self, id: Option<EffectId>) {
        self.effect.set(id);
    }

    /// The placement of the first run; `None` on later runs.
    pub(crate) fn take_placement(&self) -> Option<Placement<N>> {
        self.placement.borrow_mut().take()
    }

    /// Live nodes adopted from the owner's run during the first run.
    pub(crate) fn consumed(&self) -> usize {
        self.consumed.get()
    }

    pub(crate) fn set_consumed(&self, consumed: usize) {
        self.consumed.set(consumed);
    }

    pub(crate) fn set_footprint(&self, footprint: Vec<Segment<N>>) {
        *self.footprint.borrow_mut() = footprint;
    }

    /// Live nodes currently occupied, nested scopes included, in order.
    pub(crate) fn nodes(&self) -> Vec<N> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect(&self, out: &mut Vec<N>) {
        for segment in self.footprint.borrow().iter() {
            match segment {
                Segment::Node(node) => out.push(node.clone()),
                Segment::Scope(scope) => scope.collect(out),
            }
        }
    }

    pub(crate) fn adopt(&self, child: Rc<Self>) {
        self.children.borrow_mut().push(child);
    }
}

impl<N: 'static> Scope<N> {
    /// Cleanup disposing every child scope's effect. Each disposal runs that
    /// child's own cleanup, so the whole subtree goes.
    pub(crate) fn release(self: &Rc<Self>, runtime: WeakRuntime) -> Cleanup {
        let scope = Rc::clone(self);
        Cleanup::new(move || {
            let children = std::mem::take(&mut *scope.children.borrow_mut());
            let Some(rt) = runtime.upgrade() else {
                return;
            };
            if !children.is_empty() {
                trace!(scope = %scope.name, children = children.len(), "disposing child scopes");
            }
            for child in children {
                if let Some(id) = child.effect.take() {
                    rt.dispose_effect(id);
                }
            }
        })
    }
}

impl<N> fmt::Debug for Scope<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name)
            .field("effect", &self.effect.get())
            .field("segments", &self.footprint.borrow().len())
            .field("children", &self.children.borrow().len())
            .finish()
    }
}

/// Installs a scope as the current owner; pops it on drop.
pub(crate) struct OwnerGuard<'a, N> {
    owners: &'a RefCell<Vec<Rc<Scope<N>>>>,
}

impl<'a, N> OwnerGuard<'a, N> {
    pub(crate) fn new(owners: &'a RefCell<Vec<Rc<Scope<N>>>>, scope: Rc<Scope<N>>) -> Self {
        owners.borrow_mut().push(scope);
        Self { owners }
    }
}

impl<N> Drop for OwnerGuard<'_, N> {
    fn drop(&mut self) {
        self.owners.borrow_mut().pop();
    }
}
