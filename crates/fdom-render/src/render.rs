#![forbid(unsafe_code)]

//! Render entry points: mount and hydrate.
//!
//! Both wire one render effect per mount root. The effect calls the view
//! function (tracking the signals it reads) and patches the container's
//! children against the result. Each component in the tree gets a render
//! effect of its own, owned by the mount root, so a signal read inside a
//! component re-renders that component alone. Later signal changes re-run
//! the affected effects at the next frame.
//!
//! - [`Renderer::mount`] clears the container on the first pass and
//!   materializes the view fresh.
//! - [`Renderer::hydrate`] patches the existing children on the first pass,
//!   so server-produced markup keeps its nodes and only gains listeners,
//!   refs, and whatever props differ.
//!
//! In a host-less runtime both return an inert [`MountHandle`] without
//! touching the container.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use fdom_reactive::{Effect, Runtime};
use tracing::{debug, info};

use crate::document::Document;
use crate::reconcile::{Reconciler, RenderConfig};
use crate::scope::Scope;
use crate::vnode::VNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Mount,
    Hydrate,
}

/// Binds view functions to containers of a [`Document`].
pub struct Renderer<D: Document> {
    runtime: Runtime,
    reconciler: Rc<Reconciler<D>>,
}

impl<D: Document + 'static> Renderer<D> {
    pub fn new(runtime: &Runtime, document: D) -> Self {
        Self::with_config(runtime, document, RenderConfig::default())
    }

    pub fn with_config(runtime: &Runtime, document: D, config: RenderConfig) -> Self {
        Self {
            runtime: runtime.clone(),
            reconciler: Reconciler::scoped(runtime, document, config),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn reconciler(&self) -> &Reconciler<D> {
        &self.reconciler
    }

    pub fn document(&self) -> &D {
        self.reconciler.document()
    }

    /// Replace the container's content with `view()` and keep it in sync.
    pub fn mount(&self, container: &D::Node, view: impl Fn() -> VNode + 'static) -> MountHandle {
        self.attach(container, view, Mode::Mount)
    }

    /// Adopt the container's existing content as the first render of
    /// `view()` and keep it in sync.
    pub fn hydrate(&self, container: &D::Node, view: impl Fn() -> VNode + 'static) -> MountHandle {
        self.attach(container, view, Mode::Hydrate)
    }

    fn attach(
        &self,
        container: &D::Node,
        view: impl Fn() -> VNode + 'static,
        mode: Mode,
    ) -> MountHandle {
        if !self.runtime.has_host() {
            debug!(?mode, "no host; render entry skipped");
            return MountHandle::inert();
        }
        info!(?mode, container = ?container, "attaching view");

        let reconciler = Rc::clone(&self.reconciler);
        let container = container.clone();
        let passes = Rc::new(Cell::new(0_u64));
        let counter = Rc::clone(&passes);
        let root = Scope::root();
        let effect = self.runtime.create_effect(move || {
            let pass = counter.get();
            let _span = tracing::debug_span!("fdom.render", ?mode, pass).entered();
            let tree = view();
            if pass == 0 && mode == Mode::Mount {
                reconciler.clear(&container);
            }
            {
                let _owner = reconciler.enter(&root);
                reconciler.patch_children(&container, std::slice::from_ref(&tree));
            }
            counter.set(pass + 1);
            reconciler.release(&root)
        });

        MountHandle {
            effect: Some(effect),
            passes,
        }
    }
}

impl<D: Document + fmt::Debug + 'static> fmt::Debug for Renderer<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("runtime", &self.runtime)
            .field("reconciler", &self.reconciler)
            .finish()
    }
}

/// Owner of a mounted view's render effect.
///
/// Dropping the handle (or calling [`unmount`](Self::unmount)) stops
/// updates, component effects included; the rendered nodes stay in place.
#[must_use = "dropping the handle stops the view from updating"]
pub struct MountHandle {
    effect: Option<Effect>,
    passes: Rc<Cell<u64>>,
}

impl MountHandle {
    fn inert() -> Self {
        Self {
            effect: None,
            passes: Rc::new(Cell::new(0)),
        }
    }

    /// Whether the render effect is alive.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.effect.as_ref().is_some_and(Effect::is_active)
    }

    /// Number of completed render passes.
    #[must_use]
    pub fn render_count(&self) -> u64 {
        self.passes.get()
    }

    /// Stop updating the view.
    pub fn unmount(mut self) {
        if let Some(effect) = self.effect.take() {
            effect.dispose();
        }
    }

    /// Keep the view updating for the lifetime of the runtime.
    pub fn detach(mut self) {
        if let Some(effect) = self.effect.take() {
            effect.detach();
        }
    }
}

impl fmt::Debug for MountHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountHandle")
            .field("active", &self.is_active())
            .field("render_count", &self.render_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use fdom_reactive::{ManualFrameHost, Signal};
    use pretty_assertions::assert_eq;

    use super::*;

    use crate::memory::MemoryDocument;
    use crate::vnode::{component, fragment, h, text};

    fn client() -> (Runtime, Rc<ManualFrameHost>, MemoryDocument, Renderer<MemoryDocument>) {
        let host = ManualFrameHost::new();
        let rt = Runtime::new(host.clone());
        let doc = MemoryDocument::new();
        let renderer = Renderer::new(&rt, doc.clone());
        (rt, host, doc, renderer)
    }

    #[test]
    fn mount_clears_and_renders() {
        let (_rt, _host, doc, renderer) = client();
        let stale = doc.create_text("server leftovers");
        let root = doc.build("div", &[], &[stale]);

        let handle = renderer.mount(&root, || h("p").child("fresh").build());

        assert_eq!(doc.inner_html(root), "<p>fresh</p>");
        assert_eq!(doc.parent(&stale), None);
        assert_eq!(handle.render_count(), 1);
        assert!(handle.is_active());
    }

    #[test]
    fn signal_change_rerenders_at_next_frame() {
        let (rt, host, doc, renderer) = client();
        let root = doc.build("div", &[], &[]);
        let count = rt.signal(0);

        let c = count.clone();
        let handle = renderer.mount(&root, move || h("span").child(text(c.get())).build());
        let span = doc.children(&root)[0];

        count.set(5);
        assert_eq!(doc.inner_html(root), "<span>0</span>", "updates wait for the frame");
        host.advance_frame();
        assert_eq!(doc.inner_html(root), "<span>5</span>");
        assert_eq!(doc.children(&root)[0], span, "same-tag patch keeps identity");
        assert_eq!(handle.render_count(), 2);
    }

    #[test]
    fn hydrate_adopts_existing_markup() {
        let (_rt, _host, doc, renderer) = client();
        let label = doc.create_text("Click");
        let button = doc.build("button", &[("class", "btn")], &[label]);
        let root = doc.build("div", &[], &[button]);
        let nodes_before = doc.node_count();

        let clicks = Rc::new(Cell::new(0));
        let c = Rc::clone(&clicks);
        let _handle = renderer.hydrate(&root, move || {
            let c = Rc::clone(&c);
            h("button")
                .class_name("btn")
                .on("click", move |_| c.set(c.get() + 1))
                .child("Click")
                .build()
        });

        assert_eq!(doc.node_count(), nodes_before, "no nodes created");
        assert_eq!(doc.children(&root), vec![button]);
        doc.click(button);
        assert_eq!(clicks.get(), 1);
    }

    #[test]
    fn component_reads_rerender_only_the_component() {
        let (rt, host, doc, renderer) = client();
        let root = doc.build("div", &[], &[]);
        let name = rt.signal(String::from("ana"));

        let n = name.clone();
        let handle = renderer.mount(&root, move || {
            let n = n.clone();
            component("Greeting", move |_, _| h("b").child(n.get()).build()).build()
        });
        let b = doc.children(&root)[0];
        name.set(String::from("rui"));
        host.advance_frame();
        assert_eq!(doc.inner_html(root), "<b>rui</b>");
        assert_eq!(doc.children(&root)[0], b);
        assert_eq!(handle.render_count(), 1, "the view did not re-run");
    }

    fn counted(
        name: &'static str,
        value: &Signal<i32>,
        renders: &Rc<Cell<usize>>,
    ) -> VNode {
        let (value, renders) = (value.clone(), Rc::clone(renders));
        component(name, move |_, _| {
            renders.set(renders.get() + 1);
            h("span").child(text(value.get())).build()
        })
        .build()
    }

    #[test]
    fn sibling_components_rerender_independently() {
        let (rt, host, doc, renderer) = client();
        let root = doc.build("div", &[], &[]);
        let (a, b) = (rt.signal(1), rt.signal(10));
        let (a_renders, b_renders) = (Rc::new(Cell::new(0)), Rc::new(Cell::new(0)));

        let (va, vb, ra, rb) = (a.clone(), b.clone(), Rc::clone(&a_renders), Rc::clone(&b_renders));
        let handle = renderer.mount(&root, move || {
            fragment([counted("A", &va, &ra), counted("B", &vb, &rb)])
        });
        let before = doc.children(&root);
        assert_eq!(doc.inner_html(root), "<span>1</span><span>10</span>");

        a.set(2);
        host.advance_frame();
        assert_eq!(doc.inner_html(root), "<span>2</span><span>10</span>");
        assert_eq!(a_renders.get(), 2);
        assert_eq!(b_renders.get(), 1, "sibling untouched");
        assert_eq!(handle.render_count(), 1);
        assert_eq!(doc.children(&root), before);
    }

    #[test]
    fn growing_component_inserts_before_its_next_sibling() {
        let (rt, host, doc, renderer) = client();
        let root = doc.build("div", &[], &[]);
        let count = rt.signal(1_u32);

        let c = count.clone();
        let _handle = renderer.mount(&root, move || {
            let c = c.clone();
            fragment([
                component("List", move |_, _| {
                    fragment((0..c.get()).map(|i| h("i").child(text(i)).build()))
                })
                .build(),
                h("p").child("end").build(),
            ])
        });
        let end = doc.children(&root)[1];

        count.set(3);
        host.advance_frame();
        assert_eq!(doc.inner_html(root), "<i>0</i><i>1</i><i>2</i><p>end</p>");

        count.set(0);
        host.advance_frame();
        assert_eq!(doc.inner_html(root), "<p>end</p>");
        assert_eq!(doc.children(&root).len(), 2, "an empty text node keeps the slot");

        count.set(2);
        host.advance_frame();
        assert_eq!(doc.inner_html(root), "<i>0</i><i>1</i><p>end</p>");
        assert_eq!(doc.children(&root).last(), Some(&end));
    }

    #[test]
    fn owner_rerun_replaces_its_child_scopes() {
        let (rt, host, doc, renderer) = client();
        let root = doc.build("div", &[], &[]);
        let (outer, inner) = (rt.signal(0), rt.signal(0));
        let inner_renders = Rc::new(Cell::new(0));

        let (o, i, r) = (outer.clone(), inner.clone(), Rc::clone(&inner_renders));
        let _handle = renderer.mount(&root, move || {
            let (o, i, r) = (o.clone(), i.clone(), Rc::clone(&r));
            component("Outer", move |_, _| {
                h("section")
                    .child(text(o.get()))
                    .child(counted("Inner", &i, &r))
                    .build()
            })
            .build()
        });
        let effects = rt.effect_count();
        assert_eq!(effects, 3, "root, Outer, Inner");

        outer.set(1);
        host.advance_frame();
        assert_eq!(inner_renders.get(), 2, "inner is re-mounted with its owner");
        assert_eq!(rt.effect_count(), effects, "the old inner scope was disposed");

        inner.set(5);
        host.advance_frame();
        assert_eq!(inner_renders.get(), 3);
        assert_eq!(doc.inner_html(root), "<section>1<span>5</span></section>");
    }

    #[test]
    fn unmount_disposes_component_effects() {
        let (rt, _host, doc, renderer) = client();
        let root = doc.build("div", &[], &[]);
        let value = rt.signal(0);
        let renders = Rc::new(Cell::new(0));
        let (v, r) = (value.clone(), Rc::clone(&renders));
        let handle = renderer.mount(&root, move || counted("Leaf", &v, &r));
        assert_eq!(rt.effect_count(), 2);

        handle.unmount();
        assert_eq!(rt.effect_count(), 0);
        assert_eq!(value.subscriber_count(), 0);
    }

    #[test]
    fn unmount_stops_updates() {
        let (rt, host, doc, renderer) = client();
        let root = doc.build("div", &[], &[]);
        let count = rt.signal(1);
        let c = count.clone();
        let handle = renderer.mount(&root, move || text(c.get()));

        handle.unmount();
        count.set(2);
        host.advance_frame();
        assert_eq!(doc.inner_html(root), "1");
        assert_eq!(rt.effect_count(), 0);
    }

    #[test]
    fn server_runtime_is_inert() {
        let rt = Runtime::server();
        let doc = MemoryDocument::new();
        let renderer = Renderer::new(&rt, doc.clone());
        let stale = doc.create_text("ssr");
        let root = doc.build("div", &[], &[stale]);

        let handle = renderer.mount(&root, || text("client"));

        assert!(!handle.is_active());
        assert_eq!(handle.render_count(), 0);
        assert_eq!(doc.inner_html(root), "ssr");
    }
}
