#![forbid(unsafe_code)]

//! Positional reconciliation of virtual nodes against a live tree.
//!
//! [`Reconciler::patch`] aligns one live node with one virtual node using
//! the smallest set of mutations the rules below allow. There is no keyed
//! matching: children are compared index by index.
//!
//! # Rules
//!
//! 1. **Text**: a live text node has its content replaced only when it
//!    differs; any other live node is replaced by a fresh text node.
//! 2. **Empty**: the live node is left untouched.
//! 3. **Fragment**: the live node's children are patched positionally. The
//!    common prefix is patched in place, extra virtual children are appended,
//!    and extra live children are removed from the tail. Nested fragments and
//!    component output are flattened first; `Empty` entries keep their slot.
//! 4. **Element, different tag** (ASCII case-insensitive): a fresh subtree
//!    replaces the live node; the listener table entries of the discarded
//!    subtree are dropped.
//! 5. **Element, same tag**: props are applied in order, then children are
//!    patched by rule 3. The node keeps its identity.
//! 6. **Component**: rendered (panic-isolated) and its output patched at the
//!    same position.
//!
//! # Component scopes
//!
//! A reconciler built with [`Reconciler::scoped`] gives every component met
//! inside a child list its own render effect while a mount root is running
//! (see [`Renderer`](crate::Renderer)). The component's signal reads
//! subscribe that effect only, and a re-run patches just the run of live
//! nodes the component occupies. Output that grows is inserted before the
//! next sibling; output that shrinks is removed from the run's tail. A
//! component that renders nothing keeps one empty text node as its slot.
//! Child scopes are disposed before their owner re-runs and when the mount
//! root goes away. Outside a running mount root components render inline.
//!
//! # Props
//!
//! | Key              | Value              | Effect                                  |
//! |------------------|--------------------|-----------------------------------------|
//! | `on<Event>`      | handler            | unbind previous handler, bind new one   |
//! | `style`          | map                | merge declarations                      |
//! | `dataset`        | map                | `data-*` attributes                     |
//! | `className`      | scalar             | `class` attribute                       |
//! | `ref`            | ref                | filled with the live node               |
//! | `ref`            | anything else      | skipped                                 |
//! | `children`/`key` | any                | ignored                                 |
//! | other            | scalar / null      | property if the host has one, else attribute |
//!
//! Handlers bound on an earlier pass whose key is absent from the new props
//! are unbound.
//!
//! # Failure Modes
//!
//! An invalid tag, a panicking component, or a host creation failure is
//! logged as a [`ReconcileError`] and replaced by a placeholder text node
//! (see [`RenderConfig`]). Siblings are patched normally.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use fdom_reactive::{Cleanup, Runtime, WeakRuntime, panic_message};
use smallvec::SmallVec;
use tracing::{debug, error, trace};

use crate::document::Document;
use crate::error::{ReconcileError, is_valid_tag};
use crate::scope::{OwnerGuard, Placement, Scope, Segment};
use crate::vnode::{ComponentNode, ElementNode, EventHandler, PropValue, Props, VNode};

/// Attribute marking server markup that must be rebuilt on the client.
pub const CLIENT_ATTRIBUTE: &str = "data-fdom-client";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Reconciler behavior knobs.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Materialize failed nodes as visible placeholder text. When `false`,
    /// failed nodes become empty text nodes.
    /// Default: true
    pub error_placeholders: bool,
    /// Prefix of placeholder text, followed by the error message.
    /// Default: "[fdom error] "
    pub placeholder_prefix: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            error_placeholders: true,
            placeholder_prefix: String::from("[fdom error] "),
        }
    }
}

impl RenderConfig {
    #[must_use]
    pub fn error_placeholders(mut self, enabled: bool) -> Self {
        self.error_placeholders = enabled;
        self
    }

    #[must_use]
    pub fn placeholder_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.placeholder_prefix = prefix.into();
        self
    }

    fn placeholder(&self, err: &ReconcileError) -> String {
        if self.error_placeholders {
            format!("{}{err}", self.placeholder_prefix)
        } else {
            String::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Flattened child slots
// ---------------------------------------------------------------------------

/// A single-node child position.
enum Slot {
    Text(String),
    Empty,
    Element(Rc<ElementNode>),
    Failed(ReconcileError),
}

/// A flattened child list entry.
enum Entry {
    Slot(Slot),
    /// A component mounted in a scope of its own, spanning any number of
    /// live nodes.
    Scoped(Rc<ComponentNode>),
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

type ListenerTable<D> = HashMap<
    <D as Document>::Node,
    SmallVec<[(String, <D as Document>::Listener); 2]>,
    ahash::RandomState,
>;

/// Patches live nodes of a [`Document`] to match virtual nodes.
///
/// The reconciler owns the side table of bound listeners, keyed by
/// `(node, event)`, so it can unbind the previous handler before binding a
/// new one.
pub struct Reconciler<D: Document> {
    doc: D,
    config: RenderConfig,
    listeners: RefCell<ListenerTable<D>>,
    scopes: Option<ScopeHost<D>>,
}

/// Scoped-mode state: the runtime component effects live in, a handle back
/// to the reconciler for their bodies, and the stack of running owners.
struct ScopeHost<D: Document> {
    runtime: WeakRuntime,
    this: Weak<Reconciler<D>>,
    owners: RefCell<Vec<Rc<Scope<D::Node>>>>,
}

impl<D: Document + 'static> Reconciler<D> {
    pub fn new(doc: D) -> Self {
        Self::with_config(doc, RenderConfig::default())
    }

    pub fn with_config(doc: D, config: RenderConfig) -> Self {
        Self {
            doc,
            config,
            listeners: RefCell::new(HashMap::with_hasher(ahash::RandomState::new())),
            scopes: None,
        }
    }

    /// A reconciler that mounts components in render effects of their own
    /// on `runtime`.
    pub fn scoped(runtime: &Runtime, doc: D, config: RenderConfig) -> Rc<Self> {
        let runtime = runtime.downgrade();
        Rc::new_cyclic(|this| Self {
            doc,
            config,
            listeners: RefCell::new(HashMap::with_hasher(ahash::RandomState::new())),
            scopes: Some(ScopeHost {
                runtime,
                this: Weak::clone(this),
                owners: RefCell::new(Vec::new()),
            }),
        })
    }

    /// Whether components get scopes of their own.
    pub fn is_scoped(&self) -> bool {
        self.scopes.is_some()
    }

    /// The document being patched.
    pub fn document(&self) -> &D {
        &self.doc
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Events with a handler currently bound on `node`, in binding order.
    pub fn bound_events(&self, node: &D::Node) -> Vec<String> {
        self.listeners
            .borrow()
            .get(node)
            .map(|entries| entries.iter().map(|(event, _)| event.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of nodes with at least one bound handler.
    pub fn bound_node_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Patch `live` to match `vnode`. Returns the node now occupying
    /// `live`'s position (`live` itself unless it was replaced).
    pub fn patch(&self, live: &D::Node, vnode: &VNode) -> D::Node {
        match vnode {
            VNode::Text(value) => self.patch_text(live, &value.to_string()),
            VNode::Empty => live.clone(),
            VNode::Fragment(children) => {
                self.patch_children(live, children);
                live.clone()
            }
            VNode::Component(component) => match self.render_component(component) {
                Ok(output) => self.patch(live, &output),
                Err(err) => self.patch_failed(live, &err),
            },
            VNode::Element(element) => self.patch_element(live, element),
        }
    }

    /// Patch the child list of `parent` positionally against `children`.
    pub fn patch_children(&self, parent: &D::Node, children: &[VNode]) {
        let entries = self.flatten(children);
        let live = self.doc.children(parent);
        trace!(live = live.len(), vnodes = entries.len(), "patching children");

        let (_, used) = self.patch_run(parent, &live, &entries, None);
        self.remove_all(&live[used..]);
    }

    /// Materialize `vnode` into fresh, detached nodes (one per flattened
    /// slot). Components render inline.
    pub fn create(&self, vnode: &VNode) -> Vec<D::Node> {
        let mut entries = Vec::new();
        self.flatten_into(std::slice::from_ref(vnode), &mut entries, false);
        entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Slot(slot) => Some(self.materialize_slot(slot)),
                // Unscoped flattening renders components inline.
                Entry::Scoped(_) => None,
            })
            .collect()
    }

    /// Remove every child of `container`, dropping their listener entries.
    pub fn clear(&self, container: &D::Node) {
        for child in self.doc.children(container) {
            self.forget_subtree(&child);
            self.doc.remove(&child);
        }
    }

    // -----------------------------------------------------------------------
    // Flattening
    // -----------------------------------------------------------------------

    fn flatten(&self, children: &[VNode]) -> Vec<Entry> {
        let mut entries = Vec::with_capacity(children.len());
        self.flatten_into(children, &mut entries, self.has_owner());
        entries
    }

    fn flatten_into(&self, children: &[VNode], out: &mut Vec<Entry>, scoped: bool) {
        for child in children {
            match child {
                VNode::Text(value) => out.push(Entry::Slot(Slot::Text(value.to_string()))),
                VNode::Empty => out.push(Entry::Slot(Slot::Empty)),
                VNode::Element(element) => out.push(Entry::Slot(Slot::Element(Rc::clone(element)))),
                VNode::Fragment(items) => self.flatten_into(items, out, scoped),
                VNode::Component(component) if scoped => out.push(Entry::Scoped(Rc::clone(component))),
                VNode::Component(component) => match self.render_component(component) {
                    Ok(output) => self.flatten_into(std::slice::from_ref(&output), out, false),
                    Err(err) => out.push(Entry::Slot(Slot::Failed(err))),
                },
            }
        }
    }

    fn render_component(&self, component: &ComponentNode) -> Result<VNode, ReconcileError> {
        let _span = tracing::debug_span!("fdom.component", name = %component.name).entered();
        panic::catch_unwind(AssertUnwindSafe(|| component.render())).map_err(|payload| {
            ReconcileError::ComponentPanicked {
                component: component.name.clone(),
                message: panic_message(payload.as_ref()),
            }
        })
    }

    // -----------------------------------------------------------------------
    // Component scopes
    // -----------------------------------------------------------------------

    fn has_owner(&self) -> bool {
        self.scopes
            .as_ref()
            .is_some_and(|host| !host.owners.borrow().is_empty())
    }

    /// Make `scope` the owner of components mounted until the guard drops.
    /// `None` for an unscoped reconciler.
    pub(crate) fn enter(&self, scope: &Rc<Scope<D::Node>>) -> Option<OwnerGuard<'_, D::Node>> {
        let host = self.scopes.as_ref()?;
        Some(OwnerGuard::new(&host.owners, Rc::clone(scope)))
    }

    /// Cleanup disposing the scopes `scope` owns.
    pub(crate) fn release(&self, scope: &Rc<Scope<D::Node>>) -> Option<Cleanup> {
        let host = self.scopes.as_ref()?;
        Some(scope.release(host.runtime.clone()))
    }

    /// Mount `component` over the front of `available`, in a scope owned by
    /// the running owner. Its first run happens before this returns.
    fn mount_scope(
        &self,
        parent: &D::Node,
        available: &[D::Node],
        anchor: Option<&D::Node>,
        component: &Rc<ComponentNode>,
    ) -> Rc<Scope<D::Node>> {
        let placement = Placement {
            parent: parent.clone(),
            available: available.to_vec(),
            anchor: anchor.cloned(),
        };
        let scope = Scope::new(&component.name, Some(placement));
        let Some(host) = self.scopes.as_ref() else {
            let _ = self.run_scope(&scope, component);
            return scope;
        };
        if let Some(owner) = host.owners.borrow().last() {
            owner.adopt(Rc::clone(&scope));
        }
        let Some(runtime) = host.runtime.upgrade().filter(Runtime::has_host) else {
            debug!(component = %component.name, "no live runtime; component renders once");
            let _ = self.run_scope(&scope, component);
            return scope;
        };

        let this = Weak::clone(&host.this);
        let body_scope = Rc::clone(&scope);
        let body_component = Rc::clone(component);
        let effect = runtime.create_effect(move || -> Option<Cleanup> {
            let reconciler = this.upgrade()?;
            reconciler.run_scope(&body_scope, &body_component)
        });
        scope.set_effect(effect.id());
        effect.detach();
        scope
    }

    /// One run of a component scope: render, then patch its footprint.
    fn run_scope(&self, scope: &Rc<Scope<D::Node>>, component: &ComponentNode) -> Option<Cleanup> {
        let output = self.render_component(component);
        let _owner = self.enter(scope);
        let mut entries = match output {
            Ok(vnode) => self.flatten(std::slice::from_ref(&vnode)),
            Err(err) => vec![Entry::Slot(Slot::Failed(err))],
        };
        if entries.is_empty() {
            entries.push(Entry::Slot(Slot::Text(String::new())));
        }

        if let Some(placement) = scope.take_placement() {
            let (footprint, used) = self.patch_run(
                &placement.parent,
                &placement.available,
                &entries,
                placement.anchor.as_ref(),
            );
            scope.set_consumed(used);
            scope.set_footprint(footprint);
            return self.release(scope);
        }

        let nodes = scope.nodes();
        let parent = nodes.first().and_then(|node| self.doc.parent(node));
        let (Some(parent), Some(last)) = (parent, nodes.last()) else {
            debug!(component = scope.name(), "scope is detached; re-run skipped");
            return self.release(scope);
        };
        trace!(component = scope.name(), live = nodes.len(), vnodes = entries.len(), "re-running scope");
        let anchor = self.next_sibling(&parent, last);
        let (footprint, used) = self.patch_run(&parent, &nodes, &entries, anchor.as_ref());
        self.remove_all(&nodes[used..]);
        scope.set_footprint(footprint);
        self.release(scope)
    }

    /// Patch `entries` against `live`, a run of consecutive children of
    /// `parent`, from its front. Entries left over once `live` runs out are
    /// inserted before `anchor` (appended when `None`).
    ///
    /// Returns the footprint and how many live nodes were used; the rest is
    /// the caller's to remove.
    fn patch_run(
        &self,
        parent: &D::Node,
        live: &[D::Node],
        entries: &[Entry],
        anchor: Option<&D::Node>,
    ) -> (Vec<Segment<D::Node>>, usize) {
        let mut footprint = Vec::with_capacity(entries.len());
        let mut cursor = 0;
        for entry in entries {
            let slot = match entry {
                Entry::Slot(slot) => slot,
                Entry::Scoped(component) => {
                    let rest = live.get(cursor..).unwrap_or_default();
                    let scope = self.mount_scope(parent, rest, anchor, component);
                    cursor += scope.consumed();
                    footprint.push(Segment::Scope(scope));
                    continue;
                }
            };
            let node = match live.get(cursor) {
                Some(current) => {
                    cursor += 1;
                    self.patch_slot(current, slot)
                }
                None => {
                    let fresh = self.materialize_slot(slot);
                    match anchor {
                        Some(reference) => self.doc.insert_before(parent, &fresh, reference),
                        None => self.doc.append_child(parent, &fresh),
                    }
                    fresh
                }
            };
            footprint.push(Segment::Node(node));
        }
        (footprint, cursor)
    }

    fn next_sibling(&self, parent: &D::Node, node: &D::Node) -> Option<D::Node> {
        let children = self.doc.children(parent);
        let position = children.iter().position(|child| child == node)?;
        children.get(position + 1).cloned()
    }

    fn remove_all(&self, nodes: &[D::Node]) {
        for node in nodes {
            self.forget_subtree(node);
            self.doc.remove(node);
        }
    }

    // -----------------------------------------------------------------------
    // Patching
    // -----------------------------------------------------------------------

    fn patch_slot(&self, live: &D::Node, slot: &Slot) -> D::Node {
        match slot {
            Slot::Text(text) => self.patch_text(live, text),
            Slot::Empty => live.clone(),
            Slot::Element(element) => self.patch_element(live, element),
            Slot::Failed(err) => self.patch_failed(live, err),
        }
    }

    fn patch_text(&self, live: &D::Node, text: &str) -> D::Node {
        match self.doc.text(live) {
            Some(current) => {
                if current != text {
                    self.doc.set_text(live, text);
                }
                live.clone()
            }
            None => {
                let fresh = self.doc.create_text(text);
                self.replace(live, &fresh);
                fresh
            }
        }
    }

    fn patch_failed(&self, live: &D::Node, err: &ReconcileError) -> D::Node {
        error!(error = %err, "node failed to render; substituting a placeholder");
        self.patch_text(live, &self.config.placeholder(err))
    }

    fn patch_element(&self, live: &D::Node, element: &ElementNode) -> D::Node {
        if !is_valid_tag(&element.tag) {
            let err = ReconcileError::InvalidTag {
                tag: element.tag.clone(),
            };
            return self.patch_failed(live, &err);
        }

        let same_tag = self
            .doc
            .tag_name(live)
            .is_some_and(|tag| tag.eq_ignore_ascii_case(&element.tag));
        let client_only = same_tag
            && self.doc.attribute(live, CLIENT_ATTRIBUTE).is_some()
            && element.props.get("client").is_some_and(|v| !v.is_falsy());

        if !same_tag || client_only {
            debug!(tag = %element.tag, client_only, "replacing live node with a fresh subtree");
            return match self.create_element(element) {
                Ok(fresh) => {
                    self.replace(live, &fresh);
                    fresh
                }
                Err(err) => self.patch_failed(live, &err),
            };
        }

        self.apply_props(live, &element.props);
        self.patch_children(live, &element.children);
        live.clone()
    }

    fn replace(&self, old: &D::Node, new: &D::Node) {
        self.forget_subtree(old);
        self.doc.replace_with(old, new);
    }

    // -----------------------------------------------------------------------
    // Materialization
    // -----------------------------------------------------------------------

    fn materialize_slot(&self, slot: &Slot) -> D::Node {
        match slot {
            Slot::Text(text) => self.doc.create_text(text),
            Slot::Empty => self.doc.create_text(""),
            Slot::Element(element) => match self.create_element(element) {
                Ok(node) => node,
                Err(err) => self.failed_node(&err),
            },
            Slot::Failed(err) => self.failed_node(err),
        }
    }

    fn failed_node(&self, err: &ReconcileError) -> D::Node {
        error!(error = %err, "node failed to render; substituting a placeholder");
        self.doc.create_text(&self.config.placeholder(err))
    }

    fn create_element(&self, element: &ElementNode) -> Result<D::Node, ReconcileError> {
        if !is_valid_tag(&element.tag) {
            return Err(ReconcileError::InvalidTag {
                tag: element.tag.clone(),
            });
        }
        let node = self
            .doc
            .create_element(&element.tag)
            .map_err(|err| ReconcileError::Host {
                message: err.message,
            })?;
        self.apply_props(&node, &element.props);
        let entries = self.flatten(&element.children);
        self.patch_run(&node, &[], &entries, None);
        Ok(node)
    }

    // -----------------------------------------------------------------------
    // Props
    // -----------------------------------------------------------------------

    fn apply_props(&self, node: &D::Node, props: &Props) {
        let mut events: SmallVec<[String; 4]> = SmallVec::new();
        for (key, value) in props {
            match (key.as_str(), value) {
                ("children" | "key" | "client", _) => {}
                ("ref", PropValue::Ref(node_ref)) => node_ref.set(node.clone()),
                ("ref", _) => debug!("`ref` prop is not a NodeRef; skipped"),
                (name, PropValue::Handler(handler)) if is_event_key(name) => {
                    let event = name[2..].to_ascii_lowercase();
                    self.bind(node, &event, handler.clone());
                    events.push(event);
                }
                ("style", PropValue::Map(style)) => {
                    for (name, value) in style {
                        self.doc.set_style(node, &css_name(name), value);
                    }
                }
                ("dataset", PropValue::Map(data)) => {
                    for (name, value) in data {
                        self.doc
                            .set_attribute(node, &format!("data-{}", css_name(name)), value);
                    }
                }
                ("className" | "class", value) => self.set_attribute(node, "class", value),
                (name, value) if self.doc.has_property(node, name) => match value {
                    PropValue::Null => self.doc.set_property(node, name, None),
                    other => match other.as_primitive() {
                        Some(primitive) => self.doc.set_property(node, name, Some(&primitive)),
                        None => trace!(prop = name, "non-scalar value for a property; skipped"),
                    },
                },
                (name, value) => self.set_attribute(node, name, value),
            }
        }
        self.unbind_missing(node, &events);
    }

    fn set_attribute(&self, node: &D::Node, name: &str, value: &PropValue) {
        if value.is_falsy() {
            self.doc.remove_attribute(node, name);
        } else if let Some(primitive) = value.as_primitive() {
            self.doc.set_attribute(node, name, &primitive.to_string());
        } else {
            trace!(prop = name, "non-scalar value for an attribute; skipped");
        }
    }

    fn bind(&self, node: &D::Node, event: &str, handler: EventHandler) {
        let mut table = self.listeners.borrow_mut();
        let entries = table.entry(node.clone()).or_default();
        if let Some(position) = entries.iter().position(|(bound, _)| bound == event) {
            let (_, previous) = entries.remove(position);
            self.doc.remove_event_listener(node, event, previous);
        }
        let listener = self.doc.add_event_listener(node, event, handler);
        entries.push((event.to_owned(), listener));
    }

    fn unbind_missing(&self, node: &D::Node, keep: &[String]) {
        let mut table = self.listeners.borrow_mut();
        let Some(entries) = table.get_mut(node) else {
            return;
        };
        let mut index = 0;
        while index < entries.len() {
            if keep.contains(&entries[index].0) {
                index += 1;
            } else {
                let (event, listener) = entries.remove(index);
                debug!(%event, "unbinding handler absent from new props");
                self.doc.remove_event_listener(node, &event, listener);
            }
        }
        if entries.is_empty() {
            table.remove(node);
        }
    }

    /// Drop listener entries of `root` and its descendants.
    fn forget_subtree(&self, root: &D::Node) {
        if self.listeners.borrow().is_empty() {
            return;
        }
        let mut stack = vec![root.clone()];
        while let Some(node) = stack.pop() {
            let entries = self.listeners.borrow_mut().remove(&node);
            for (event, listener) in entries.into_iter().flatten() {
                self.doc.remove_event_listener(&node, &event, listener);
            }
            stack.extend(self.doc.children(&node));
        }
    }
}

impl<D: Document + fmt::Debug + 'static> fmt::Debug for Reconciler<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("doc", &self.doc)
            .field("config", &self.config)
            .field("bound_nodes", &self.bound_node_count())
            .field("scoped", &self.is_scoped())
            .finish()
    }
}

fn is_event_key(key: &str) -> bool {
    key.len() > 2 && key.starts_with("on")
}

/// `backgroundColor` → `background-color`; kebab-case passes through.
fn css_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::memory::{MemNode, MemoryDocument};
    use crate::vnode::{NodeRef, component, fragment, h, text};

    fn setup() -> (MemoryDocument, Reconciler<MemoryDocument>) {
        let doc = MemoryDocument::new();
        (doc.clone(), Reconciler::new(doc))
    }

    fn counter() -> (Rc<Cell<usize>>, EventHandler) {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        (hits, EventHandler::new(move |_| h.set(h.get() + 1)))
    }

    #[test]
    fn same_tag_keeps_identity_and_updates_class() {
        let (doc, rec) = setup();
        let label = doc.create_text("Click");
        let button = doc.build("button", &[("class", "btn")], &[label]);
        let root = doc.build("div", &[], &[button]);

        let vnode = h("button").class_name("btn2").child("Click").build();
        let result = rec.patch(&button, &vnode);

        assert_eq!(result, button);
        assert_eq!(doc.children(&button), vec![label], "text node reused");
        assert_eq!(doc.outer_html(root), r#"<div><button class="btn2">Click</button></div>"#);
    }

    #[test]
    fn tag_change_replaces_node() {
        let (doc, rec) = setup();
        let span = doc.build("span", &[], &[]);
        let root = doc.build("div", &[], &[span]);

        let result = rec.patch(&span, &h("div").child("x").build());

        assert_ne!(result, span);
        assert_eq!(doc.parent(&span), None, "old node detached");
        assert_eq!(doc.children(&root), vec![result]);
        assert_eq!(doc.outer_html(root), "<div><div>x</div></div>");
    }

    #[test]
    fn tag_comparison_ignores_case() {
        let (doc, rec) = setup();
        let button = doc.build("button", &[], &[]);
        let _root = doc.build("div", &[], &[button]);
        assert_eq!(rec.patch(&button, &h("BUTTON").build()), button);
    }

    #[test]
    fn text_updates_only_when_different() {
        let (doc, rec) = setup();
        let node = doc.create_text("same");
        let root = doc.build("p", &[], &[node]);
        assert_eq!(rec.patch(&node, &text("same")), node);
        assert_eq!(rec.patch(&node, &text(42)), node);
        assert_eq!(doc.outer_html(root), "<p>42</p>");
    }

    #[test]
    fn text_replaces_element() {
        let (doc, rec) = setup();
        let span = doc.build("span", &[], &[]);
        let root = doc.build("p", &[], &[span]);
        let result = rec.patch(&span, &text("plain"));
        assert_ne!(result, span);
        assert_eq!(doc.outer_html(root), "<p>plain</p>");
    }

    #[test]
    fn empty_leaves_node_untouched() {
        let (doc, rec) = setup();
        let span = doc.build("span", &[("id", "keep")], &[]);
        let root = doc.build("p", &[], &[span]);
        assert_eq!(rec.patch(&span, &VNode::Empty), span);
        assert_eq!(doc.outer_html(root), r#"<p><span id="keep"></span></p>"#);
    }

    #[test]
    fn rebinding_handler_calls_only_the_new_one() {
        let (doc, rec) = setup();
        let button = doc.build("button", &[], &[]);
        let _root = doc.build("div", &[], &[button]);
        let (first_hits, first) = counter();
        let (second_hits, second) = counter();

        rec.patch(&button, &h("button").handler("Click", first).build());
        rec.patch(&button, &h("button").handler("Click", second).build());
        doc.click(button);

        assert_eq!(first_hits.get(), 0);
        assert_eq!(second_hits.get(), 1);
        assert_eq!(doc.listener_count(button), 1);
        assert_eq!(rec.bound_events(&button), vec!["click".to_string()]);
    }

    #[test]
    fn absent_handler_is_unbound() {
        let (doc, rec) = setup();
        let button = doc.build("button", &[], &[]);
        let _root = doc.build("div", &[], &[button]);
        let (hits, handler) = counter();

        rec.patch(&button, &h("button").handler("click", handler).build());
        rec.patch(&button, &h("button").build());
        doc.click(button);

        assert_eq!(hits.get(), 0);
        assert_eq!(doc.listener_count(button), 0);
        assert_eq!(rec.bound_node_count(), 0);
    }

    #[test]
    fn positional_children_preserve_unchanged_slots() {
        let (doc, rec) = setup();
        let root = doc.build("ul", &[], &[]);
        let item = |label: &str| h("li").child(label.to_owned()).build();

        rec.patch(&root, &fragment([item("A"), item("B"), item("C")]));
        let before = doc.children(&root);

        rec.patch(&root, &fragment([h("p").child("X").build(), item("B"), item("C")]));
        let after = doc.children(&root);

        assert_ne!(before[0], after[0]);
        assert_eq!(&before[1..], &after[1..], "B and C keep identity");
        assert_eq!(doc.inner_html(root), "<p>X</p><li>B</li><li>C</li>");
    }

    #[test]
    fn children_grow_and_shrink_at_tail() {
        let (doc, rec) = setup();
        let root = doc.build("div", &[], &[]);
        let items = |n: usize| fragment((0..n).map(|i| text(i.to_string())));

        rec.patch(&root, &items(2));
        let first = doc.children(&root)[0];
        rec.patch(&root, &items(5));
        assert_eq!(doc.children(&root).len(), 5);
        rec.patch(&root, &items(1));
        assert_eq!(doc.children(&root), vec![first]);
    }

    #[test]
    fn empty_entries_keep_their_slot() {
        let (doc, rec) = setup();
        let root = doc.build("div", &[], &[]);
        rec.patch(&root, &fragment([text("a"), VNode::Empty, text("c")]));
        assert_eq!(doc.children(&root).len(), 3);
        let middle = doc.children(&root)[1];

        rec.patch(&root, &fragment([text("a"), VNode::Empty, text("d")]));
        assert_eq!(doc.children(&root)[1], middle);
        assert_eq!(doc.inner_html(root), "ad");
    }

    #[test]
    fn nested_fragments_flatten() {
        let (doc, rec) = setup();
        let root = doc.build("div", &[], &[]);
        rec.patch(
            &root,
            &fragment([text("a"), fragment([text("b"), fragment([text("c")])]), text("d")]),
        );
        assert_eq!(doc.children(&root).len(), 4);
        assert_eq!(doc.inner_html(root), "abcd");
    }

    #[test]
    fn style_merges_and_camel_case_converts() {
        let (doc, rec) = setup();
        let div = doc.build("div", &[], &[]);
        rec.patch(&div, &h("div").style("color", "red").build());
        rec.patch(&div, &h("div").style("backgroundColor", "blue").build());
        assert_eq!(doc.style(div, "color").as_deref(), Some("red"));
        assert_eq!(doc.style(div, "background-color").as_deref(), Some("blue"));
    }

    #[test]
    fn dataset_writes_data_attributes() {
        let (doc, rec) = setup();
        let div = doc.build("div", &[], &[]);
        rec.patch(&div, &h("div").data("userId", "7").build());
        assert_eq!(doc.attribute(&div, "data-user-id").as_deref(), Some("7"));
    }

    #[test]
    fn properties_and_attributes_are_routed() {
        let (doc, rec) = setup();
        let input = doc.build("input", &[("aria-label", "name")], &[]);
        rec.patch(
            &input,
            &h("input")
                .prop("value", "typed")
                .prop("disabled", true)
                .prop("aria-label", PropValue::Null)
                .prop("placeholder", 3)
                .build(),
        );
        assert_eq!(doc.property(input, "value"), Some("typed".into()));
        assert_eq!(doc.attribute(&input, "disabled").as_deref(), Some(""));
        assert_eq!(doc.attribute(&input, "aria-label"), None);
        assert_eq!(doc.attribute(&input, "placeholder").as_deref(), Some("3"));

        rec.patch(&input, &h("input").prop("hidden", false).prop("value", PropValue::Null).build());
        assert_eq!(doc.property(input, "value"), None);
    }

    #[test]
    fn ref_receives_live_node() {
        let (doc, rec) = setup();
        let root = doc.build("div", &[], &[]);
        let node_ref = NodeRef::new();
        rec.patch(&root, &fragment([h("input").node_ref(&node_ref).build()]));
        let input = node_ref.get::<MemNode>();
        assert_eq!(input, doc.children(&root).first().copied());
    }

    #[test]
    fn non_ref_value_under_ref_key_writes_nothing() {
        let (doc, rec) = setup();
        let root = doc.build("div", &[], &[]);
        rec.patch(&root, &fragment([h("input").prop("ref", "field").build()]));
        let input = doc.children(&root)[0];
        assert_eq!(doc.attribute(&input, "ref"), None);
        assert_eq!(doc.inner_html(root), "<input></input>");
        assert_eq!(doc.property(input, "ref"), None);
    }

    #[test]
    fn components_render_inline() {
        let (doc, rec) = setup();
        let root = doc.build("div", &[], &[]);
        let card = component("Card", |props, children| {
            let title = props
                .get("title")
                .and_then(PropValue::as_primitive)
                .map(|p| p.to_string())
                .unwrap_or_default();
            h("section").child(h("h2").child(title)).children(children.to_vec()).build()
        })
        .prop("title", "Hello")
        .child(text("body"))
        .build();

        rec.patch(&root, &fragment([card]));
        assert_eq!(doc.inner_html(root), "<section><h2>Hello</h2>body</section>");
    }

    #[test]
    fn panicking_component_is_isolated() {
        let (doc, rec) = setup();
        let root = doc.build("div", &[], &[]);
        let broken = component("Broken", |_, _| panic!("render exploded")).build();

        rec.patch(&root, &fragment([text("before"), broken, text("after")]));

        let html = doc.inner_html(root);
        assert!(html.starts_with("before[fdom error] component `Broken` panicked"));
        assert!(html.ends_with("after"));
        assert_eq!(doc.children(&root).len(), 3);
    }

    #[test]
    fn invalid_tag_becomes_placeholder() {
        let doc = MemoryDocument::new();
        let rec = Reconciler::with_config(doc.clone(), RenderConfig::default().placeholder_prefix("!"));
        let root = doc.build("div", &[], &[]);
        rec.patch(&root, &fragment([h("bad tag").build(), h("b").build()]));
        assert_eq!(doc.inner_html(root), "!invalid tag name \"bad tag\"<b></b>");
    }

    #[test]
    fn placeholders_can_be_disabled() {
        let doc = MemoryDocument::new();
        let rec = Reconciler::with_config(doc.clone(), RenderConfig::default().error_placeholders(false));
        let root = doc.build("div", &[], &[]);
        rec.patch(&root, &fragment([h("9").build()]));
        assert_eq!(doc.children(&root).len(), 1);
        assert_eq!(doc.inner_html(root), "");
    }

    #[test]
    fn replaced_subtree_drops_listener_entries() {
        let (doc, rec) = setup();
        let root = doc.build("div", &[], &[]);
        let (_, handler) = counter();
        rec.patch(&root, &fragment([h("div").child(h("button").handler("click", handler)).build()]));
        assert_eq!(rec.bound_node_count(), 1);

        rec.patch(&root, &fragment([h("span").build()]));
        assert_eq!(rec.bound_node_count(), 0);
    }

    #[test]
    fn client_marked_markup_is_rebuilt() {
        let (doc, rec) = setup();
        let server = doc.build("div", &[(CLIENT_ATTRIBUTE, "")], &[]);
        let root = doc.build("main", &[], &[server]);
        let result = rec.patch(&server, &h("div").prop("client", true).child("live").build());
        assert_ne!(result, server);
        assert_eq!(doc.inner_html(root), "<div>live</div>");
    }

    #[test]
    fn css_names() {
        assert_eq!(css_name("backgroundColor"), "background-color");
        assert_eq!(css_name("margin-top"), "margin-top");
    }

    fn label_tree(labels: &[u8]) -> VNode {
        fragment(labels.iter().map(|l| h("li").child(text(u32::from(*l))).build()))
    }

    proptest! {
        #[test]
        fn patch_converges_to_fresh_render(
            first in proptest::collection::vec(0_u8..5, 0..8),
            second in proptest::collection::vec(0_u8..5, 0..8),
        ) {
            let (doc, rec) = setup();
            let patched = doc.build("ul", &[], &[]);
            rec.patch(&patched, &label_tree(&first));
            rec.patch(&patched, &label_tree(&second));

            let fresh = doc.build("ul", &[], &[]);
            rec.patch(&fresh, &label_tree(&second));

            prop_assert_eq!(doc.inner_html(patched), doc.inner_html(fresh));
        }

        #[test]
        fn common_prefix_keeps_identity(
            first in proptest::collection::vec(0_u8..5, 1..8),
            second in proptest::collection::vec(0_u8..5, 1..8),
        ) {
            let (doc, rec) = setup();
            let root = doc.build("ul", &[], &[]);
            rec.patch(&root, &label_tree(&first));
            let before = doc.children(&root);
            rec.patch(&root, &label_tree(&second));
            let after = doc.children(&root);

            let common = first.len().min(second.len());
            prop_assert_eq!(&before[..common], &after[..common]);
        }
    }
}
