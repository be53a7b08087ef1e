#![forbid(unsafe_code)]

//! In-memory [`Document`] implementation.
//!
//! [`MemoryDocument`] models the parts of a DOM the reconciler touches:
//! elements with ordered attributes, a small set of IDL properties, inline
//! styles, text nodes, parent/child links, and listeners with bubbling
//! dispatch. It stands in for a browser document in tests, benches, and
//! headless rendering.
//!
//! Nodes live in an arena and are never freed; a detached node keeps its
//! handle valid.
//!
//! # Properties
//!
//! `has_property` answers for a fixed set of names. `id`, `title`, `lang`,
//! `dir`, `hidden`, and `disabled` reflect to attributes; `value`,
//! `checked`, `selected`, and `indeterminate` do not.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use crate::document::{Document, DomEvent, HostError};
use crate::error::is_valid_tag;
use crate::vnode::{EventHandler, Primitive};

const REFLECTED_PROPERTIES: &[&str] = &["id", "title", "lang", "dir", "hidden", "disabled"];
const INTERNAL_PROPERTIES: &[&str] = &["value", "checked", "selected", "indeterminate"];

type FastMap<K, V> = IndexMap<K, V, ahash::RandomState>;

/// Handle to a node of a [`MemoryDocument`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct MemNode(usize);

/// Listener token of a [`MemoryDocument`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct MemListener(u64);

enum NodeKind {
    Element {
        tag: String,
        attributes: FastMap<String, String>,
        properties: FastMap<String, Primitive>,
        style: FastMap<String, String>,
    },
    Text(String),
}

struct NodeData {
    kind: NodeKind,
    parent: Option<MemNode>,
    children: Vec<MemNode>,
    listeners: Vec<(MemListener, String, EventHandler)>,
}

#[derive(Default)]
struct Arena {
    nodes: Vec<NodeData>,
    next_listener: u64,
}

impl Arena {
    fn push(&mut self, kind: NodeKind) -> MemNode {
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
            listeners: Vec::new(),
        });
        MemNode(self.nodes.len() - 1)
    }

    fn get(&self, node: MemNode) -> Option<&NodeData> {
        self.nodes.get(node.0)
    }

    fn get_mut(&mut self, node: MemNode) -> Option<&mut NodeData> {
        self.nodes.get_mut(node.0)
    }

    fn detach(&mut self, node: MemNode) {
        let Some(parent) = self.get_mut(node).and_then(|data| data.parent.take()) else {
            return;
        };
        if let Some(data) = self.get_mut(parent) {
            data.children.retain(|child| *child != node);
        }
    }

    fn element_mut(
        &mut self,
        node: MemNode,
    ) -> Option<(
        &mut FastMap<String, String>,
        &mut FastMap<String, Primitive>,
        &mut FastMap<String, String>,
    )> {
        match &mut self.get_mut(node)?.kind {
            NodeKind::Element {
                attributes,
                properties,
                style,
                ..
            } => Some((attributes, properties, style)),
            NodeKind::Text(_) => None,
        }
    }
}

/// A shared, in-memory document tree.
///
/// Cloning yields another handle to the same tree.
#[derive(Clone, Default)]
pub struct MemoryDocument {
    arena: Rc<RefCell<Arena>>,
}

impl MemoryDocument {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an element with attributes and children, as server-produced
    /// markup would arrive.
    ///
    /// # Panics
    ///
    /// Panics if `tag` is not a valid element name.
    pub fn build(&self, tag: &str, attributes: &[(&str, &str)], children: &[MemNode]) -> MemNode {
        assert!(is_valid_tag(tag), "invalid tag {tag:?}");
        let node = self.arena.borrow_mut().push(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attributes: attributes
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            properties: FastMap::default(),
            style: FastMap::default(),
        });
        for child in children {
            self.append_child(&node, child);
        }
        node
    }

    /// Current value of an IDL property.
    #[must_use]
    pub fn property(&self, node: MemNode, name: &str) -> Option<Primitive> {
        match &self.arena.borrow().get(node)?.kind {
            NodeKind::Element { properties, .. } => properties.get(name).cloned(),
            NodeKind::Text(_) => None,
        }
    }

    /// Current value of an inline style declaration.
    #[must_use]
    pub fn style(&self, node: MemNode, name: &str) -> Option<String> {
        match &self.arena.borrow().get(node)?.kind {
            NodeKind::Element { style, .. } => style.get(name).cloned(),
            NodeKind::Text(_) => None,
        }
    }

    /// Number of listeners attached to `node`.
    #[must_use]
    pub fn listener_count(&self, node: MemNode) -> usize {
        self.arena
            .borrow()
            .get(node)
            .map_or(0, |data| data.listeners.len())
    }

    /// Total number of nodes ever created.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.arena.borrow().nodes.len()
    }

    /// Deliver `event` to `target` and then to its ancestors, until a
    /// handler stops propagation.
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch(&self, target: MemNode, event: &DomEvent) -> usize {
        let mut invoked = 0;
        let mut current = Some(target);
        while let Some(node) = current {
            // Handlers may touch the document; release the borrow first.
            let (handlers, parent) = {
                let arena = self.arena.borrow();
                let Some(data) = arena.get(node) else { break };
                let handlers: Vec<EventHandler> = data
                    .listeners
                    .iter()
                    .filter(|(_, kind, _)| kind == event.kind())
                    .map(|(_, _, handler)| handler.clone())
                    .collect();
                (handlers, data.parent)
            };
            for handler in handlers {
                handler.call(event);
                invoked += 1;
            }
            if event.propagation_stopped() {
                break;
            }
            current = parent;
        }
        trace!(kind = event.kind(), invoked, "event dispatched");
        invoked
    }

    /// Dispatch a `click` event to `target`.
    pub fn click(&self, target: MemNode) -> usize {
        self.dispatch(target, &DomEvent::new("click"))
    }

    /// Serialize `node` and its subtree as HTML.
    #[must_use]
    pub fn outer_html(&self, node: MemNode) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    /// Serialize the children of `node` as HTML.
    #[must_use]
    pub fn inner_html(&self, node: MemNode) -> String {
        let mut out = String::new();
        for child in self.children(&node) {
            self.write_html(child, &mut out);
        }
        out
    }

    fn write_html(&self, node: MemNode, out: &mut String) {
        let children = {
            let arena = self.arena.borrow();
            let Some(data) = arena.get(node) else { return };
            match &data.kind {
                NodeKind::Text(text) => {
                    escape_into(text, false, out);
                    return;
                }
                NodeKind::Element {
                    tag,
                    attributes,
                    style,
                    ..
                } => {
                    out.push('<');
                    out.push_str(tag);
                    for (name, value) in attributes {
                        if name == "style" && !style.is_empty() {
                            continue;
                        }
                        out.push(' ');
                        out.push_str(name);
                        out.push_str("=\"");
                        escape_into(value, true, out);
                        out.push('"');
                    }
                    if !style.is_empty() {
                        let declarations: Vec<String> =
                            style.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                        out.push_str(" style=\"");
                        escape_into(&declarations.join("; "), true, out);
                        out.push('"');
                    }
                    out.push('>');
                }
            }
            data.children.clone()
        };
        for child in children {
            self.write_html(child, out);
        }
        if let Some(tag) = self.tag_name(&node) {
            out.push_str("</");
            out.push_str(&tag);
            out.push('>');
        }
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

impl fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDocument")
            .field("nodes", &self.node_count())
            .finish()
    }
}

impl Document for MemoryDocument {
    type Node = MemNode;
    type Listener = MemListener;

    fn create_element(&self, tag: &str) -> Result<MemNode, HostError> {
        if !is_valid_tag(tag) {
            return Err(HostError::new(format!("invalid element name {tag:?}")));
        }
        Ok(self.arena.borrow_mut().push(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attributes: FastMap::default(),
            properties: FastMap::default(),
            style: FastMap::default(),
        }))
    }

    fn create_text(&self, text: &str) -> MemNode {
        self.arena
            .borrow_mut()
            .push(NodeKind::Text(text.to_owned()))
    }

    fn tag_name(&self, node: &MemNode) -> Option<String> {
        match &self.arena.borrow().get(*node)?.kind {
            NodeKind::Element { tag, .. } => Some(tag.clone()),
            NodeKind::Text(_) => None,
        }
    }

    fn text(&self, node: &MemNode) -> Option<String> {
        match &self.arena.borrow().get(*node)?.kind {
            NodeKind::Text(text) => Some(text.clone()),
            NodeKind::Element { .. } => None,
        }
    }

    fn set_text(&self, node: &MemNode, text: &str) {
        if let Some(NodeData {
            kind: NodeKind::Text(current),
            ..
        }) = self.arena.borrow_mut().get_mut(*node)
        {
            text.clone_into(current);
        }
    }

    fn attribute(&self, node: &MemNode, name: &str) -> Option<String> {
        match &self.arena.borrow().get(*node)?.kind {
            NodeKind::Element { attributes, .. } => attributes.get(name).cloned(),
            NodeKind::Text(_) => None,
        }
    }

    fn set_attribute(&self, node: &MemNode, name: &str, value: &str) {
        if let Some((attributes, _, _)) = self.arena.borrow_mut().element_mut(*node) {
            attributes.insert(name.to_owned(), value.to_owned());
        }
    }

    fn remove_attribute(&self, node: &MemNode, name: &str) {
        if let Some((attributes, _, _)) = self.arena.borrow_mut().element_mut(*node) {
            attributes.shift_remove(name);
        }
    }

    fn has_property(&self, node: &MemNode, name: &str) -> bool {
        self.tag_name(node).is_some()
            && (REFLECTED_PROPERTIES.contains(&name) || INTERNAL_PROPERTIES.contains(&name))
    }

    fn set_property(&self, node: &MemNode, name: &str, value: Option<&Primitive>) {
        let mut arena = self.arena.borrow_mut();
        let Some((attributes, properties, _)) = arena.element_mut(*node) else {
            return;
        };
        match value {
            Some(value) => {
                properties.insert(name.to_owned(), value.clone());
            }
            None => {
                properties.shift_remove(name);
            }
        }
        if REFLECTED_PROPERTIES.contains(&name) {
            match value {
                None | Some(Primitive::Bool(false)) => {
                    attributes.shift_remove(name);
                }
                Some(Primitive::Bool(true)) => {
                    attributes.insert(name.to_owned(), String::new());
                }
                Some(other) => {
                    attributes.insert(name.to_owned(), other.to_string());
                }
            }
        }
    }

    fn set_style(&self, node: &MemNode, name: &str, value: &str) {
        if let Some((_, _, style)) = self.arena.borrow_mut().element_mut(*node) {
            if value.is_empty() {
                style.shift_remove(name);
            } else {
                style.insert(name.to_owned(), value.to_owned());
            }
        }
    }

    fn children(&self, node: &MemNode) -> Vec<MemNode> {
        self.arena
            .borrow()
            .get(*node)
            .map(|data| data.children.clone())
            .unwrap_or_default()
    }

    fn parent(&self, node: &MemNode) -> Option<MemNode> {
        self.arena.borrow().get(*node)?.parent
    }

    fn append_child(&self, parent: &MemNode, child: &MemNode) {
        let mut arena = self.arena.borrow_mut();
        if arena.get(*parent).is_none() || arena.get(*child).is_none() {
            return;
        }
        arena.detach(*child);
        if let Some(data) = arena.get_mut(*child) {
            data.parent = Some(*parent);
        }
        if let Some(data) = arena.get_mut(*parent) {
            data.children.push(*child);
        }
    }

    fn insert_before(&self, parent: &MemNode, child: &MemNode, reference: &MemNode) {
        let mut arena = self.arena.borrow_mut();
        if arena.get(*parent).is_none() || arena.get(*child).is_none() || child == reference {
            return;
        }
        arena.detach(*child);
        if let Some(data) = arena.get_mut(*child) {
            data.parent = Some(*parent);
        }
        if let Some(data) = arena.get_mut(*parent) {
            match data.children.iter().position(|c| c == reference) {
                Some(position) => data.children.insert(position, *child),
                None => data.children.push(*child),
            }
        }
    }

    fn replace_with(&self, old: &MemNode, new: &MemNode) {
        let mut arena = self.arena.borrow_mut();
        let Some(parent) = arena.get(*old).and_then(|data| data.parent) else {
            return;
        };
        arena.detach(*new);
        let Some(position) = arena
            .get(parent)
            .and_then(|data| data.children.iter().position(|c| c == old))
        else {
            return;
        };
        if let Some(data) = arena.get_mut(parent) {
            data.children[position] = *new;
        }
        if let Some(data) = arena.get_mut(*old) {
            data.parent = None;
        }
        if let Some(data) = arena.get_mut(*new) {
            data.parent = Some(parent);
        }
    }

    fn remove(&self, node: &MemNode) {
        self.arena.borrow_mut().detach(*node);
    }

    fn add_event_listener(&self, node: &MemNode, event: &str, handler: EventHandler) -> MemListener {
        let mut arena = self.arena.borrow_mut();
        arena.next_listener += 1;
        let id = MemListener(arena.next_listener);
        if let Some(data) = arena.get_mut(*node) {
            data.listeners.push((id, event.to_owned(), handler));
        }
        id
    }

    fn remove_event_listener(&self, node: &MemNode, _event: &str, listener: MemListener) {
        if let Some(data) = self.arena.borrow_mut().get_mut(*node) {
            data.listeners.retain(|(id, _, _)| *id != listener);
        }
    }
}
