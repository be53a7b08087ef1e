#![forbid(unsafe_code)]

//! The host document contract.
//!
//! The reconciler only talks to the live tree through [`Document`]. A
//! browser implementation lives in `fdom-web`; [`MemoryDocument`] is an
//! in-process implementation for tests and headless rendering.
//!
//! Node handles are cheap, comparable identities. Two handles compare equal
//! exactly when they address the same live node, which is what the
//! reconciler's identity guarantees are stated in terms of.
//!
//! [`MemoryDocument`]: crate::MemoryDocument

use std::cell::Cell;
use std::fmt;
use std::hash::Hash;

use crate::vnode::{EventHandler, Primitive};

/// Failure reported by the host while creating nodes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("host document error: {message}")]
pub struct HostError {
    pub message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An event delivered to an [`EventHandler`].
#[derive(Debug)]
pub struct DomEvent {
    kind: String,
    value: Option<String>,
    default_prevented: Cell<bool>,
    propagation_stopped: Cell<bool>,
}

impl DomEvent {
    /// A new event of type `kind` (`"click"`, `"input"`, ...).
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: None,
            default_prevented: Cell::new(false),
            propagation_stopped: Cell::new(false),
        }
    }

    /// Attach the current value of the event target (form controls).
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Event type.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Value of the event target, when the host provides one.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    #[must_use]
    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    /// Stop the event from reaching ancestor listeners.
    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }

    #[must_use]
    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }
}

/// Operations the reconciler needs from a live document tree.
///
/// All methods take `&self`: documents are shared handles with interior
/// mutability, like the browser DOM they model.
pub trait Document {
    /// Handle to a live node.
    type Node: Clone + Eq + Hash + fmt::Debug + 'static;
    /// Token returned when a listener is attached, used to detach it.
    type Listener;

    /// Create a detached element.
    fn create_element(&self, tag: &str) -> Result<Self::Node, HostError>;

    /// Create a detached text node.
    fn create_text(&self, text: &str) -> Self::Node;

    /// Tag name of an element node; `None` for non-elements.
    fn tag_name(&self, node: &Self::Node) -> Option<String>;

    /// Content of a text node; `None` for non-text nodes.
    fn text(&self, node: &Self::Node) -> Option<String>;

    /// Replace the content of a text node.
    fn set_text(&self, node: &Self::Node, text: &str);

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;

    fn set_attribute(&self, node: &Self::Node, name: &str, value: &str);

    fn remove_attribute(&self, node: &Self::Node, name: &str);

    /// Whether `name` is an assignable property of the node (as opposed to
    /// a plain attribute).
    fn has_property(&self, node: &Self::Node, name: &str) -> bool;

    /// Assign a property; `None` resets it.
    fn set_property(&self, node: &Self::Node, name: &str, value: Option<&Primitive>);

    /// Set one inline style declaration (`name` is a CSS property name).
    fn set_style(&self, node: &Self::Node, name: &str, value: &str);

    /// Child nodes in order.
    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;

    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

    /// Append `child` as the last child of `parent`, detaching it first.
    fn append_child(&self, parent: &Self::Node, child: &Self::Node);

    /// Insert `child` into `parent` right before `reference`, detaching it
    /// first. Appends when `reference` is not a child of `parent`.
    fn insert_before(&self, parent: &Self::Node, child: &Self::Node, reference: &Self::Node);

    /// Put `new` at the position of `old`; `old` ends up detached.
    fn replace_with(&self, old: &Self::Node, new: &Self::Node);

    /// Detach `node` from its parent.
    fn remove(&self, node: &Self::Node);

    fn add_event_listener(
        &self,
        node: &Self::Node,
        event: &str,
        handler: EventHandler,
    ) -> Self::Listener;

    fn remove_event_listener(&self, node: &Self::Node, event: &str, listener: Self::Listener);
}
