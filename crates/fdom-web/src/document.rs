#![forbid(unsafe_code)]

//! [`Document`] over the browser DOM.
//!
//! `web_sys` nodes compare by JS identity but do not hash, so each node
//! handed to the reconciler is tagged once with a numeric expando property
//! (`__fdomId`) that [`WebNode`] hashes on.
//!
//! Listeners are `Closure`s owned by the returned [`WebListener`]; dropping
//! the token after removal frees the closure.

use std::cell::Cell;
use std::fmt;
use std::hash::{Hash, Hasher};

use fdom_render::{Document, DomEvent, EventHandler, HostError, Primitive};
use js_sys::Reflect;
use tracing::warn;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};

const ID_KEY: &str = "__fdomId";

thread_local! {
    static NEXT_ID: Cell<u32> = const { Cell::new(1) };
}

fn host_error(err: &JsValue) -> HostError {
    HostError::new(err.as_string().unwrap_or_else(|| format!("{err:?}")))
}

/// Hashable handle to a DOM node.
#[derive(Clone)]
pub struct WebNode {
    node: web_sys::Node,
    id: u32,
}

impl WebNode {
    fn id_of(node: &web_sys::Node) -> u32 {
        let key = JsValue::from_str(ID_KEY);
        if let Some(id) = Reflect::get(node, &key).ok().and_then(|v| v.as_f64()) {
            return id as u32;
        }
        let id = NEXT_ID.with(|next| {
            let id = next.get();
            next.set(id.wrapping_add(1));
            id
        });
        if Reflect::set(node, &key, &JsValue::from(id)).is_err() {
            warn!("could not tag node with an id");
        }
        id
    }

    /// The underlying DOM node.
    pub fn node(&self) -> &web_sys::Node {
        &self.node
    }
}

impl From<web_sys::Node> for WebNode {
    fn from(node: web_sys::Node) -> Self {
        let id = Self::id_of(&node);
        Self { node, id }
    }
}

impl PartialEq for WebNode {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl Eq for WebNode {}

impl Hash for WebNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for WebNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebNode")
            .field("id", &self.id)
            .field("name", &self.node.node_name())
            .finish()
    }
}

/// Listener token owning the JS closure.
pub struct WebListener(Closure<dyn FnMut(web_sys::Event)>);

impl fmt::Debug for WebListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebListener(..)")
    }
}

/// The browser document.
#[derive(Clone, Debug)]
pub struct WebDocument {
    document: web_sys::Document,
}

impl WebDocument {
    pub fn new(document: web_sys::Document) -> Self {
        Self { document }
    }

    /// Document of the global window.
    pub fn from_window() -> Result<Self, HostError> {
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| HostError::new("no global document"))?;
        Ok(Self::new(document))
    }

    /// Element with the given `id`, as a reconciler node.
    pub fn element_by_id(&self, id: &str) -> Option<WebNode> {
        self.document
            .get_element_by_id(id)
            .map(|el| WebNode::from(web_sys::Node::from(el)))
    }

    fn element(node: &WebNode) -> Option<&web_sys::Element> {
        node.node.dyn_ref::<web_sys::Element>()
    }
}

fn to_dom_event(event: &web_sys::Event) -> DomEvent {
    let dom_event = DomEvent::new(event.type_());
    let Some(target) = event.target() else {
        return dom_event;
    };
    let value = if let Some(input) = target.dyn_ref::<web_sys::HtmlInputElement>() {
        Some(input.value())
    } else if let Some(area) = target.dyn_ref::<web_sys::HtmlTextAreaElement>() {
        Some(area.value())
    } else {
        target
            .dyn_ref::<web_sys::HtmlSelectElement>()
            .map(web_sys::HtmlSelectElement::value)
    };
    match value {
        Some(value) => dom_event.with_value(value),
        None => dom_event,
    }
}

impl Document for WebDocument {
    type Node = WebNode;
    type Listener = WebListener;

    fn create_element(&self, tag: &str) -> Result<WebNode, HostError> {
        self.document
            .create_element(tag)
            .map(|el| WebNode::from(web_sys::Node::from(el)))
            .map_err(|err| host_error(&err))
    }

    fn create_text(&self, text: &str) -> WebNode {
        WebNode::from(web_sys::Node::from(self.document.create_text_node(text)))
    }

    fn tag_name(&self, node: &WebNode) -> Option<String> {
        Self::element(node).map(|el| el.tag_name().to_ascii_lowercase())
    }

    fn text(&self, node: &WebNode) -> Option<String> {
        (node.node.node_type() == web_sys::Node::TEXT_NODE)
            .then(|| node.node.text_content().unwrap_or_default())
    }

    fn set_text(&self, node: &WebNode, text: &str) {
        node.node.set_text_content(Some(text));
    }

    fn attribute(&self, node: &WebNode, name: &str) -> Option<String> {
        Self::element(node)?.get_attribute(name)
    }

    fn set_attribute(&self, node: &WebNode, name: &str, value: &str) {
        let Some(el) = Self::element(node) else {
            return;
        };
        if let Err(err) = el.set_attribute(name, value) {
            warn!(attribute = name, error = ?err, "setAttribute failed");
        }
    }

    fn remove_attribute(&self, node: &WebNode, name: &str) {
        let Some(el) = Self::element(node) else {
            return;
        };
        if let Err(err) = el.remove_attribute(name) {
            warn!(attribute = name, error = ?err, "removeAttribute failed");
        }
    }

    fn has_property(&self, node: &WebNode, name: &str) -> bool {
        Self::element(node).is_some()
            && Reflect::has(&node.node, &JsValue::from_str(name)).unwrap_or(false)
    }

    fn set_property(&self, node: &WebNode, name: &str, value: Option<&Primitive>) {
        let value = match value {
            Some(Primitive::Str(s)) => JsValue::from_str(s),
            Some(Primitive::Number(n)) => JsValue::from_f64(*n),
            Some(Primitive::Bool(b)) => JsValue::from_bool(*b),
            None => JsValue::NULL,
        };
        if let Err(err) = Reflect::set(&node.node, &JsValue::from_str(name), &value) {
            warn!(property = name, error = ?err, "property assignment failed");
        }
    }

    fn set_style(&self, node: &WebNode, name: &str, value: &str) {
        let Some(el) = node.node.dyn_ref::<web_sys::HtmlElement>() else {
            return;
        };
        let style = el.style();
        let result = if value.is_empty() {
            style.remove_property(name).map(drop)
        } else {
            style.set_property(name, value)
        };
        if let Err(err) = result {
            warn!(style = name, error = ?err, "style update failed");
        }
    }

    fn children(&self, node: &WebNode) -> Vec<WebNode> {
        let list = node.node.child_nodes();
        (0..list.length())
            .filter_map(|i| list.get(i))
            .map(WebNode::from)
            .collect()
    }

    fn parent(&self, node: &WebNode) -> Option<WebNode> {
        node.node.parent_node().map(WebNode::from)
    }

    fn append_child(&self, parent: &WebNode, child: &WebNode) {
        if let Err(err) = parent.node.append_child(&child.node) {
            warn!(error = ?err, "appendChild failed");
        }
    }

    fn insert_before(&self, parent: &WebNode, child: &WebNode, reference: &WebNode) {
        let reference = reference
            .node
            .parent_node()
            .is_some_and(|p| p == parent.node)
            .then_some(&reference.node);
        if let Err(err) = parent.node.insert_before(&child.node, reference) {
            warn!(error = ?err, "insertBefore failed");
        }
    }

    fn replace_with(&self, old: &WebNode, new: &WebNode) {
        let Some(parent) = old.node.parent_node() else {
            return;
        };
        if let Err(err) = parent.replace_child(&new.node, &old.node) {
            warn!(error = ?err, "replaceChild failed");
        }
    }

    fn remove(&self, node: &WebNode) {
        let Some(parent) = node.node.parent_node() else {
            return;
        };
        if let Err(err) = parent.remove_child(&node.node) {
            warn!(error = ?err, "removeChild failed");
        }
    }

    fn add_event_listener(&self, node: &WebNode, event: &str, handler: EventHandler) -> WebListener {
        let closure = Closure::<dyn FnMut(web_sys::Event)>::new(move |event: web_sys::Event| {
            let dom_event = to_dom_event(&event);
            handler.call(&dom_event);
            if dom_event.default_prevented() {
                event.prevent_default();
            }
            if dom_event.propagation_stopped() {
                event.stop_propagation();
            }
        });
        if let Err(err) = node
            .node
            .add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())
        {
            warn!(event, error = ?err, "addEventListener failed");
        }
        WebListener(closure)
    }

    fn remove_event_listener(&self, node: &WebNode, event: &str, listener: WebListener) {
        if let Err(err) = node
            .node
            .remove_event_listener_with_callback(event, listener.0.as_ref().unchecked_ref())
        {
            warn!(event, error = ?err, "removeEventListener failed");
        }
    }
}
