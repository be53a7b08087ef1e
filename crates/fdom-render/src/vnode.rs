#![forbid(unsafe_code)]

//! Virtual nodes: immutable descriptions of a UI tree.
//!
//! A [`VNode`] tree is produced fresh by every render pass and never mutated
//! in place. Cloning is cheap: element, component, and fragment payloads sit
//! behind `Rc`.
//!
//! Trees are usually built with the [`h`], [`text`], [`fragment`], and
//! [`component`] helpers:
//!
//! ```
//! use fdom_render::vnode::{h, text};
//!
//! let button = h("button")
//!     .class_name("btn")
//!     .on("click", |_| {})
//!     .child(text("Click"))
//!     .build();
//! assert_eq!(button.tag(), Some("button"));
//! ```
//!
//! # Props
//!
//! Props are an ordered map from name to [`PropValue`]. The reconciler
//! interprets a few names specially: `on*` keys holding a handler bind event
//! listeners, `style` and `dataset` hold maps, `className` writes the `class`
//! attribute, `ref` receives the live node, and `children` is ignored.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::document::DomEvent;

/// Ordered string map used by `style` and `dataset` props.
pub type PropMap = IndexMap<String, String, ahash::RandomState>;

/// Ordered prop map of an element or component.
pub type Props = IndexMap<String, PropValue, ahash::RandomState>;

/// Render function of a component.
pub type RenderFn = Rc<dyn Fn(&Props, &[VNode]) -> VNode>;

// ---------------------------------------------------------------------------
// Primitive
// ---------------------------------------------------------------------------

/// A text-like leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Str(String),
    Number(f64),
    Bool(bool),
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Number(n) => fmt_number(*n, f),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Integral numbers print without a fractional part (`3`, not `3.0`).
fn fmt_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

impl From<&str> for Primitive {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Primitive {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for Primitive {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Primitive {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

macro_rules! primitive_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Primitive {
                fn from(value: $ty) -> Self {
                    Self::Number(f64::from(value))
                }
            }
        )*
    };
}

primitive_from_int!(i8, i16, i32, u8, u16, u32, f32);

// ---------------------------------------------------------------------------
// EventHandler / NodeRef
// ---------------------------------------------------------------------------

/// A shared event callback. Equality is identity.
#[derive(Clone)]
pub struct EventHandler(Rc<dyn Fn(&DomEvent)>);

impl EventHandler {
    /// Wrap a callback.
    pub fn new(f: impl Fn(&DomEvent) + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Invoke the callback.
    pub fn call(&self, event: &DomEvent) {
        (self.0)(event);
    }

    /// Whether both handles wrap the same callback.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventHandler(..)")
    }
}

/// A cell the reconciler fills with the live node of the element carrying
/// it in its `ref` prop.
///
/// The node type is erased so the same virtual tree can target any
/// [`Document`](crate::Document); read it back with [`NodeRef::get`].
#[derive(Clone, Default)]
pub struct NodeRef(Rc<RefCell<Option<Box<dyn Any>>>>);

impl NodeRef {
    /// Create an empty ref.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The referenced node, if one of type `N` is stored.
    #[must_use]
    pub fn get<N: Clone + 'static>(&self) -> Option<N> {
        self.0.borrow().as_ref()?.downcast_ref::<N>().cloned()
    }

    /// Store `node`.
    pub fn set<N: 'static>(&self, node: N) {
        *self.0.borrow_mut() = Some(Box::new(node));
    }

    /// Whether a node is stored.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.borrow().is_some()
    }

    /// Clear the stored node.
    pub fn clear(&self) {
        self.0.borrow_mut().take();
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef").field("set", &self.is_set()).finish()
    }
}

/// An imperative handle a component exposes to its parent.
///
/// The parent creates the ref and passes it with [`forward_ref`]; the
/// component fills it during render with [`ComponentRef::on_function`].
/// Clones share one cell.
pub struct ComponentRef<T>(Rc<RefCell<Option<T>>>);

impl<T> ComponentRef<T> {
    /// Create an empty ref.
    #[must_use]
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(None)))
    }

    /// Store the value built by `create`, replacing any previous one.
    pub fn on_function(&self, create: impl FnOnce() -> T) {
        let value = create();
        *self.0.borrow_mut() = Some(value);
    }

    /// The current value.
    #[must_use]
    pub fn get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.0.borrow().clone()
    }

    /// Borrow the current value.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(self.0.borrow().as_ref())
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.borrow().is_some()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().take();
    }
}

impl<T> Clone for ComponentRef<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> Default for ComponentRef<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PartialEq for ComponentRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> fmt::Debug for ComponentRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRef").field("set", &self.is_set()).finish()
    }
}

// ---------------------------------------------------------------------------
// PropValue
// ---------------------------------------------------------------------------

/// Value of a single prop.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Str(String),
    Number(f64),
    Bool(bool),
    /// Event callback, bound when the key starts with `on`.
    Handler(EventHandler),
    /// Field map for `style` and `dataset`.
    Map(PropMap),
    /// Ref cell filled with the live node.
    Ref(NodeRef),
    Null,
}

impl PropValue {
    /// The scalar value, if this prop is a string, number, or boolean.
    #[must_use]
    pub fn as_primitive(&self) -> Option<Primitive> {
        match self {
            Self::Str(s) => Some(Primitive::Str(s.clone())),
            Self::Number(n) => Some(Primitive::Number(*n)),
            Self::Bool(b) => Some(Primitive::Bool(*b)),
            _ => None,
        }
    }

    /// Whether this value means "absent" for attribute purposes.
    #[must_use]
    pub fn is_falsy(&self) -> bool {
        matches!(self, Self::Null | Self::Bool(false))
    }
}

impl From<Primitive> for PropValue {
    fn from(value: Primitive) -> Self {
        match value {
            Primitive::Str(s) => Self::Str(s),
            Primitive::Number(n) => Self::Number(n),
            Primitive::Bool(b) => Self::Bool(b),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<u32> for PropValue {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<EventHandler> for PropValue {
    fn from(value: EventHandler) -> Self {
        Self::Handler(value)
    }
}

impl From<NodeRef> for PropValue {
    fn from(value: NodeRef) -> Self {
        Self::Ref(value)
    }
}

impl From<PropMap> for PropValue {
    fn from(value: PropMap) -> Self {
        Self::Map(value)
    }
}

impl<T: Into<PropValue>> From<Option<T>> for PropValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// VNode
// ---------------------------------------------------------------------------

/// Payload of [`VNode::Element`].
#[derive(Debug)]
pub struct ElementNode {
    pub tag: String,
    pub props: Props,
    pub children: Vec<VNode>,
}

/// Payload of [`VNode::Component`].
pub struct ComponentNode {
    /// Display name used in logs and errors.
    pub name: String,
    pub render: RenderFn,
    pub props: Props,
    pub children: Vec<VNode>,
}

impl ComponentNode {
    /// Invoke the render function with this node's props and children.
    #[must_use]
    pub fn render(&self) -> VNode {
        (self.render)(&self.props, &self.children)
    }
}

impl fmt::Debug for ComponentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentNode")
            .field("name", &self.name)
            .field("props", &self.props)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

/// A virtual node.
#[derive(Debug, Clone)]
pub enum VNode {
    Element(Rc<ElementNode>),
    Component(Rc<ComponentNode>),
    Fragment(Rc<[VNode]>),
    Text(Primitive),
    /// An empty slot (`null`/`undefined` in a child list).
    Empty,
}

impl VNode {
    /// Element node from parts.
    pub fn element(
        tag: impl Into<String>,
        props: Props,
        children: impl IntoIterator<Item = VNode>,
    ) -> Self {
        Self::Element(Rc::new(ElementNode {
            tag: tag.into(),
            props,
            children: children.into_iter().collect(),
        }))
    }

    /// Tag of an element node.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Element(el) => Some(&el.tag),
            _ => None,
        }
    }

    /// Whether this is an empty slot.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<Primitive> for VNode {
    fn from(value: Primitive) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for VNode {
    fn from(value: &str) -> Self {
        Self::Text(value.into())
    }
}

impl From<String> for VNode {
    fn from(value: String) -> Self {
        Self::Text(value.into())
    }
}

impl From<Vec<VNode>> for VNode {
    fn from(value: Vec<VNode>) -> Self {
        Self::Fragment(value.into())
    }
}

impl<T: Into<VNode>> From<Option<T>> for VNode {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

/// Text node.
pub fn text(value: impl Into<Primitive>) -> VNode {
    VNode::Text(value.into())
}

/// Fragment of children, flattened into the parent's child list.
pub fn fragment(children: impl IntoIterator<Item = VNode>) -> VNode {
    VNode::Fragment(children.into_iter().collect())
}

/// Start building an element.
pub fn h(tag: impl Into<String>) -> ElementBuilder {
    ElementBuilder {
        tag: tag.into(),
        props: Props::default(),
        children: Vec::new(),
    }
}

/// Start building a component node.
pub fn component(
    name: impl Into<String>,
    render: impl Fn(&Props, &[VNode]) -> VNode + 'static,
) -> ComponentBuilder {
    ComponentBuilder {
        name: name.into(),
        render: Rc::new(render),
        props: Props::default(),
        children: Vec::new(),
    }
}

/// Start building a component whose render function also receives an
/// imperative handle.
///
/// `handle` is the parent's ref; with `None` the component gets a fresh ref
/// nobody else observes.
pub fn forward_ref<T: 'static>(
    name: impl Into<String>,
    handle: Option<&ComponentRef<T>>,
    render: impl Fn(&Props, &[VNode], &ComponentRef<T>) -> VNode + 'static,
) -> ComponentBuilder {
    let handle = handle.cloned().unwrap_or_default();
    component(name, move |props, children| render(props, children, &handle))
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Builder returned by [`h`].
#[derive(Debug)]
#[must_use]
pub struct ElementBuilder {
    tag: String,
    props: Props,
    children: Vec<VNode>,
}

impl ElementBuilder {
    /// Set a prop.
    pub fn prop(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    /// Set the `className` prop.
    pub fn class_name(self, value: impl Into<String>) -> Self {
        self.prop("className", value.into())
    }

    /// Bind `f` to the `event` event (`"click"`, `"input"`, ...).
    pub fn on(self, event: &str, f: impl Fn(&DomEvent) + 'static) -> Self {
        self.handler(event, EventHandler::new(f))
    }

    /// Bind an existing handler to `event`.
    pub fn handler(self, event: &str, handler: EventHandler) -> Self {
        self.prop(format!("on{event}"), handler)
    }

    /// Set one `style` field (camelCase or kebab-case).
    pub fn style(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.map_entry("style", name.into(), value.into())
    }

    /// Set one `dataset` field, written as a `data-*` attribute.
    pub fn data(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.map_entry("dataset", name.into(), value.into())
    }

    fn map_entry(mut self, key: &str, name: String, value: String) -> Self {
        let slot = self
            .props
            .entry(key.to_owned())
            .or_insert_with(|| PropValue::Map(PropMap::default()));
        if !matches!(slot, PropValue::Map(_)) {
            *slot = PropValue::Map(PropMap::default());
        }
        if let PropValue::Map(map) = slot {
            map.insert(name, value);
        }
        self
    }

    /// Attach a ref filled with the live node.
    pub fn node_ref(self, node_ref: &NodeRef) -> Self {
        self.prop("ref", node_ref.clone())
    }

    /// Append a child.
    pub fn child(mut self, child: impl Into<VNode>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Append several children.
    pub fn children(mut self, children: impl IntoIterator<Item = VNode>) -> Self {
        self.children.extend(children);
        self
    }

    /// Finish the element.
    pub fn build(self) -> VNode {
        VNode::Element(Rc::new(ElementNode {
            tag: self.tag,
            props: self.props,
            children: self.children,
        }))
    }
}

impl From<ElementBuilder> for VNode {
    fn from(builder: ElementBuilder) -> Self {
        builder.build()
    }
}

/// Builder returned by [`component`].
#[must_use]
pub struct ComponentBuilder {
    name: String,
    render: RenderFn,
    props: Props,
    children: Vec<VNode>,
}

impl ComponentBuilder {
    /// Set a prop passed to the render function.
    pub fn prop(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    /// Append a child passed to the render function.
    pub fn child(mut self, child: impl Into<VNode>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Finish the component node.
    pub fn build(self) -> VNode {
        VNode::Component(Rc::new(ComponentNode {
            name: self.name,
            render: self.render,
            props: self.props,
            children: self.children,
        }))
    }
}

impl From<ComponentBuilder> for VNode {
    fn from(builder: ComponentBuilder) -> Self {
        builder.build()
    }
}

impl fmt::Debug for ComponentBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentBuilder")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
