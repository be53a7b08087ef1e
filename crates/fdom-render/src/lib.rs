#![forbid(unsafe_code)]

//! Virtual nodes, the host document contract, and a positional reconciler.
//!
//! This crate provides:
//! - [`VNode`] and its builders ([`h`], [`text`], [`fragment`], [`component`])
//! - [`Document`], the contract a live tree implements, with
//!   [`MemoryDocument`] as an in-process implementation
//! - [`Reconciler`], which patches live nodes to match virtual nodes
//! - [`Renderer`], which wires a view function to a container through a
//!   render effect ([`Renderer::mount`], [`Renderer::hydrate`])
//! - [`Form`] and [`ComponentRef`] for forms and imperative component
//!   handles

pub mod document;
pub mod error;
pub mod form;
pub mod memory;
pub mod reconcile;
pub mod render;
mod scope;
#[cfg(feature = "serde")]
pub mod serialize;
pub mod vnode;

pub use document::{Document, DomEvent, HostError};
pub use error::ReconcileError;
pub use form::{Form, FormValues, use_form};
pub use memory::{MemListener, MemNode, MemoryDocument};
pub use reconcile::{CLIENT_ATTRIBUTE, Reconciler, RenderConfig};
pub use render::{MountHandle, Renderer};
#[cfg(feature = "serde")]
pub use serialize::to_json;
pub use vnode::{
    ComponentNode, ComponentRef, ElementNode, EventHandler, NodeRef, Primitive, PropMap,
    PropValue, Props, RenderFn, VNode, component, forward_ref, fragment, h, text,
};
