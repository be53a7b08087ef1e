#![forbid(unsafe_code)]

//! Browser host for frankendom.
//!
//! This crate provides, on `wasm32` targets:
//! - [`WebDocument`], a [`Document`](fdom_render::Document) over `web_sys`
//!   nodes
//! - [`WebFrameHost`], a [`FrameHost`](fdom_reactive::FrameHost) driven by
//!   `requestAnimationFrame` and `queueMicrotask`
//! - [`renderer`], which wires both into a ready [`Renderer`](fdom_render::Renderer)
//!
//! On other targets the crate is empty.

#[cfg(target_arch = "wasm32")]
mod document;
#[cfg(target_arch = "wasm32")]
mod frame;

#[cfg(target_arch = "wasm32")]
pub use document::{WebDocument, WebListener, WebNode};
#[cfg(target_arch = "wasm32")]
pub use frame::WebFrameHost;

/// Build a client runtime and renderer for the current window.
#[cfg(target_arch = "wasm32")]
pub fn renderer() -> Result<fdom_render::Renderer<WebDocument>, fdom_render::HostError> {
    let host = std::rc::Rc::new(WebFrameHost::new()?);
    let runtime = fdom_reactive::Runtime::new(host);
    Ok(fdom_render::Renderer::new(&runtime, WebDocument::from_window()?))
}
