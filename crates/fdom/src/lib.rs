#![forbid(unsafe_code)]

//! frankendom: a minimal reactive UI runtime.
//!
//! This crate provides:
//! - [`reactive`]: signals, effects, batching, and derived values bound to an
//!   explicit [`Runtime`]
//! - [`render`]: virtual nodes, the [`Document`] host contract, and the
//!   positional reconciler behind [`Renderer::mount`] and
//!   [`Renderer::hydrate`]
//! - [`web`]: the browser host (`wasm32` only)
//! - [`logging`]: one-call `tracing-subscriber` setup (feature `logging`)
//!
//! Most applications only need the [`prelude`].
//!
//! ```
//! use fdom::prelude::*;
//!
//! let host = ManualFrameHost::new();
//! let rt = Runtime::new(host.clone());
//! let doc = MemoryDocument::new();
//! let renderer = Renderer::new(&rt, doc.clone());
//! let root = doc.build("div", &[], &[]);
//!
//! let count = rt.signal(0);
//! let c = count.clone();
//! let _view = renderer.mount(&root, move || h("b").child(text(c.get())).build());
//!
//! count.set(3);
//! host.advance_frame();
//! assert_eq!(doc.inner_html(root), "<b>3</b>");
//! ```
//!
//! [`Runtime`]: reactive::Runtime
//! [`Document`]: render::Document
//! [`Renderer::mount`]: render::Renderer::mount
//! [`Renderer::hydrate`]: render::Renderer::hydrate

pub use fdom_reactive as reactive;
pub use fdom_render as render;
pub use fdom_web as web;

#[cfg(feature = "logging")]
pub mod logging;

/// Common imports.
pub mod prelude {
    #[cfg(feature = "deep")]
    pub use fdom_reactive::DeepSignal;
    pub use fdom_reactive::{
        BatchScope, Cleanup, Computed, Context, DepsEffect, DomEffect, Effect, FrameHost,
        ManualFrameHost, Memo, ReadSignal, Runtime, Signal, Store, Trigger, WriteSignal,
        create_signal,
    };
    pub use fdom_render::{
        ComponentRef, Document, DomEvent, EventHandler, Form, MemoryDocument, MountHandle, NodeRef,
        PropValue, Renderer, VNode, component, forward_ref, fragment, h, text, use_form,
    };

    #[cfg(feature = "logging")]
    pub use crate::logging::{LogConfig, init_logging};
}
