//! Shared fixtures for the end-to-end tests.

#![allow(dead_code)]

use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};

use fdom::prelude::*;

pub struct Client {
    pub rt: Runtime,
    pub host: Rc<ManualFrameHost>,
    pub doc: MemoryDocument,
    pub renderer: Renderer<MemoryDocument>,
}

/// A runtime on a manual frame host rendering into a fresh memory document.
pub fn client() -> Client {
    let host = ManualFrameHost::new();
    let rt = Runtime::new(host.clone());
    let doc = MemoryDocument::new();
    let renderer = Renderer::new(&rt, doc.clone());
    Client {
        rt,
        host,
        doc,
        renderer,
    }
}

#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a thread-local subscriber and return everything it logged.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let buffer = Buffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    let bytes = buffer
        .0
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    (out, String::from_utf8_lossy(&bytes).into_owned())
}
