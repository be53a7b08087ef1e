#![forbid(unsafe_code)]

//! `requestAnimationFrame` + `queueMicrotask` scheduling.
//!
//! A frame request the browser refuses is not dropped: the task runs on a
//! microtask instead, so a pending flush is never lost.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use fdom_reactive::{FrameHost, Task};
use fdom_render::HostError;
use tracing::warn;
use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;

/// Frame host backed by the browser event loop.
#[derive(Debug, Clone)]
pub struct WebFrameHost {
    window: web_sys::Window,
}

impl WebFrameHost {
    /// Host for the global window.
    pub fn new() -> Result<Self, HostError> {
        let window = web_sys::window().ok_or_else(|| HostError::new("no global window"))?;
        Ok(Self { window })
    }
}

impl FrameHost for WebFrameHost {
    fn request_frame(&self, task: Task) {
        request_or_fallback(
            task,
            |deferred| {
                let callback = Closure::once_into_js(move |_timestamp: f64| deferred());
                self.window
                    .request_animation_frame(callback.unchecked_ref())
                    .map(drop)
            },
            |task| self.queue_microtask(task),
        );
    }

    fn queue_microtask(&self, task: Task) {
        let callback = Closure::once_into_js(move || task());
        self.window.queue_microtask(callback.unchecked_ref());
    }
}

/// Hand `task` to `request`. When `request` fails, the task goes to
/// `fallback` instead; it runs at most once either way.
fn request_or_fallback<E: fmt::Debug>(
    task: Task,
    request: impl FnOnce(Task) -> Result<(), E>,
    fallback: impl FnOnce(Task),
) {
    let slot: Rc<Cell<Option<Task>>> = Rc::new(Cell::new(Some(task)));
    let pending = Rc::clone(&slot);
    let deferred: Task = Box::new(move || {
        if let Some(task) = pending.take() {
            task();
        }
    });
    if let Err(err) = request(deferred) {
        warn!(error = ?err, "requestAnimationFrame failed; running the frame on a microtask");
        if let Some(task) = slot.take() {
            fallback(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use wasm_bindgen_test::wasm_bindgen_test;

    use super::*;

    fn counted() -> (Rc<Cell<usize>>, Task) {
        let runs = Rc::new(Cell::new(0));
        let r = Rc::clone(&runs);
        (runs, Box::new(move || r.set(r.get() + 1)))
    }

    #[wasm_bindgen_test]
    fn refused_frame_runs_on_fallback() {
        let (runs, task) = counted();
        let fallbacks = Rc::new(Cell::new(0));
        let f = Rc::clone(&fallbacks);
        request_or_fallback(
            task,
            |_deferred| Err("blocked"),
            |task| {
                f.set(f.get() + 1);
                task();
            },
        );
        assert_eq!(fallbacks.get(), 1);
        assert_eq!(runs.get(), 1);
    }

    #[wasm_bindgen_test]
    fn granted_frame_skips_fallback() {
        let (runs, task) = counted();
        let held: Rc<RefCell<Option<Task>>> = Rc::new(RefCell::new(None));
        let h = Rc::clone(&held);
        request_or_fallback(
            task,
            |deferred| {
                *h.borrow_mut() = Some(deferred);
                Ok::<(), &str>(())
            },
            |_task| panic!("fallback must not run"),
        );
        assert_eq!(runs.get(), 0, "waits for the frame");
        if let Some(deferred) = held.borrow_mut().take() {
            deferred();
        }
        assert_eq!(runs.get(), 1);
    }

    #[wasm_bindgen_test]
    fn callback_after_refusal_is_a_no_op() {
        let (runs, task) = counted();
        let held: Rc<RefCell<Option<Task>>> = Rc::new(RefCell::new(None));
        let h = Rc::clone(&held);
        request_or_fallback(
            task,
            |deferred| {
                *h.borrow_mut() = Some(deferred);
                Err("late failure")
            },
            |task| task(),
        );
        if let Some(deferred) = held.borrow_mut().take() {
            deferred();
        }
        assert_eq!(runs.get(), 1);
    }
}
