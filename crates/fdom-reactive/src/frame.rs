#![forbid(unsafe_code)]

//! Paint-timing host abstraction.
//!
//! The scheduler never runs effects synchronously from a signal write. It
//! asks the [`FrameHost`] for the next paint boundary and, from inside that
//! frame callback, queues a microtask that drains the pending effects. DOM
//! writes therefore land before paint but after the current synchronous
//! script has finished.
//!
//! [`ManualFrameHost`] is a deterministic host for tests and headless
//! drivers: nothing runs until the owner calls [`ManualFrameHost::advance_frame`]
//! or [`ManualFrameHost::run_microtasks`].

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// A deferred unit of host work.
pub type Task = Box<dyn FnOnce()>;

/// Host hooks for paint-aligned scheduling.
pub trait FrameHost {
    /// Run `task` at the next paint boundary (`requestAnimationFrame`).
    fn request_frame(&self, task: Task);

    /// Run `task` once the current task finishes (`queueMicrotask`).
    fn queue_microtask(&self, task: Task);
}

/// A frame host driven explicitly by its owner.
///
/// Frame callbacks run in request order; the microtask queue is drained after
/// each frame callback, mirroring browser event-loop ordering.
#[derive(Default)]
pub struct ManualFrameHost {
    frames: RefCell<VecDeque<Task>>,
    microtasks: RefCell<VecDeque<Task>>,
    frames_elapsed: Cell<u64>,
}

impl ManualFrameHost {
    /// Create a shareable manual host.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Number of frame callbacks waiting for the next frame.
    #[must_use]
    pub fn pending_frames(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Number of queued microtasks.
    #[must_use]
    pub fn pending_microtasks(&self) -> usize {
        self.microtasks.borrow().len()
    }

    /// Number of frames advanced so far.
    #[must_use]
    pub fn frames_elapsed(&self) -> u64 {
        self.frames_elapsed.get()
    }

    /// Drain the microtask queue, including microtasks queued while draining.
    ///
    /// Returns the number of microtasks run.
    pub fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            // The borrow must end before the task runs: tasks enqueue more tasks.
            let next = self.microtasks.borrow_mut().pop_front();
            let Some(task) = next else { break };
            task();
            ran += 1;
        }
        ran
    }

    /// Advance one frame: run every frame callback requested before this
    /// call, draining microtasks after each one.
    ///
    /// Callbacks requested while the frame runs wait for the next frame.
    /// Returns the number of tasks (frame callbacks plus microtasks) run.
    pub fn advance_frame(&self) -> usize {
        let due: Vec<Task> = self.frames.borrow_mut().drain(..).collect();
        self.frames_elapsed.set(self.frames_elapsed.get() + 1);
        let mut ran = self.run_microtasks();
        for task in due {
            task();
            ran += 1 + self.run_microtasks();
        }
        ran
    }
}

impl FrameHost for ManualFrameHost {
    fn request_frame(&self, task: Task) {
        self.frames.borrow_mut().push_back(task);
    }

    fn queue_microtask(&self, task: Task) {
        self.microtasks.borrow_mut().push_back(task);
    }
}

impl fmt::Debug for ManualFrameHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualFrameHost")
            .field("pending_frames", &self.pending_frames())
            .field("pending_microtasks", &self.pending_microtasks())
            .field("frames_elapsed", &self.frames_elapsed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_tasks_wait_for_advance() {
        let host = ManualFrameHost::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        host.request_frame(Box::new(move || h.set(h.get() + 1)));

        assert_eq!(hits.get(), 0);
        assert_eq!(host.pending_frames(), 1);
        assert_eq!(host.advance_frame(), 1);
        assert_eq!(hits.get(), 1);
        assert_eq!(host.frames_elapsed(), 1);
    }

    #[test]
    fn microtasks_queued_by_frame_run_in_same_frame() {
        let host = ManualFrameHost::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let h = Rc::clone(&host);
        let o = Rc::clone(&order);
        host.request_frame(Box::new(move || {
            o.borrow_mut().push("frame");
            let o2 = Rc::clone(&o);
            h.queue_microtask(Box::new(move || o2.borrow_mut().push("microtask")));
        }));

        host.advance_frame();
        assert_eq!(*order.borrow(), vec!["frame", "microtask"]);
        assert_eq!(host.pending_microtasks(), 0);
    }

    #[test]
    fn frames_requested_during_frame_are_deferred() {
        let host = ManualFrameHost::new();
        let hits = Rc::new(Cell::new(0));

        let h = Rc::clone(&host);
        let c = Rc::clone(&hits);
        host.request_frame(Box::new(move || {
            c.set(c.get() + 1);
            let c2 = Rc::clone(&c);
            h.request_frame(Box::new(move || c2.set(c2.get() + 10)));
        }));

        host.advance_frame();
        assert_eq!(hits.get(), 1);
        assert_eq!(host.pending_frames(), 1);
        host.advance_frame();
        assert_eq!(hits.get(), 11);
    }

    #[test]
    fn debug_format_reports_queues() {
        let host = ManualFrameHost::new();
        host.queue_microtask(Box::new(|| {}));
        let debug = format!("{host:?}");
        assert!(debug.contains("pending_microtasks: 1"));
    }
}
