#![forbid(unsafe_code)]

//! Value-less change notifications.

use std::fmt;

use crate::runtime::Runtime;
use crate::signal::Source;

/// A signal without a value: `track` subscribes, `notify` schedules every
/// subscriber unconditionally.
///
/// Useful when the changed state lives outside the reactive graph, such as
/// a mutable buffer owned by the caller.
#[derive(Clone)]
pub struct Trigger {
    source: Source,
}

impl Trigger {
    /// Create a trigger owned by `runtime`.
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            source: Source::new(runtime),
        }
    }

    /// Subscribe the running effect.
    pub fn track(&self) {
        self.source.track();
    }

    /// Schedule every subscriber.
    pub fn notify(&self) {
        self.source.notify();
    }

    /// Number of effects currently subscribed.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.source.subscriber_count()
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl Runtime {
    /// Create a trigger owned by this runtime.
    pub fn trigger(&self) -> Trigger {
        Trigger::new(self)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::frame::ManualFrameHost;

    #[test]
    fn notify_reruns_trackers() {
        let host = ManualFrameHost::new();
        let rt = Runtime::new(host.clone());
        let log = Rc::new(RefCell::new(Vec::new()));
        let trigger = rt.trigger();
        let lengths = Rc::new(Cell::new(0));

        let (t, l, n) = (trigger.clone(), Rc::clone(&log), Rc::clone(&lengths));
        let _effect = rt.create_effect(move || {
            t.track();
            n.set(l.borrow().len());
        });
        assert_eq!(trigger.subscriber_count(), 1);

        log.borrow_mut().push("entry");
        trigger.notify();
        host.advance_frame();
        assert_eq!(lengths.get(), 1);
    }

    #[test]
    fn server_notify_is_inert() {
        let rt = Runtime::server();
        let trigger = rt.trigger();
        trigger.notify();
        assert_eq!(rt.pending_count(), 0);
    }
}
