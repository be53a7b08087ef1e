#![forbid(unsafe_code)]

//! Form state bound to input events.
//!
//! A [`Form`] keeps every field value in one signal, so a view reading
//! [`Form::values`] re-renders on any field change while a view reading
//! [`Form::value`] still re-renders only through that signal.
//!
//! - [`Form::handle_change`] merges one field into the current values.
//! - [`Form::bind`] returns a handler that copies the event target's value
//!   into a field (`oninput`, `onchange`).
//! - [`Form::handle_submit`] returns a handler that prevents the default
//!   action and passes a snapshot of the values to a callback.
//!
//! ```
//! use fdom_reactive::Runtime;
//! use fdom_render::{DomEvent, use_form};
//!
//! let rt = Runtime::server();
//! let form = use_form(&rt, [("name", "")]);
//! form.handle_change("name", "ana");
//! let submit = form.handle_submit(|values| assert_eq!(values["name"], "ana"));
//! let event = DomEvent::new("submit");
//! submit.call(&event);
//! assert!(event.default_prevented());
//! ```

use std::fmt;

use fdom_reactive::{Runtime, Signal};
use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::vnode::EventHandler;

/// Field name to value, in first-seen order.
pub type FormValues = IndexMap<String, String, ahash::RandomState>;

/// Reactive form state. Clones share the same fields.
#[derive(Clone)]
pub struct Form {
    values: Signal<FormValues>,
}

impl Form {
    /// A form with `initial` field values.
    pub fn new<K, V>(runtime: &Runtime, initial: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let values = initial
            .into_iter()
            .map(|(field, value)| (field.into(), value.into()))
            .collect();
        Self {
            values: runtime.signal(values),
        }
    }

    /// Snapshot of every field; subscribes the running effect.
    #[must_use]
    pub fn values(&self) -> FormValues {
        self.values.get()
    }

    /// One field's value; subscribes the running effect.
    #[must_use]
    pub fn value(&self, field: &str) -> Option<String> {
        self.values.with(|values| values.get(field).cloned())
    }

    /// Merge `value` into `field`, adding the field if it is new. Writing
    /// the current value notifies nobody.
    pub fn handle_change(&self, field: impl Into<String>, value: impl Into<String>) {
        let (field, value) = (field.into(), value.into());
        trace!(%field, "form field changed");
        self.values.update(|values| {
            let mut next = values.clone();
            next.insert(field, value);
            next
        });
    }

    /// Handler writing the event target's value into `field`.
    ///
    /// Events without a target value are ignored.
    pub fn bind(&self, field: impl Into<String>) -> EventHandler {
        let form = self.clone();
        let field = field.into();
        EventHandler::new(move |event| match event.value() {
            Some(value) => form.handle_change(field.clone(), value),
            None => debug!(%field, event = event.kind(), "event carries no value; field unchanged"),
        })
    }

    /// Handler that prevents the default action and calls `on_submit` with
    /// the current values (read without subscribing).
    pub fn handle_submit(&self, on_submit: impl Fn(&FormValues) + 'static) -> EventHandler {
        let values = self.values.clone();
        EventHandler::new(move |event| {
            event.prevent_default();
            let snapshot = values.get_untracked();
            debug!(fields = snapshot.len(), "form submitted");
            on_submit(&snapshot);
        })
    }
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("values", &self.values.get_untracked())
            .finish()
    }
}

/// Create a [`Form`] with `initial` field values.
pub fn use_form<K, V>(runtime: &Runtime, initial: impl IntoIterator<Item = (K, V)>) -> Form
where
    K: Into<String>,
    V: Into<String>,
{
    Form::new(runtime, initial)
}
