#![forbid(unsafe_code)]

//! Provider-scoped values.
//!
//! A [`Context<T>`] carries a default value and a stack of provided values.
//! [`Context::provide`] pushes a value for the duration of a closure, so any
//! component rendered inside it observes that value through
//! [`Context::current`]. Nested providers shadow outer ones.
//!
//! Rendering is synchronous, so the stack mirrors the render call stack.
//! The pushed value is popped on exit, including during unwinding.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

struct ContextInner<T> {
    default: T,
    stack: RefCell<Vec<T>>,
}

/// A value visible to everything rendered inside a provider.
///
/// Cloning yields another handle to the same context.
pub struct Context<T> {
    inner: Rc<ContextInner<T>>,
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Context<T> {
    /// Create a context whose value is `default` outside every provider.
    #[must_use]
    pub fn new(default: T) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                default,
                stack: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Innermost provided value, or the default.
    #[must_use]
    pub fn current(&self) -> T {
        self.inner
            .stack
            .borrow()
            .last()
            .cloned()
            .unwrap_or_else(|| self.inner.default.clone())
    }

    /// Run `f` with `value` provided.
    pub fn provide<R>(&self, value: T, f: impl FnOnce() -> R) -> R {
        self.inner.stack.borrow_mut().push(value);
        let _guard = ProvideGuard { context: self };
        f()
    }

    /// Number of active providers.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.inner.stack.borrow().len()
    }
}

impl<T: fmt::Debug> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("default", &self.inner.default)
            .field("stack", &self.inner.stack.borrow())
            .finish()
    }
}

struct ProvideGuard<'a, T> {
    context: &'a Context<T>,
}

impl<T> Drop for ProvideGuard<'_, T> {
    fn drop(&mut self) {
        self.context.inner.stack.borrow_mut().pop();
    }
}
