// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.
//!
//! Only two kinds of failure escape scope operations, both as [`ScopeError`]:
//! a digest that does not converge and an illegal re-entrant phase. Failures
//! raised by user callbacks are [`CallbackError`]s; they are caught where the
//! callback is invoked, handed to the tree's error handler and never abort
//! the surrounding loop.

use std::error::Error;
use std::fmt;
use std::rc::Rc;

use crate::Phase;

/// Fatal errors returned by digest and apply.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// The iteration budget ran out while watchers were still dirty.
    ///
    /// This indicates watchers that keep changing each other's inputs.
    /// Scope state after this error is unreliable.
    #[error("{ttl} digest iterations reached")]
    Convergence {
        /// The budget that was exhausted.
        ttl: usize,
    },
    /// A phase was begun while another one was active on the same tree.
    #[error("{active} already in progress (cannot begin {requested})")]
    PhaseConflict {
        /// The phase that was running.
        active: Phase,
        /// The phase that was refused.
        requested: Phase,
    },
}

/// A failure raised by a user callback.
///
/// Any [`std::error::Error`] converts into a `CallbackError`, so callbacks can
/// use `?` freely, including on nested scope operations:
///
/// ```rust
/// use understory_scope::{CallbackResult, Scope, Value};
///
/// let scope = Scope::new();
/// let _ = scope.watch(
///     |s| Ok(s.get("n")),
///     |_, _, s| -> CallbackResult {
///         let n: i32 = "12".parse()?;
///         s.set("parsed", n);
///         Ok(())
///     },
/// );
/// scope.digest().unwrap();
/// assert_eq!(scope.get("parsed"), Value::from(12));
/// ```
pub struct CallbackError {
    inner: Box<dyn Error + 'static>,
}

impl CallbackError {
    /// Wraps an existing error.
    pub fn new(error: impl Error + 'static) -> Self {
        Self {
            inner: Box::new(error),
        }
    }

    /// Creates an error from a message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::new(Message(message.to_string()))
    }

    /// Returns the wrapped error.
    #[must_use]
    pub fn source_error(&self) -> &(dyn Error + 'static) {
        &*self.inner
    }

    /// Attempts to view the wrapped error as a concrete type.
    #[must_use]
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref()
    }
}

impl<E: Error + 'static> From<E> for CallbackError {
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Debug for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CallbackError").field(&self.inner).finish()
    }
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);

/// Result type returned by every user callback.
pub type CallbackResult<T = ()> = Result<T, CallbackError>;

/// Where a contained callback failure happened.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CallbackSource {
    /// A watch function.
    WatchFn,
    /// A watch listener.
    Listener,
    /// A task queued with `eval_async`.
    EvalAsync,
    /// A thunk queued with `apply_async`.
    ApplyAsync,
    /// A function passed to `apply`.
    Apply,
    /// A task queued with `post_digest`.
    PostDigest,
    /// An event listener registered with `on`.
    EventListener,
    /// A digest started by a deferred task, where no caller can receive the error.
    DeferredDigest,
}

/// Receives every contained callback failure of a tree.
pub type ErrorHandler = Rc<dyn Fn(CallbackSource, &CallbackError)>;

pub(crate) fn default_error_handler() -> ErrorHandler {
    Rc::new(|source, error| {
        tracing::error!(?source, %error, "scope callback failed");
    })
}
