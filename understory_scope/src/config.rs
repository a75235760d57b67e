// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree configuration.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::{CallbackError, CallbackSource, ErrorHandler, default_error_handler};
use crate::id::ScopeId;
use crate::schedule::{Scheduler, TaskQueue};
use crate::scope::Scope;
use crate::tree::{Tree, TreeScheduler};

/// Number of passes a digest may take before giving up.
pub const DEFAULT_DIGEST_TTL: usize = 10;

/// Builder for a new root [`Scope`].
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
/// use understory_scope::{Scope, TaskQueue};
///
/// let queue = Rc::new(TaskQueue::new());
/// let root = Scope::builder()
///     .digest_ttl(20)
///     .scheduler(queue.clone())
///     .error_handler(|source, error| eprintln!("{source:?}: {error}"))
///     .build();
///
/// root.eval_async(|s| {
///     s.set("ready", true);
///     Ok(())
/// });
/// queue.run_until_idle();
/// assert_eq!(root.get("ready").as_bool(), Some(true));
/// ```
pub struct ScopeBuilder {
    digest_ttl: usize,
    scheduler: Option<Rc<dyn Scheduler>>,
    error_handler: Option<ErrorHandler>,
}

// Manual Debug impl since the scheduler and handler aren't Debug
impl fmt::Debug for ScopeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeBuilder")
            .field("digest_ttl", &self.digest_ttl)
            .field("has_scheduler", &self.scheduler.is_some())
            .field("has_error_handler", &self.error_handler.is_some())
            .finish()
    }
}

impl Default for ScopeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeBuilder {
    /// Creates a builder with the default budget, a built-in [`TaskQueue`] and
    /// an error handler that logs through `tracing`.
    ///
    /// Without a [`scheduler`](Self::scheduler), the host drives deferred work
    /// by pumping the queue returned by [`Scope::task_queue`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            digest_ttl: DEFAULT_DIGEST_TTL,
            scheduler: None,
            error_handler: None,
        }
    }

    /// Sets how many passes a digest may take. Values below 1 are raised to 1.
    #[must_use]
    pub fn digest_ttl(mut self, ttl: usize) -> Self {
        self.digest_ttl = ttl.max(1);
        self
    }

    /// Sets the host event loop used by `eval_async` and `apply_async`.
    #[must_use]
    pub fn scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Sets the receiver for failures raised by callbacks.
    #[must_use]
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(CallbackSource, &CallbackError) + 'static,
    {
        self.error_handler = Some(Rc::new(handler));
        self
    }

    /// Builds the root scope of a new tree.
    #[must_use]
    pub fn build(self) -> Scope {
        let scheduler = match self.scheduler {
            Some(scheduler) => TreeScheduler::Host(scheduler),
            None => TreeScheduler::BuiltIn {
                queue: Rc::new(TaskQueue::new()),
                claimed: Cell::new(false),
            },
        };
        let error_handler = self.error_handler.unwrap_or_else(default_error_handler);
        let tree = Tree::new(scheduler, error_handler, self.digest_ttl);
        Scope::from_parts(Rc::new(tree), ScopeId::ROOT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn defaults() {
        let builder = ScopeBuilder::default();
        assert_eq!(
            format!("{builder:?}"),
            "ScopeBuilder { digest_ttl: 10, has_scheduler: false, has_error_handler: false }"
        );
        let root = builder.build();
        assert!(root.is_root());
        assert_eq!(root.tree().digest_ttl, DEFAULT_DIGEST_TTL);
    }

    #[test]
    fn ttl_is_at_least_one() {
        let root = ScopeBuilder::new().digest_ttl(0).build();
        assert_eq!(root.tree().digest_ttl, 1);
        root.digest().unwrap();
    }

    #[test]
    #[tracing_test::traced_test]
    fn default_handler_receives_callback_failures() {
        let root = Scope::new();
        let _ = root.watch_only(|_| Err(CallbackError::msg("watch blew up")));
        root.digest().unwrap();
        assert!(logs_contain("watch blew up"));
    }

    #[test]
    fn built_in_queue_is_reachable_from_any_scope() {
        let root = Scope::new();
        let child = root.spawn();
        let queue = child.task_queue().unwrap();
        assert!(Rc::ptr_eq(&queue, &root.task_queue().unwrap()));

        child.eval_async(|s| {
            s.set("evaluated", true);
            Ok(())
        });
        root.apply_async(|s| {
            s.set("applied", true);
            Ok(())
        });
        assert_eq!(queue.len(), 2);
        queue.run_until_idle();
        assert_eq!(child.get_own("evaluated"), Some(Value::from(true)));
        assert_eq!(root.get_own("applied"), Some(Value::from(true)));
    }

    #[test]
    fn host_scheduler_replaces_the_built_in_queue() {
        let host = Rc::new(TaskQueue::new());
        let root = ScopeBuilder::new().scheduler(host.clone()).build();
        assert!(root.task_queue().is_none());
        root.eval_async(|_| Ok(()));
        assert_eq!(host.len(), 1);
    }

    #[test]
    #[tracing_test::traced_test]
    fn unclaimed_built_in_queue_warns_once() {
        let root = Scope::new();
        root.eval_async(|_| Ok(()));
        root.apply_async(|_| Ok(()));
        assert!(logs_contain("built-in task queue"));
        logs_assert(|lines| {
            match lines.iter().filter(|line| line.contains("built-in task queue")).count() {
                1 => Ok(()),
                n => Err(format!("expected one warning, saw {n}")),
            }
        });
    }

    #[test]
    #[tracing_test::traced_test]
    fn claimed_built_in_queue_does_not_warn() {
        let root = Scope::new();
        let queue = root.task_queue().unwrap();
        root.eval_async(|_| Ok(()));
        queue.run_until_idle();
        assert!(!logs_contain("built-in task queue"));
    }
}
