// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Evaluation and the scheduling queues.
//!
//! All three queues belong to the tree, so work queued from any scope
//! (isolated or not) surfaces in a digest started from the root.
//!
//! - `eval_async` tasks run at the start of the next digest pass. If no
//!   digest is running, one is arranged through the tree's [`Scheduler`].
//! - `apply_async` thunks are coalesced into a single deferred `apply`, or
//!   folded into whichever digest starts first.
//! - `post_digest` tasks run once after the next digest settles.
//!
//! [`Scheduler`]: crate::Scheduler

use std::rc::Rc;

use crate::error::{CallbackError, CallbackResult, CallbackSource, ScopeError};
use crate::id::ScopeId;
use crate::scope::Scope;
use crate::tree::{Deferred, Phase};

impl Scope {
    /// Calls `f` with this scope and returns its result.
    pub fn eval<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        f(self)
    }

    /// Calls `f` with this scope and `locals`, and returns its result.
    pub fn eval_with<L, R>(&self, locals: L, f: impl FnOnce(&Self, L) -> R) -> R {
        f(self, locals)
    }

    /// Runs `f` in the apply phase, then digests from the root.
    ///
    /// This is how code outside the tree should mutate it. The digest runs
    /// even when `f` fails; that failure is reported to the error handler and
    /// `Ok(None)` is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError::PhaseConflict`] if a digest or apply is already
    /// running (and `f` is not called), or any error of the root digest.
    ///
    /// ```rust
    /// use understory_scope::{Scope, Value};
    ///
    /// let root = Scope::new();
    /// let child = root.spawn();
    /// let _ = root.watch(
    ///     |s| Ok(s.get("count")),
    ///     |new, _, s| {
    ///         s.set("double", new.as_number().unwrap_or(0.0) * 2.0);
    ///         Ok(())
    ///     },
    /// );
    ///
    /// let out = child.apply(|_| {
    ///     root.set("count", 21);
    ///     Ok("done")
    /// });
    /// assert_eq!(out, Ok(Some("done")));
    /// assert_eq!(root.get("double"), Value::from(42));
    /// ```
    pub fn apply<R>(&self, f: impl FnOnce(&Self) -> CallbackResult<R>) -> Result<Option<R>, ScopeError> {
        let tree = self.tree();
        tree.begin_phase(Phase::Apply)?;
        let result = f(self);
        tree.clear_phase();
        let output = match result {
            Ok(value) => Some(value),
            Err(error) => {
                tree.report(CallbackSource::Apply, &error);
                None
            }
        };
        self.root().digest()?;
        Ok(output)
    }

    /// Queues `f` to run with this scope during the current or next digest.
    ///
    /// When nothing is digesting and the queue was empty, a root digest is
    /// scheduled so the task runs even if nobody digests explicitly.
    pub fn eval_async(&self, f: impl FnOnce(&Self) -> CallbackResult + 'static) {
        let tree = self.tree();
        let schedule = {
            let mut state = tree.state.borrow_mut();
            let schedule = state.phase.is_none() && state.async_queue.is_empty();
            state.async_queue.push_back(Deferred::new(self.id(), f));
            schedule
        };
        if schedule {
            let weak = Rc::downgrade(tree);
            tree.schedule(Box::new(move || {
                let Some(tree) = weak.upgrade() else {
                    return;
                };
                if tree.state.borrow().async_queue.is_empty() {
                    return;
                }
                run_deferred_digest(&Scope::from_parts(tree, ScopeId::ROOT), |root| {
                    root.digest()
                });
            }));
        }
    }

    /// Queues `f` to run in a coalesced apply on a later turn.
    ///
    /// Every call made before the flush shares one scheduled task and one
    /// digest. `f` never runs within the current call stack. If a digest starts
    /// first, it cancels the scheduled task and runs the queued thunks itself.
    pub fn apply_async(&self, f: impl FnOnce(&Self) -> CallbackResult + 'static) {
        let tree = self.tree();
        let schedule = {
            let mut state = tree.state.borrow_mut();
            state.apply_async_queue.push_back(Deferred::new(self.id(), f));
            state.apply_async_pending.is_none()
        };
        if schedule {
            let weak = Rc::downgrade(tree);
            let handle = tree.schedule(Box::new(move || {
                let Some(tree) = weak.upgrade() else {
                    return;
                };
                run_deferred_digest(&Scope::from_parts(tree, ScopeId::ROOT), |root| {
                    root.apply(|s| {
                        s.flush_apply_async();
                        Ok(())
                    })
                    .map(drop)
                });
            }));
            tree.state.borrow_mut().apply_async_pending = Some(handle);
        }
    }

    /// Runs every queued `apply_async` thunk, including ones queued meanwhile.
    pub(crate) fn flush_apply_async(&self) {
        let tree = self.tree();
        loop {
            let next = tree.state.borrow_mut().apply_async_queue.pop_front();
            let Some(deferred) = next else {
                break;
            };
            if let Err(error) = (deferred.task)(&self.at(deferred.scope)) {
                tree.report(CallbackSource::ApplyAsync, &error);
            }
        }
        tree.state.borrow_mut().apply_async_pending = None;
        tracing::trace!("flushed apply_async queue");
    }

    /// Queues `f` to run once after the next digest settles.
    ///
    /// Changes made by `f` are not checked until a later digest.
    pub fn post_digest(&self, f: impl FnOnce(&Self) -> CallbackResult + 'static) {
        self.tree()
            .state
            .borrow_mut()
            .post_digest_queue
            .push_back(Deferred::new(self.id(), f));
    }
}

/// Runs a digest from a scheduled task, where no caller can receive its error.
fn run_deferred_digest(root: &Scope, f: impl FnOnce(&Scope) -> Result<(), ScopeError>) {
    if let Err(error) = f(root) {
        root.tree()
            .report(CallbackSource::DeferredDigest, &CallbackError::from(error));
    }
}
