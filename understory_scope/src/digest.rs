// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The digest loop.
//!
//! A digest repeats full passes over a subtree until a pass finds nothing
//! dirty and the async queue is empty, or the tree's iteration budget runs
//! out. Within a pass, reaching the watcher recorded as the last dirty one
//! without finding anything new proves the whole tree is stable and ends the
//! pass early.

use crate::equality::{are_equal, snapshot};
use crate::error::{CallbackSource, ScopeError};
use crate::scope::Scope;
use crate::tree::Phase;

impl Scope {
    /// Runs watchers in this scope and its descendants until they settle.
    ///
    /// Pending [`apply_async`](Self::apply_async) work is flushed first, and
    /// [`eval_async`](Self::eval_async) tasks run at the start of every pass.
    /// Once settled, [`post_digest`](Self::post_digest) tasks run.
    ///
    /// # Errors
    ///
    /// - [`ScopeError::PhaseConflict`] if the tree is already in a digest or
    ///   apply.
    /// - [`ScopeError::Convergence`] if watchers are still dirty after the
    ///   configured number of passes. The phase is cleared, but watcher state
    ///   should be considered unreliable.
    pub fn digest(&self) -> Result<(), ScopeError> {
        let tree = self.tree();
        tree.begin_phase(Phase::Digest)?;
        tree.clear_last_dirty();

        let pending_flush = tree.state.borrow().apply_async_pending;
        if let Some(handle) = pending_flush {
            tree.cancel(handle);
            self.flush_apply_async();
        }

        let mut ttl = tree.digest_ttl;
        let mut passes = 0_usize;
        loop {
            self.drain_async_queue();
            let dirty = self.digest_once();
            passes += 1;
            tracing::trace!(scope = %self.id(), pass = passes, dirty, "digest pass");
            let queued = !tree.state.borrow().async_queue.is_empty();
            if !dirty && !queued {
                break;
            }
            ttl -= 1;
            if ttl == 0 {
                tree.clear_phase();
                tracing::debug!(scope = %self.id(), ttl = tree.digest_ttl, "digest did not converge");
                return Err(ScopeError::Convergence {
                    ttl: tree.digest_ttl,
                });
            }
        }
        tree.clear_phase();

        self.drain_post_digest();
        Ok(())
    }

    fn drain_async_queue(&self) {
        loop {
            let next = self.tree().state.borrow_mut().async_queue.pop_front();
            let Some(deferred) = next else {
                break;
            };
            if let Err(error) = (deferred.task)(&self.at(deferred.scope)) {
                self.tree().report(CallbackSource::EvalAsync, &error);
            }
        }
    }

    fn drain_post_digest(&self) {
        loop {
            let next = self.tree().state.borrow_mut().post_digest_queue.pop_front();
            let Some(deferred) = next else {
                break;
            };
            if let Err(error) = (deferred.task)(&self.at(deferred.scope)) {
                self.tree().report(CallbackSource::PostDigest, &error);
            }
        }
    }

    /// One pass over the subtree. Returns whether any watcher was dirty.
    fn digest_once(&self) -> bool {
        let mut dirty = false;
        self.every_scope(&mut |scope| scope.check_watchers(&mut dirty));
        dirty
    }

    /// Evaluates this scope's watchers, newest first.
    ///
    /// Returns `false` when the short-circuit marker is reached clean.
    fn check_watchers(&self, dirty: &mut bool) -> bool {
        let tree = self.tree();
        let len = self.with_node_mut(|node| {
            node.watchers.compact();
            node.watchers.len()
        })
        .unwrap_or(0);

        for index in (0..len).rev() {
            // `None` only happens when a callback destroyed this scope.
            let Some(record) = self.with_node(|node| node.watchers.get(index)) else {
                break;
            };
            if record.removed.get() {
                continue;
            }

            let value = match (record.watch_fn)(self) {
                Ok(value) => value,
                Err(error) => {
                    tree.report(CallbackSource::WatchFn, &error);
                    continue;
                }
            };

            let previous = record.last.borrow().clone();
            let changed = previous
                .as_ref()
                .is_none_or(|old| !are_equal(&value, old, record.equality));
            if changed {
                tree.state.borrow_mut().last_dirty = Some(record.id);
                *record.last.borrow_mut() = Some(snapshot(&value, record.equality));
                let old = previous.unwrap_or_else(|| value.clone());
                if let Err(error) = (record.listener)(&value, &old, self) {
                    tree.report(CallbackSource::Listener, &error);
                }
                *dirty = true;
            } else if tree.state.borrow().last_dirty == Some(record.id) {
                return false;
            }
        }
        true
    }
}
