// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host-agnostic deferred execution.
//!
//! Two scope operations need to run work "later": `eval_async` arranges a
//! digest if nothing else will, and `apply_async` coalesces thunks into one
//! flush. Both go through a [`Scheduler`], which is the boundary to whatever
//! event loop hosts the tree. [`TaskQueue`] is a minimal FIFO implementation
//! that a host (or a test) pumps explicitly.
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use understory_scope::{Scheduler, TaskQueue};
//!
//! let queue = TaskQueue::new();
//! let ran = Rc::new(Cell::new(0));
//!
//! let r = ran.clone();
//! queue.schedule(Box::new(move || r.set(r.get() + 1)));
//! let r = ran.clone();
//! let handle = queue.schedule(Box::new(move || r.set(r.get() + 10)));
//! assert!(queue.cancel(handle));
//!
//! assert_eq!(queue.run_until_idle(), 1);
//! assert_eq!(ran.get(), 1);
//! ```

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce()>;

/// Handle to a scheduled task, used to cancel it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

impl TaskHandle {
    /// Creates a handle from a raw scheduler-defined token.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw token.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// The host event loop, as seen by a scope tree.
///
/// Implementations must not run a task synchronously from within
/// [`schedule`](Scheduler::schedule): scope operations rely on the task running
/// after the current call stack unwinds.
pub trait Scheduler {
    /// Queues `task` to run on a later turn of the event loop.
    fn schedule(&self, task: Task) -> TaskHandle;

    /// Cancels a task that has not run yet.
    ///
    /// Returns `true` if the task was pending and is now dropped.
    fn cancel(&self, handle: TaskHandle) -> bool;
}

/// A FIFO macrotask queue driven by its owner.
///
/// Each call to [`run_next`](Self::run_next) runs one task; tasks may schedule
/// further tasks, which run after the ones already queued.
#[derive(Default)]
pub struct TaskQueue {
    pending: RefCell<VecDeque<(TaskHandle, Task)>>,
    next_id: Cell<u64>,
}

impl TaskQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of pending tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Runs the oldest pending task.
    ///
    /// Returns `false` if the queue was empty.
    pub fn run_next(&self) -> bool {
        // Release the borrow before running so the task can schedule more work.
        let next = self.pending.borrow_mut().pop_front();
        match next {
            Some((_, task)) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks until the queue is empty, including tasks scheduled while
    /// draining. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl Scheduler for TaskQueue {
    fn schedule(&self, task: Task) -> TaskHandle {
        let handle = TaskHandle(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.pending.borrow_mut().push_back((handle, task));
        handle
    }

    fn cancel(&self, handle: TaskHandle) -> bool {
        let mut pending = self.pending.borrow_mut();
        match pending.iter().position(|(h, _)| *h == handle) {
            Some(idx) => {
                pending.remove(idx);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.len())
            .field("next_id", &self.next_id.get())
            .finish()
    }
}
