// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Watcher registry.
//!
//! Each scope keeps its watchers in registration order and the digest walks
//! them from the back, so the most recently registered watcher is evaluated
//! first. A watcher registered mid-pass lands behind the walk position and is
//! picked up by the next pass.
//!
//! Removal only sets a tombstone. The list is compacted when the digest next
//! visits the scope, which keeps indices stable while a walk is in progress.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::equality::Equality;
use crate::error::CallbackResult;
use crate::event::ListenerRecord;
use crate::id::WatchId;
use crate::scope::Scope;
use crate::tree::Tree;
use crate::value::Value;

/// A boxed watch function.
pub type WatchFn = Box<dyn Fn(&Scope) -> CallbackResult<Value>>;

pub(crate) type ListenerFn = Box<dyn Fn(&Value, &Value, &Scope) -> CallbackResult>;

/// Boxes a closure as a [`WatchFn`], for building lists of watch functions.
///
/// ```rust
/// use understory_scope::{Scope, Value, watch_fn};
///
/// let scope = Scope::new();
/// scope.set("a", 1);
/// let fns = vec![watch_fn(|s| Ok(s.get("a"))), watch_fn(|_| Ok(Value::Null))];
/// assert_eq!(fns[0](&scope).unwrap(), Value::from(1));
/// ```
pub fn watch_fn(f: impl Fn(&Scope) -> CallbackResult<Value> + 'static) -> WatchFn {
    Box::new(f)
}

pub(crate) struct WatchRecord {
    pub(crate) id: WatchId,
    pub(crate) watch_fn: WatchFn,
    pub(crate) listener: ListenerFn,
    pub(crate) equality: Equality,
    /// `None` until the first evaluation, so any watched value reads as changed.
    pub(crate) last: RefCell<Option<Value>>,
    pub(crate) removed: Cell<bool>,
}

/// A scope's watchers, oldest first.
#[derive(Default)]
pub(crate) struct WatchList {
    records: Vec<Rc<WatchRecord>>,
}

impl WatchList {
    pub(crate) fn push(&mut self, record: Rc<WatchRecord>) {
        self.records.push(record);
    }

    pub(crate) fn get(&self, index: usize) -> Option<Rc<WatchRecord>> {
        self.records.get(index).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Drops tombstoned records.
    pub(crate) fn compact(&mut self) {
        self.records.retain(|r| !r.removed.get());
    }
}

/// Removes a watcher, group of watchers or event listener.
///
/// The handle is cheap to clone and only holds weak references, so it can be
/// captured by the very callback it removes. Calling
/// [`deregister`](Self::deregister) more than once has no further effect.
#[derive(Clone)]
pub struct Deregistration {
    target: Target,
}

#[derive(Clone)]
enum Target {
    Inert,
    Watch {
        tree: Weak<Tree>,
        record: Weak<WatchRecord>,
    },
    Listener(Weak<ListenerRecord>),
    Group(Rc<[Deregistration]>),
    Cancel(Rc<Cell<bool>>),
}

impl Deregistration {
    /// A handle that does nothing.
    pub(crate) fn inert() -> Self {
        Self {
            target: Target::Inert,
        }
    }

    pub(crate) fn watch(tree: &Rc<Tree>, record: &Rc<WatchRecord>) -> Self {
        Self {
            target: Target::Watch {
                tree: Rc::downgrade(tree),
                record: Rc::downgrade(record),
            },
        }
    }

    pub(crate) fn listener(record: &Rc<ListenerRecord>) -> Self {
        Self {
            target: Target::Listener(Rc::downgrade(record)),
        }
    }

    pub(crate) fn group(members: Vec<Self>) -> Self {
        Self {
            target: Target::Group(members.into()),
        }
    }

    /// Clears `active` on deregistration.
    pub(crate) fn cancel(active: Rc<Cell<bool>>) -> Self {
        Self {
            target: Target::Cancel(active),
        }
    }

    /// Removes the registration.
    pub fn deregister(&self) {
        match &self.target {
            Target::Inert => {}
            Target::Watch { tree, record } => {
                let Some(record) = record.upgrade() else {
                    return;
                };
                if !record.removed.replace(true) {
                    if let Some(tree) = tree.upgrade() {
                        tree.clear_last_dirty();
                    }
                }
            }
            Target::Listener(record) => {
                if let Some(record) = record.upgrade() {
                    record.removed.set(true);
                }
            }
            Target::Group(members) => members.iter().for_each(Self::deregister),
            Target::Cancel(active) => active.set(false),
        }
    }
}

impl fmt::Debug for Deregistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.target {
            Target::Inert => "inert",
            Target::Watch { .. } => "watch",
            Target::Listener(_) => "listener",
            Target::Group(_) => "group",
            Target::Cancel(_) => "cancel",
        };
        f.debug_tuple("Deregistration").field(&kind).finish()
    }
}

impl Scope {
    /// Registers a watcher compared by reference.
    ///
    /// `watch_fn` is evaluated on every digest pass that reaches this scope.
    /// Whenever its result differs from the previous one, `listener` is called
    /// with the new value, the old value and this scope. On the first call the
    /// new value is passed as both.
    ///
    /// ```rust
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    /// use understory_scope::{Scope, Value};
    ///
    /// let scope = Scope::new();
    /// let calls = Rc::new(Cell::new(0));
    /// let c = calls.clone();
    /// let handle = scope.watch(
    ///     |s| Ok(s.get("name")),
    ///     move |new, old, _| {
    ///         c.set(c.get() + 1);
    ///         assert_eq!(new, old);
    ///         Ok(())
    ///     },
    /// );
    ///
    /// scope.set("name", "Ada");
    /// scope.digest().unwrap();
    /// assert_eq!(calls.get(), 1);
    ///
    /// handle.deregister();
    /// scope.set("name", "Grace");
    /// scope.digest().unwrap();
    /// assert_eq!(calls.get(), 1);
    /// ```
    pub fn watch(
        &self,
        watch_fn: impl Fn(&Self) -> CallbackResult<Value> + 'static,
        listener: impl Fn(&Value, &Value, &Self) -> CallbackResult + 'static,
    ) -> Deregistration {
        self.watch_with(watch_fn, listener, Equality::Reference)
    }

    /// Registers a watcher with an explicit [`Equality`] mode.
    pub fn watch_with(
        &self,
        watch_fn: impl Fn(&Self) -> CallbackResult<Value> + 'static,
        listener: impl Fn(&Value, &Value, &Self) -> CallbackResult + 'static,
        equality: Equality,
    ) -> Deregistration {
        self.register_watch(Box::new(watch_fn), Box::new(listener), equality)
    }

    /// Registers a watcher without a listener.
    ///
    /// The watch function still runs on every pass, which is occasionally
    /// useful for its side effects.
    pub fn watch_only(
        &self,
        watch_fn: impl Fn(&Self) -> CallbackResult<Value> + 'static,
    ) -> Deregistration {
        let listener = |_: &Value, _: &Value, _: &Self| -> CallbackResult { Ok(()) };
        self.register_watch(Box::new(watch_fn), Box::new(listener), Equality::Reference)
    }

    pub(crate) fn register_watch(
        &self,
        watch_fn: WatchFn,
        listener: ListenerFn,
        equality: Equality,
    ) -> Deregistration {
        let mut state = self.tree().state.borrow_mut();
        if state.node(self.id()).destroyed {
            return Deregistration::inert();
        }
        let record = Rc::new(WatchRecord {
            id: state.allocate_watch_id(),
            watch_fn,
            listener,
            equality,
            last: RefCell::new(None),
            removed: Cell::new(false),
        });
        let handle = Deregistration::watch(self.tree(), &record);
        if let Some(node) = state.node_mut(self.id()) {
            node.watchers.push(record);
        }
        state.last_dirty = None;
        handle
    }
}
