// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scoped events.
//!
//! Listeners are registered per scope and per event name. [`Scope::emit`]
//! travels from the origin up through the hierarchy parents and can be stopped
//! by a listener; [`Scope::broadcast`] visits the origin and all its live
//! descendants in pre-order and cannot be stopped.
//!
//! Stopping is checked between scopes: once a listener stops propagation, the
//! remaining listeners of the current scope still run, and no further scope
//! is visited.
//!
//! ```rust
//! use understory_scope::{Scope, Value};
//!
//! let root = Scope::new();
//! let child = root.spawn();
//!
//! let _ = root.on("saved", |event, args| {
//!     assert_eq!(args, &[Value::from(7)]);
//!     event.prevent_default();
//!     Ok(())
//! });
//!
//! let event = child.emit("saved", &[Value::from(7)]);
//! assert!(event.is_default_prevented());
//! assert_eq!(event.target_scope(), &child);
//! assert!(event.current_scope().is_none());
//! ```

use std::cell::Cell;
use std::rc::Rc;

use crate::error::{CallbackResult, CallbackSource};
use crate::scope::Scope;
use crate::value::Value;
use crate::watch::Deregistration;

pub(crate) type EventListenerFn = Box<dyn Fn(&mut Event, &[Value]) -> CallbackResult>;

/// An event in flight, handed to every listener it reaches.
#[derive(Clone, Debug)]
pub struct Event {
    name: Rc<str>,
    target: Scope,
    current: Option<Scope>,
    stoppable: bool,
    propagation_stopped: bool,
    default_prevented: bool,
}

impl Event {
    fn new(name: &str, target: &Scope, stoppable: bool) -> Self {
        Self {
            name: name.into(),
            target: target.clone(),
            current: None,
            stoppable,
            propagation_stopped: false,
            default_prevented: false,
        }
    }

    /// The event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The scope the event was emitted or broadcast from.
    #[must_use]
    pub fn target_scope(&self) -> &Scope {
        &self.target
    }

    /// The scope whose listeners are running.
    ///
    /// `None` once propagation has finished.
    #[must_use]
    pub fn current_scope(&self) -> Option<&Scope> {
        self.current.as_ref()
    }

    /// Keeps an emitted event from reaching further parents.
    ///
    /// Has no effect on broadcast events.
    pub fn stop_propagation(&mut self) {
        if self.stoppable {
            self.propagation_stopped = true;
        }
    }

    /// Returns `true` if a listener stopped propagation.
    #[must_use]
    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    /// Flags the event for the code that emitted it.
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    /// Returns `true` if a listener called [`prevent_default`](Self::prevent_default).
    #[must_use]
    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }
}

pub(crate) struct ListenerRecord {
    listener: EventListenerFn,
    pub(crate) removed: Cell<bool>,
}

/// Listeners for one event name on one scope, in registration order.
#[derive(Default)]
pub(crate) struct ListenerList {
    records: Vec<Rc<ListenerRecord>>,
}

impl ListenerList {
    fn get(&self, index: usize) -> Option<Rc<ListenerRecord>> {
        self.records.get(index).cloned()
    }

    fn compact(&mut self) {
        self.records.retain(|r| !r.removed.get());
    }
}

impl Scope {
    /// Registers `listener` for events named `name` on this scope.
    ///
    /// Listeners registered on a destroyed scope are never called.
    pub fn on(
        &self,
        name: &str,
        listener: impl Fn(&mut Event, &[Value]) -> CallbackResult + 'static,
    ) -> Deregistration {
        let record = Rc::new(ListenerRecord {
            listener: Box::new(listener),
            removed: Cell::new(false),
        });
        let handle = Deregistration::listener(&record);
        self.with_node_mut(|node| {
            if node.destroyed {
                return;
            }
            node.listeners
                .entry(Rc::from(name))
                .or_default()
                .records
                .push(record);
        });
        handle
    }

    /// Fires `name` on this scope, then on each hierarchy parent up to the
    /// root, until a listener stops propagation.
    pub fn emit(&self, name: &str, args: &[Value]) -> Event {
        let mut event = Event::new(name, self, true);
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            scope.fire(&mut event, args);
            if event.propagation_stopped {
                break;
            }
            current = scope.parent();
        }
        event.current = None;
        event
    }

    /// Fires `name` on this scope and every live descendant, parents before
    /// children.
    pub fn broadcast(&self, name: &str, args: &[Value]) -> Event {
        let mut event = Event::new(name, self, false);
        self.every_scope(&mut |scope| {
            scope.fire(&mut event, args);
            true
        });
        event.current = None;
        event
    }

    /// Runs this scope's listeners for the event.
    fn fire(&self, event: &mut Event, args: &[Value]) {
        let tree = self.tree();
        let len = {
            let mut state = tree.state.borrow_mut();
            let compact = state.firing_depth == 0;
            let len = state
                .node_mut(self.id())
                .and_then(|node| node.listeners.get_mut(event.name()))
                .map_or(0, |list| {
                    if compact {
                        list.compact();
                    }
                    list.records.len()
                });
            if len == 0 {
                return;
            }
            state.firing_depth += 1;
            len
        };

        event.current = Some(self.clone());
        for index in 0..len {
            let record = self.with_node(|node| {
                node.listeners
                    .get(event.name())
                    .and_then(|list| list.get(index))
            });
            // The list only shrinks when a listener destroys this scope.
            let Some(record) = record else {
                break;
            };
            if record.removed.get() {
                continue;
            }
            if let Err(error) = (record.listener)(event, args) {
                tree.report(CallbackSource::EventListener, &error);
            }
        }

        tree.state.borrow_mut().firing_depth -= 1;
    }
}
