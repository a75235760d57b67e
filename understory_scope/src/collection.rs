// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Composite watchers built on [`Scope::watch`].

use std::cell::{Cell, RefCell};
use std::mem;
use std::rc::Rc;

use hashbrown::HashMap;

use crate::equality::{Equality, identical};
use crate::error::CallbackResult;
use crate::scope::Scope;
use crate::value::{Array, Value};
use crate::watch::{Deregistration, WatchFn};

type GroupListener = Box<dyn Fn(&Array, &Array, &Scope) -> CallbackResult>;

struct GroupState {
    new_values: Array,
    old_values: Array,
    scheduled: Cell<bool>,
    first_run: Cell<bool>,
    listener: GroupListener,
}

impl GroupState {
    fn fire(&self, scope: &Scope) -> CallbackResult {
        self.scheduled.set(false);
        if self.first_run.replace(false) {
            (self.listener)(&self.new_values, &self.new_values, scope)
        } else {
            (self.listener)(&self.new_values, &self.old_values, scope)
        }
    }
}

/// Shadow copy of the last observed collection, owned by the watcher.
enum Shadow {
    Scalar(Value),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
}

struct CollectionState {
    shadow: RefCell<Shadow>,
    changes: Cell<u32>,
    current: RefCell<Value>,
    previous: RefCell<Value>,
    first_run: Cell<bool>,
}

impl CollectionState {
    fn bump(&self) {
        self.changes.set(self.changes.get().wrapping_add(1));
    }

    /// Compares `value` against the shadow one level deep, updating both the
    /// shadow and the change counter.
    fn observe(&self, value: &Value) {
        let mut shadow = self.shadow.borrow_mut();
        let previous = mem::replace(&mut *shadow, Shadow::Scalar(Value::Undefined));
        *shadow = match value {
            Value::Array(array) => {
                let mut old = match previous {
                    Shadow::Array(old) => old,
                    _ => {
                        self.bump();
                        Vec::new()
                    }
                };
                let items = array.borrow();
                if items.len() != old.len() {
                    self.bump();
                    old.resize(items.len(), Value::Undefined);
                }
                for (new, old) in items.iter().zip(old.iter_mut()) {
                    if !identical(new, old) {
                        self.bump();
                        *old = new.clone();
                    }
                }
                Shadow::Array(old)
            }
            Value::Object(object) => {
                let mut old = match previous {
                    Shadow::Object(old) => old,
                    _ => {
                        self.bump();
                        HashMap::new()
                    }
                };
                let entries = object.borrow();
                for (key, new) in entries.iter() {
                    match old.get_mut(key) {
                        Some(slot) => {
                            if !identical(new, slot) {
                                self.bump();
                                *slot = new.clone();
                            }
                        }
                        None => {
                            self.bump();
                            old.insert(key.clone(), new.clone());
                        }
                    }
                }
                if old.len() > entries.len() {
                    self.bump();
                    old.retain(|key, _| entries.contains_key(key));
                }
                Shadow::Object(old)
            }
            _ => {
                let changed = match &previous {
                    Shadow::Scalar(old) => !identical(value, old),
                    _ => true,
                };
                if changed {
                    self.bump();
                }
                Shadow::Scalar(value.clone())
            }
        };
    }
}

impl Scope {
    /// Watches several values with one listener.
    ///
    /// The listener receives arrays of the new and old values, in the order of
    /// `watch_fns`, at most once per batch of changes. On the first call both
    /// arguments are the same array. With no watch functions, the listener runs
    /// once (with two empty arrays) on the next digest unless deregistered
    /// first.
    ///
    /// ```rust
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    /// use understory_scope::{Scope, Value, watch_fn};
    ///
    /// let scope = Scope::new();
    /// scope.set("a", 1);
    /// scope.set("b", 2);
    ///
    /// let seen = Rc::new(RefCell::new(Vec::new()));
    /// let s = seen.clone();
    /// let _ = scope.watch_group(
    ///     vec![watch_fn(|s| Ok(s.get("a"))), watch_fn(|s| Ok(s.get("b")))],
    ///     move |new, old, _| {
    ///         s.borrow_mut().push((new.to_vec(), old.to_vec()));
    ///         Ok(())
    ///     },
    /// );
    ///
    /// scope.digest().unwrap();
    /// scope.set("b", 3);
    /// scope.digest().unwrap();
    ///
    /// let one = Value::from(1);
    /// assert_eq!(
    ///     seen.borrow()[1],
    ///     (vec![one.clone(), Value::from(3)], vec![one, Value::from(2)])
    /// );
    /// ```
    pub fn watch_group(
        &self,
        watch_fns: Vec<WatchFn>,
        listener: impl Fn(&Array, &Array, &Self) -> CallbackResult + 'static,
    ) -> Deregistration {
        if watch_fns.is_empty() {
            let active = Rc::new(Cell::new(true));
            let flag = active.clone();
            self.eval_async(move |scope| {
                if flag.get() {
                    let empty = Array::new();
                    listener(&empty, &empty, scope)?;
                }
                Ok(())
            });
            return Deregistration::cancel(active);
        }

        let count = watch_fns.len();
        let state = Rc::new(GroupState {
            new_values: Array::from(vec![Value::Undefined; count]),
            old_values: Array::from(vec![Value::Undefined; count]),
            scheduled: Cell::new(false),
            first_run: Cell::new(true),
            listener: Box::new(listener),
        });

        let members: Vec<_> = watch_fns
            .into_iter()
            .enumerate()
            .map(|(index, watch_fn)| {
                let state = state.clone();
                self.register_watch(
                    watch_fn,
                    Box::new(move |new: &Value, old: &Value, scope: &Self| -> CallbackResult {
                        state.new_values.set(index, new.clone());
                        state.old_values.set(index, old.clone());
                        if !state.scheduled.replace(true) {
                            let state = state.clone();
                            scope.eval_async(move |scope| state.fire(scope));
                        }
                        Ok(())
                    }),
                    Equality::Reference,
                )
            })
            .collect();
        Deregistration::group(members)
    }

    /// Watches the elements of an array or the entries of an object.
    ///
    /// Changes are detected one level deep: additions, removals and replaced
    /// elements (by reference, with `NaN` equal to itself). Unlike
    /// [`Equality::Value`], nothing is deep-cloned. The listener receives the
    /// current value and a shallow copy of the previous one; on the first call
    /// the current value is passed as both.
    ///
    /// ```rust
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    /// use understory_scope::{Array, Scope, Value};
    ///
    /// let scope = Scope::new();
    /// let list = Array::from(vec![Value::from(1)]);
    /// scope.set("list", list.clone());
    ///
    /// let calls = Rc::new(Cell::new(0));
    /// let c = calls.clone();
    /// let _ = scope.watch_collection(
    ///     |s| Ok(s.get("list")),
    ///     move |_, _, _| {
    ///         c.set(c.get() + 1);
    ///         Ok(())
    ///     },
    /// );
    /// scope.digest().unwrap();
    ///
    /// list.push(2);
    /// scope.digest().unwrap();
    /// assert_eq!(calls.get(), 2);
    /// ```
    pub fn watch_collection(
        &self,
        watch_fn: impl Fn(&Self) -> CallbackResult<Value> + 'static,
        listener: impl Fn(&Value, &Value, &Self) -> CallbackResult + 'static,
    ) -> Deregistration {
        let state = Rc::new(CollectionState {
            shadow: RefCell::new(Shadow::Scalar(Value::Undefined)),
            changes: Cell::new(0),
            current: RefCell::new(Value::Undefined),
            previous: RefCell::new(Value::Undefined),
            first_run: Cell::new(true),
        });

        let watch_state = state.clone();
        let counting = move |scope: &Self| -> CallbackResult<Value> {
            let value = watch_fn(scope)?;
            watch_state.observe(&value);
            *watch_state.current.borrow_mut() = value;
            Ok(Value::from(watch_state.changes.get()))
        };

        let reacting = move |_: &Value, _: &Value, scope: &Self| -> CallbackResult {
            let current = state.current.borrow().clone();
            let previous = if state.first_run.get() {
                current.clone()
            } else {
                state.previous.borrow().clone()
            };
            listener(&current, &previous, scope)?;
            state.first_run.set(false);
            *state.previous.borrow_mut() = current.shallow_clone();
            Ok(())
        };

        self.register_watch(Box::new(counting), Box::new(reacting), Equality::Reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Object, watch_fn};

    fn count_calls(scope: &Scope, key: &'static str) -> Rc<Cell<u32>> {
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let _ = scope.watch_collection(
            move |s| Ok(s.get(key)),
            move |_, _, _| {
                c.set(c.get() + 1);
                Ok(())
            },
        );
        calls
    }

    #[test]
    fn group_calls_listener_once_per_digest() {
        let scope = Scope::new();
        scope.set("a", 1);
        scope.set("b", 2);
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let _ = scope.watch_group(
            vec![watch_fn(|s| Ok(s.get("a"))), watch_fn(|s| Ok(s.get("b")))],
            move |new, old, _| {
                assert_eq!(new.to_vec(), vec![Value::from(1), Value::from(2)]);
                assert!(new.ptr_eq(old));
                c.set(c.get() + 1);
                Ok(())
            },
        );
        scope.digest().unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn group_uses_distinct_arrays_after_first_run() {
        let scope = Scope::new();
        scope.set("a", 1);
        let same = Rc::new(RefCell::new(Vec::new()));
        let s = same.clone();
        let _ = scope.watch_group(vec![watch_fn(|s| Ok(s.get("a")))], move |new, old, _| {
            s.borrow_mut().push(new.ptr_eq(old));
            Ok(())
        });
        scope.digest().unwrap();
        scope.set("a", 2);
        scope.digest().unwrap();
        assert_eq!(*same.borrow(), vec![true, false]);
    }

    #[test]
    fn empty_group_fires_once() {
        let scope = Scope::new();
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let _ = scope.watch_group(Vec::new(), move |new, old, _| {
            assert!(new.is_empty() && old.is_empty());
            c.set(c.get() + 1);
            Ok(())
        });
        scope.digest().unwrap();
        scope.digest().unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn empty_group_deregistered_first_never_fires() {
        let scope = Scope::new();
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let handle = scope.watch_group(Vec::new(), move |_, _, _| {
            c.set(c.get() + 1);
            Ok(())
        });
        handle.deregister();
        scope.digest().unwrap();
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn group_can_be_deregistered() {
        let scope = Scope::new();
        scope.set("a", 1);
        scope.set("b", 2);
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let handle = scope.watch_group(
            vec![watch_fn(|s| Ok(s.get("a"))), watch_fn(|s| Ok(s.get("b")))],
            move |_, _, _| {
                c.set(c.get() + 1);
                Ok(())
            },
        );
        scope.digest().unwrap();
        scope.set("b", 3);
        handle.deregister();
        scope.digest().unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn collection_scalar_changes() {
        let scope = Scope::new();
        scope.set("v", 42);
        let calls = count_calls(&scope, "v");
        scope.digest().unwrap();
        assert_eq!(calls.get(), 1);

        scope.set("v", 43);
        scope.digest().unwrap();
        assert_eq!(calls.get(), 2);

        scope.digest().unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn collection_array_changes() {
        let scope = Scope::new();
        let list = Array::from(vec![Value::from(1), Value::from(2)]);
        scope.set("list", list.clone());
        let calls = count_calls(&scope, "list");
        scope.digest().unwrap();
        assert_eq!(calls.get(), 1);

        list.push(3);
        scope.digest().unwrap();
        assert_eq!(calls.get(), 2);

        list.borrow_mut().remove(0);
        scope.digest().unwrap();
        assert_eq!(calls.get(), 3);

        list.set(0, 99);
        scope.digest().unwrap();
        assert_eq!(calls.get(), 4);

        // Reordering is a change; an identical replacement is not.
        list.borrow_mut().reverse();
        scope.digest().unwrap();
        assert_eq!(calls.get(), 5);
        scope.set("list", Array::from(list.to_vec()));
        scope.digest().unwrap();
        assert_eq!(calls.get(), 5);
    }

    #[test]
    fn collection_nan_elements_are_stable() {
        let scope = Scope::new();
        scope.set("list", vec![Value::from(f64::NAN), Value::from(1)]);
        let calls = count_calls(&scope, "list");
        scope.digest().unwrap();
        scope.digest().unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn collection_object_changes() {
        let scope = Scope::new();
        let obj: Object = [("a", Value::from(1))].into_iter().collect();
        scope.set("obj", obj.clone());
        let calls = count_calls(&scope, "obj");
        scope.digest().unwrap();
        assert_eq!(calls.get(), 1);

        obj.insert("b", 2);
        scope.digest().unwrap();
        assert_eq!(calls.get(), 2);

        obj.insert("b", 3);
        scope.digest().unwrap();
        assert_eq!(calls.get(), 3);

        obj.remove("a");
        scope.digest().unwrap();
        assert_eq!(calls.get(), 4);

        scope.digest().unwrap();
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn collection_kind_switch() {
        let scope = Scope::new();
        scope.set("v", vec![Value::from(1)]);
        let calls = count_calls(&scope, "v");
        scope.digest().unwrap();

        let obj: Object = [("0", Value::from(1))].into_iter().collect();
        scope.set("v", obj);
        scope.digest().unwrap();
        assert_eq!(calls.get(), 2);

        scope.set("v", Value::Null);
        scope.digest().unwrap();
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn collection_listener_gets_previous_shallow_copy() {
        let scope = Scope::new();
        let list = Array::from(vec![Value::from(1)]);
        scope.set("list", list.clone());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let _ = scope.watch_collection(
            |s| Ok(s.get("list")),
            move |new, old, _| {
                let len = |v: &Value| v.as_array().map_or(0, Array::len);
                s.borrow_mut().push((len(new), len(old)));
                Ok(())
            },
        );
        scope.digest().unwrap();
        list.push(2);
        scope.digest().unwrap();
        assert_eq!(*seen.borrow(), vec![(1, 1), (2, 1)]);
    }
}
