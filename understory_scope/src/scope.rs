// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scope handles: attributes and hierarchy.
//!
//! A [`Scope`] is a cheap, cloneable handle to one node of a tree. Reading an
//! attribute checks the scope's own storage first and then walks the
//! inheritance chain; writing always lands on the scope itself.
//!
//! ```rust
//! use understory_scope::{Scope, Value};
//!
//! let root = Scope::new();
//! let child = root.spawn();
//! let isolated = root.spawn_isolated();
//!
//! root.set("name", "parent");
//! assert_eq!(child.get("name"), Value::from("parent"));
//! assert!(isolated.get("name").is_undefined());
//!
//! // Shadowing: the write lands on the child only.
//! child.set("name", "child");
//! assert_eq!(root.get("name"), Value::from("parent"));
//! ```

use std::fmt;
use std::mem;
use std::rc::Rc;

use crate::config::ScopeBuilder;
use crate::id::ScopeId;
use crate::schedule::TaskQueue;
use crate::tree::{Node, Phase, Tree, WeakScope};
use crate::value::Value;

/// A handle to a scope in a tree.
///
/// Handles compare equal when they refer to the same scope of the same tree.
#[derive(Clone)]
pub struct Scope {
    tree: Rc<Tree>,
    id: ScopeId,
}

impl Scope {
    /// Creates the root scope of a new tree with default configuration.
    ///
    /// Deferred work goes to a built-in [`TaskQueue`] that the host pumps
    /// through [`task_queue`](Self::task_queue). Use [`Scope::builder`] to plug
    /// in the host's own scheduler instead.
    #[must_use]
    pub fn new() -> Self {
        ScopeBuilder::new().build()
    }

    /// Returns a builder for a new root scope.
    #[must_use]
    pub fn builder() -> ScopeBuilder {
        ScopeBuilder::new()
    }

    pub(crate) fn from_parts(tree: Rc<Tree>, id: ScopeId) -> Self {
        Self { tree, id }
    }

    pub(crate) fn tree(&self) -> &Rc<Tree> {
        &self.tree
    }

    /// Returns a handle to another scope of the same tree.
    pub(crate) fn at(&self, id: ScopeId) -> Self {
        Self {
            tree: self.tree.clone(),
            id,
        }
    }

    pub(crate) fn with_node<R>(&self, f: impl FnOnce(&Node) -> R) -> R {
        f(self.tree.state.borrow().node(self.id))
    }

    /// Runs `f` on this scope's node, unless its slot has been freed.
    pub(crate) fn with_node_mut<R>(&self, f: impl FnOnce(&mut Node) -> R) -> Option<R> {
        self.tree.state.borrow_mut().node_mut(self.id).map(f)
    }

    // =========================================================================
    // Identity and navigation
    // =========================================================================

    /// Returns this scope's id within its tree.
    #[must_use]
    #[inline]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Returns `true` if this is the root of its tree.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.id == ScopeId::ROOT
    }

    /// Returns the root of this scope's tree.
    #[must_use]
    pub fn root(&self) -> Self {
        self.at(ScopeId::ROOT)
    }

    /// Returns the hierarchy parent, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.with_node(|node| node.parent).map(|id| self.at(id))
    }

    /// Returns the current children, in creation order.
    #[must_use]
    pub fn children(&self) -> Vec<Self> {
        self.with_node(|node| node.children.clone())
            .into_iter()
            .map(|id| self.at(id))
            .collect()
    }

    /// Returns `true` once [`destroy`](Self::destroy) has been called.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.with_node(|node| node.destroyed)
    }

    /// Returns the phase the tree is currently in, if any.
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        self.tree.state.borrow().phase
    }

    /// Returns the tree's built-in task queue, or `None` if the tree was built
    /// with a host [`Scheduler`](crate::Scheduler).
    ///
    /// `eval_async` and `apply_async` schedule their deferred digests here;
    /// nothing runs until the host pumps the queue.
    ///
    /// ```rust
    /// use understory_scope::Scope;
    ///
    /// let root = Scope::new();
    /// let queue = root.task_queue().unwrap();
    /// root.apply_async(|s| {
    ///     s.set("ready", true);
    ///     Ok(())
    /// });
    /// assert!(root.get("ready").is_undefined());
    /// queue.run_until_idle();
    /// assert_eq!(root.get("ready").as_bool(), Some(true));
    /// ```
    #[must_use]
    pub fn task_queue(&self) -> Option<Rc<TaskQueue>> {
        self.tree.claim_default_queue()
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Reads an attribute, falling through to inherited scopes when unset here.
    ///
    /// Returns [`Value::Undefined`] if no scope on the chain has the key.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        self.lookup(key).unwrap_or_default()
    }

    /// Reads an attribute set directly on this scope.
    #[must_use]
    pub fn get_own(&self, key: &str) -> Option<Value> {
        self.with_node(|node| node.attrs.get(key).cloned())
    }

    /// Returns `true` if this scope or an inherited one has the key.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Returns `true` if the key is set directly on this scope.
    #[must_use]
    pub fn has_own(&self, key: &str) -> bool {
        self.with_node(|node| node.attrs.contains_key(key))
    }

    /// Sets an attribute on this scope, shadowing any inherited value.
    ///
    /// Does nothing on a destroyed scope.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        if self.is_destroyed() {
            return;
        }
        let key = key.into();
        let value = value.into();
        // The previous value is dropped after the borrow ends.
        let _previous = self.with_node_mut(|node| node.attrs.insert(key, value));
    }

    /// Removes an attribute from this scope, revealing any inherited value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.with_node_mut(|node| node.attrs.remove(key)).flatten()
    }

    /// Returns the keys set directly on this scope.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.with_node(|node| node.attrs.keys().cloned().collect())
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            let (found, next) =
                scope.with_node(|node| (node.attrs.get(key).cloned(), node.inherits.clone()));
            if found.is_some() {
                return found;
            }
            current = next.as_ref().and_then(WeakScope::upgrade);
        }
        None
    }

    // =========================================================================
    // Hierarchy
    // =========================================================================

    /// Creates a child that inherits this scope's attributes.
    #[must_use]
    pub fn spawn(&self) -> Self {
        self.spawn_in(false, self)
    }

    /// Creates a child with its own attribute bag.
    ///
    /// The child still belongs to this tree: it is digested with it and shares
    /// its scheduling queues.
    #[must_use]
    pub fn spawn_isolated(&self) -> Self {
        self.spawn_in(true, self)
    }

    /// Creates a child placed under `hierarchy_parent`.
    ///
    /// A non-isolated child reads attributes through `self`, which may belong
    /// to a different tree. Either way the child lives in `hierarchy_parent`'s
    /// tree: that tree digests it, and its scheduling queues are the ones the
    /// child uses.
    ///
    /// A child spawned under a destroyed scope is destroyed from the start.
    #[must_use]
    pub fn spawn_in(&self, isolated: bool, hierarchy_parent: &Self) -> Self {
        let inherits = (!isolated).then(|| WeakScope::new(self));
        let (id, stillborn) = {
            let mut state = hierarchy_parent.tree.state.borrow_mut();
            if state.node(hierarchy_parent.id).destroyed {
                let id = state.insert(None, None);
                if let Some(node) = state.node_mut(id) {
                    node.destroyed = true;
                }
                (id, state.release(id))
            } else {
                (state.insert(Some(hierarchy_parent.id), inherits), None)
            }
        };
        tracing::debug!(
            parent = %hierarchy_parent.id,
            child = %id,
            isolated,
            destroyed = stillborn.is_some(),
            "spawned scope"
        );
        hierarchy_parent.at(id)
    }

    /// Detaches this scope from its parent and drops its attributes, watchers
    /// and event listeners.
    ///
    /// Later digests of any ancestor no longer reach this scope, and reads
    /// through it find nothing. Descendants are not notified or destroyed; they
    /// simply become unreachable from the tree. Calling `destroy` again, or on
    /// a root, does nothing.
    ///
    /// The scope's arena slot is reused once it has no children left.
    pub fn destroy(&self) {
        if self.is_root() {
            return;
        }
        let released = {
            let mut state = self.tree.state.borrow_mut();
            let Some(node) = state.node_mut(self.id) else {
                return;
            };
            if node.destroyed {
                return;
            }
            node.destroyed = true;
            let parent = node.parent;
            let contents = (
                mem::take(&mut node.attrs),
                node.inherits.take(),
                mem::take(&mut node.watchers),
                mem::take(&mut node.listeners),
            );
            let mut freed = Vec::new();
            if let Some(parent) = parent {
                if let Some(parent_node) = state.node_mut(parent) {
                    parent_node.children.retain(|c| *c != self.id);
                }
                // A destroyed parent kept its slot only for this child.
                freed.extend(state.release(parent));
            }
            freed.extend(state.release(self.id));
            state.last_dirty = None;
            (contents, freed)
        };
        tracing::debug!(scope = %self.id, freed_slots = released.1.len(), "destroyed scope");
        // Drop callbacks and values outside the borrow; they may hold scopes.
        drop(released);
    }

    /// Visits this scope and its live descendants in pre-order.
    ///
    /// Stops as soon as `f` returns `false`, and returns whether the walk ran
    /// to completion.
    pub(crate) fn every_scope(&self, f: &mut dyn FnMut(&Self) -> bool) -> bool {
        let mut pending = vec![self.id];
        while let Some(id) = pending.pop() {
            let scope = self.at(id);
            if scope.is_destroyed() {
                continue;
            }
            if !f(&scope) {
                return false;
            }
            // Read after `f`, which may spawn or destroy children.
            scope.with_node(|node| pending.extend(node.children.iter().rev().copied()));
        }
        true
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.tree, &other.tree) && self.id == other.id
    }
}

impl Eq for Scope {}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Array;

    #[test]
    fn root_basics() {
        let root = Scope::new();
        assert!(root.is_root());
        assert_eq!(root.root(), root);
        assert!(root.parent().is_none());
        assert!(root.children().is_empty());
        assert!(root.phase().is_none());
    }

    #[test]
    fn attributes_on_one_scope() {
        let scope = Scope::new();
        assert!(scope.get("missing").is_undefined());
        assert!(!scope.has("missing"));

        scope.set("a", 1);
        assert_eq!(scope.get("a"), Value::from(1));
        assert_eq!(scope.get_own("a"), Some(Value::from(1)));
        assert!(scope.has_own("a"));
        assert_eq!(scope.keys(), vec![String::from("a")]);

        assert_eq!(scope.remove("a"), Some(Value::from(1)));
        assert!(!scope.has("a"));
    }

    #[test]
    fn undefined_is_a_set_value() {
        let scope = Scope::new();
        scope.set("u", Value::Undefined);
        assert!(scope.has_own("u"));
        assert!(scope.get("u").is_undefined());
    }

    #[test]
    fn child_inherits_whenever_defined() {
        let parent = Scope::new();
        let child = parent.spawn();
        assert!(child.get("a").is_undefined());

        parent.set("a", 42);
        assert_eq!(child.get("a"), Value::from(42));
        assert!(!child.has_own("a"));
    }

    #[test]
    fn parent_does_not_inherit_from_child() {
        let parent = Scope::new();
        let child = parent.spawn();
        child.set("a", 1);
        assert!(parent.get("a").is_undefined());
    }

    #[test]
    fn inheritance_at_any_depth() {
        let a = Scope::new();
        let b = a.spawn();
        let aa = b.spawn();
        let aaa = aa.spawn();
        a.set("value", 1);
        assert_eq!(aaa.get("value"), Value::from(1));
        assert_eq!(aaa.root(), a);
        assert_eq!(aaa.parent(), Some(aa));
    }

    #[test]
    fn shadowing_and_shared_containers() {
        let parent = Scope::new();
        let child = parent.spawn();
        let user = Array::from(vec![Value::from("Joe")]);
        parent.set("user", user.clone());

        child.get("user").as_array().unwrap().push("Jill");
        assert_eq!(user.len(), 2);

        child.set("user", "Jill");
        assert_eq!(parent.get("user").as_array().map(Array::len), Some(2));
        assert_eq!(child.get("user"), Value::from("Jill"));

        child.remove("user");
        assert!(child.get("user").as_array().is_some());
    }

    #[test]
    fn isolated_child_has_own_bag() {
        let parent = Scope::new();
        let child = parent.spawn_isolated();
        parent.set("a", 1);
        assert!(child.get("a").is_undefined());
        assert_eq!(child.root(), parent);
        assert_eq!(child.parent(), Some(parent.clone()));
    }

    #[test]
    fn children_are_recorded_in_order() {
        let parent = Scope::new();
        let a = parent.spawn();
        let b = parent.spawn_isolated();
        assert_eq!(parent.children(), vec![a.clone(), b]);

        let aa = a.spawn();
        assert_eq!(a.children(), vec![aa]);
    }

    #[test]
    fn foreign_hierarchy_parent() {
        let prototype_parent = Scope::new();
        let hierarchy_parent = Scope::new();
        let child = prototype_parent.spawn_in(false, &hierarchy_parent);

        prototype_parent.set("a", 42);
        assert_eq!(child.get("a"), Value::from(42));
        assert_eq!(child.parent(), Some(hierarchy_parent.clone()));
        assert_eq!(child.root(), hierarchy_parent);
        assert!(prototype_parent.children().is_empty());
    }

    #[test]
    fn destroy_detaches_once() {
        let parent = Scope::new();
        let a = parent.spawn();
        let b = parent.spawn();
        a.destroy();
        assert!(a.is_destroyed());
        assert_eq!(parent.children(), vec![b.clone()]);

        a.destroy();
        assert_eq!(parent.children(), vec![b]);

        // A destroyed scope neither keeps nor inherits attributes.
        parent.set("x", 1);
        a.set("y", 2);
        assert!(a.get("x").is_undefined());
        assert!(!a.has_own("y"));
    }

    #[test]
    fn spawn_destroy_churn_reuses_slots() {
        let root = Scope::new();
        for round in 0..10_000 {
            let child = root.spawn();
            child.set("payload", vec![Value::from(round)]);
            child.destroy();
        }
        assert!(root.children().is_empty());
        assert_eq!(root.tree().state.borrow().capacity(), 2);
    }

    #[test]
    fn stale_handles_never_alias_reused_slots() {
        let root = Scope::new();
        let old = root.spawn();
        let watched = old.watch_only(|_| Ok(Value::Null));
        old.destroy();

        let new = root.spawn();
        assert_eq!(new.id().index(), old.id().index());
        assert!(new.id().generation() > old.id().generation());
        assert_ne!(new, old);

        assert!(old.is_destroyed());
        assert!(old.parent().is_none());
        old.set("leak", 1);
        assert!(!new.has_own("leak"));
        old.destroy();
        assert!(!new.is_destroyed());
        assert_eq!(root.children(), vec![new.clone()]);

        // Watchers registered through the stale handle never reach `new`.
        watched.deregister();
        let _ = old.watch(
            |_| Ok(Value::Null),
            |_, _, s| {
                s.set("stale", true);
                Ok(())
            },
        );
        let _ = new.watch(
            |_| Ok(Value::Null),
            |_, _, s| {
                s.set("fresh", true);
                Ok(())
            },
        );
        root.digest().unwrap();
        assert_eq!(new.get("fresh").as_bool(), Some(true));
        assert!(!new.has_own("stale"));
    }

    #[test]
    fn destroyed_parent_slot_waits_for_its_children() {
        let root = Scope::new();
        let a = root.spawn();
        let aa = a.spawn();
        aa.set("kept", true);
        a.destroy();

        // The detached child still works and still names its parent.
        assert!(!aa.is_destroyed());
        assert_eq!(aa.get("kept").as_bool(), Some(true));
        assert_eq!(aa.parent(), Some(a.clone()));
        assert_eq!(root.tree().state.borrow().capacity(), 3);

        aa.destroy();
        let b = root.spawn();
        let c = root.spawn();
        assert_eq!(root.tree().state.borrow().capacity(), 3);
        assert_eq!(root.children(), vec![b, c]);
    }

    #[test]
    fn spawning_under_a_destroyed_scope() {
        let root = Scope::new();
        let a = root.spawn();
        a.destroy();
        let orphan = a.spawn();
        assert!(orphan.is_destroyed());
        assert!(a.children().is_empty());
        assert_eq!(root.tree().state.borrow().capacity(), 2);
    }

    #[test]
    fn every_scope_handles_deep_chains() {
        let root = Scope::new();
        let mut leaf = root.clone();
        for _ in 0..100_000 {
            leaf = leaf.spawn();
        }
        let mut visited = 0;
        assert!(root.every_scope(&mut |_| {
            visited += 1;
            true
        }));
        assert_eq!(visited, 100_001);
    }

    #[test]
    fn destroying_root_is_a_no_op() {
        let root = Scope::new();
        root.destroy();
        assert!(!root.is_destroyed());
    }

    #[test]
    fn every_scope_is_pre_order_and_skips_detached() {
        let root = Scope::new();
        let a = root.spawn();
        let aa = a.spawn();
        let b = root.spawn();
        let bb = b.spawn();

        let mut seen = Vec::new();
        root.every_scope(&mut |s| {
            seen.push(s.id());
            true
        });
        assert_eq!(seen, vec![root.id(), a.id(), aa.id(), b.id(), bb.id()]);

        b.destroy();
        seen.clear();
        root.every_scope(&mut |s| {
            seen.push(s.id());
            true
        });
        assert_eq!(seen, vec![root.id(), a.id(), aa.id()]);
    }

    #[test]
    fn every_scope_stops_early() {
        let root = Scope::new();
        let a = root.spawn();
        let _aa = a.spawn();
        let _b = root.spawn();

        let mut visited = 0;
        let completed = root.every_scope(&mut |s| {
            visited += 1;
            *s != a
        });
        assert!(!completed);
        assert_eq!(visited, 2);
    }
}
