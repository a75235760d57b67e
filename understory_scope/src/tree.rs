// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Arena storage shared by every scope of one tree.
//!
//! A tree owns its nodes in a flat vector addressed by [`ScopeId`], plus the
//! state that exists once per tree: the active phase, the digest's
//! short-circuit marker and the three scheduling queues. Scope handles hold an
//! `Rc` to the tree; nothing inside the tree holds a strong reference back to
//! it, so dropping the last handle frees everything.
//!
//! Slots of destroyed scopes go on a free list once they have no children and
//! are handed out again with a bumped generation.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::error::{CallbackError, CallbackResult, CallbackSource, ErrorHandler, ScopeError};
use crate::event::ListenerList;
use crate::id::{ScopeId, WatchId};
use crate::schedule::{Scheduler, Task, TaskHandle, TaskQueue};
use crate::scope::Scope;
use crate::value::Value;
use crate::watch::WatchList;

/// The mutually exclusive activities a tree can be in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// A function passed to `apply` is running.
    Apply,
    /// A digest is running.
    Digest,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Apply => "apply",
            Self::Digest => "digest",
        })
    }
}

/// A task queued against a specific scope, run later with that scope.
pub(crate) struct Deferred {
    pub(crate) scope: ScopeId,
    pub(crate) task: Box<dyn FnOnce(&Scope) -> CallbackResult>,
}

impl Deferred {
    pub(crate) fn new(scope: ScopeId, task: impl FnOnce(&Scope) -> CallbackResult + 'static) -> Self {
        Self {
            scope,
            task: Box::new(task),
        }
    }
}

/// A non-owning scope handle, used for attribute inheritance.
#[derive(Clone)]
pub(crate) struct WeakScope {
    tree: Weak<Tree>,
    id: ScopeId,
}

impl WeakScope {
    pub(crate) fn new(scope: &Scope) -> Self {
        Self {
            tree: Rc::downgrade(scope.tree()),
            id: scope.id(),
        }
    }

    pub(crate) fn upgrade(&self) -> Option<Scope> {
        self.tree
            .upgrade()
            .map(|tree| Scope::from_parts(tree, self.id))
    }
}

/// One scope's storage.
pub(crate) struct Node {
    /// Attributes set directly on this scope.
    pub(crate) attrs: HashMap<String, Value>,
    /// Where unset attributes are read from; `None` for roots and isolated scopes.
    pub(crate) inherits: Option<WeakScope>,
    /// Hierarchy parent within this tree.
    pub(crate) parent: Option<ScopeId>,
    pub(crate) children: SmallVec<[ScopeId; 4]>,
    pub(crate) watchers: WatchList,
    pub(crate) listeners: HashMap<Rc<str>, ListenerList>,
    pub(crate) destroyed: bool,
    generation: u32,
}

impl Node {
    fn new(parent: Option<ScopeId>, inherits: Option<WeakScope>, generation: u32) -> Self {
        Self {
            attrs: HashMap::new(),
            inherits,
            parent,
            children: SmallVec::new(),
            watchers: WatchList::default(),
            listeners: HashMap::new(),
            destroyed: false,
            generation,
        }
    }

    /// An empty, destroyed node.
    fn vacant(generation: u32) -> Self {
        Self {
            destroyed: true,
            ..Self::new(None, None, generation)
        }
    }
}

/// Mutable per-tree state.
pub(crate) struct TreeState {
    nodes: Vec<Node>,
    /// Freed slot indices, reused last-in first-out.
    free: Vec<u32>,
    /// What stale ids resolve to.
    vacant: Node,
    pub(crate) phase: Option<Phase>,
    /// The last watcher found dirty; reaching it clean again ends a pass.
    pub(crate) last_dirty: Option<WatchId>,
    pub(crate) next_watch_id: u64,
    pub(crate) async_queue: VecDeque<Deferred>,
    pub(crate) apply_async_queue: VecDeque<Deferred>,
    pub(crate) apply_async_pending: Option<TaskHandle>,
    pub(crate) post_digest_queue: VecDeque<Deferred>,
    /// Nesting depth of event firing; listener lists are compacted only at zero.
    pub(crate) firing_depth: usize,
}

impl TreeState {
    /// Returns the node for `id`, or an empty destroyed node if `id` is stale.
    pub(crate) fn node(&self, id: ScopeId) -> &Node {
        match self.nodes.get(id.index()) {
            Some(node) if node.generation == id.generation() => node,
            _ => &self.vacant,
        }
    }

    /// Returns the node for `id`, or `None` if `id` is stale.
    pub(crate) fn node_mut(&mut self, id: ScopeId) -> Option<&mut Node> {
        self.nodes
            .get_mut(id.index())
            .filter(|node| node.generation == id.generation())
    }

    /// Number of slots, live or not.
    pub(crate) fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Allocates a node, reusing a freed slot when there is one, and links it
    /// under `parent` when given.
    pub(crate) fn insert(&mut self, parent: Option<ScopeId>, inherits: Option<WeakScope>) -> ScopeId {
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.nodes[index as usize];
                let generation = slot.generation;
                *slot = Node::new(parent, inherits, generation);
                ScopeId::new(index, generation)
            }
            None => {
                let index = u32::try_from(self.nodes.len()).expect("scope arena exhausted");
                self.nodes.push(Node::new(parent, inherits, 1));
                ScopeId::new(index, 1)
            }
        };
        if let Some(node) = parent.and_then(|parent| self.node_mut(parent)) {
            node.children.push(id);
        }
        id
    }

    /// Frees the slot of `id` if it is destroyed and has no children left.
    ///
    /// Returns the dropped node so the caller can release it outside the
    /// borrow.
    pub(crate) fn release(&mut self, id: ScopeId) -> Option<Node> {
        let node = self.node_mut(id)?;
        if !node.destroyed || !node.children.is_empty() {
            return None;
        }
        // Bumping the generation here makes every outstanding id stale at once.
        let freed = mem::replace(node, Node::vacant(id.generation().wrapping_add(1)));
        self.free.push(id.slot());
        Some(freed)
    }

    pub(crate) fn allocate_watch_id(&mut self) -> WatchId {
        let id = WatchId::new(self.next_watch_id);
        self.next_watch_id += 1;
        id
    }
}

/// Where a tree's deferred digests go.
pub(crate) enum TreeScheduler {
    /// A scheduler supplied by the host.
    Host(Rc<dyn Scheduler>),
    /// The built-in queue, and whether the host has asked for it yet.
    BuiltIn {
        queue: Rc<TaskQueue>,
        claimed: Cell<bool>,
    },
}

/// A scope tree: arena, shared scheduling state and configuration.
pub(crate) struct Tree {
    pub(crate) state: RefCell<TreeState>,
    scheduler: TreeScheduler,
    pub(crate) error_handler: ErrorHandler,
    pub(crate) digest_ttl: usize,
}

impl Tree {
    pub(crate) fn new(
        scheduler: TreeScheduler,
        error_handler: ErrorHandler,
        digest_ttl: usize,
    ) -> Self {
        let mut state = TreeState {
            nodes: Vec::new(),
            free: Vec::new(),
            vacant: Node::vacant(0),
            phase: None,
            last_dirty: None,
            next_watch_id: 0,
            async_queue: VecDeque::new(),
            apply_async_queue: VecDeque::new(),
            apply_async_pending: None,
            post_digest_queue: VecDeque::new(),
            firing_depth: 0,
        };
        let root = state.insert(None, None);
        debug_assert_eq!(root, ScopeId::ROOT, "root must occupy the first slot");
        Self {
            state: RefCell::new(state),
            scheduler,
            error_handler,
            digest_ttl,
        }
    }

    /// Hands `task` to the scheduler.
    pub(crate) fn schedule(&self, task: Task) -> TaskHandle {
        match &self.scheduler {
            TreeScheduler::Host(scheduler) => scheduler.schedule(task),
            TreeScheduler::BuiltIn { queue, claimed } => {
                if !claimed.replace(true) {
                    tracing::warn!(
                        "deferred work was scheduled on the built-in task queue before \
                         anyone asked for it; call `Scope::task_queue` and pump it, or \
                         configure a scheduler"
                    );
                }
                queue.schedule(task)
            }
        }
    }

    pub(crate) fn cancel(&self, handle: TaskHandle) -> bool {
        match &self.scheduler {
            TreeScheduler::Host(scheduler) => scheduler.cancel(handle),
            TreeScheduler::BuiltIn { queue, .. } => queue.cancel(handle),
        }
    }

    /// Returns the built-in queue, if this tree uses one.
    pub(crate) fn claim_default_queue(&self) -> Option<Rc<TaskQueue>> {
        match &self.scheduler {
            TreeScheduler::Host(_) => None,
            TreeScheduler::BuiltIn { queue, claimed } => {
                claimed.set(true);
                Some(queue.clone())
            }
        }
    }

    pub(crate) fn begin_phase(&self, requested: Phase) -> Result<(), ScopeError> {
        let mut state = self.state.borrow_mut();
        if let Some(active) = state.phase {
            return Err(ScopeError::PhaseConflict { active, requested });
        }
        state.phase = Some(requested);
        Ok(())
    }

    pub(crate) fn clear_phase(&self) {
        self.state.borrow_mut().phase = None;
    }

    pub(crate) fn clear_last_dirty(&self) {
        self.state.borrow_mut().last_dirty = None;
    }

    /// Hands a contained failure to the configured handler.
    ///
    /// Must be called without the state borrowed; the handler may touch scopes.
    pub(crate) fn report(&self, source: CallbackSource, error: &CallbackError) {
        (self.error_handler)(source, error);
    }
}
