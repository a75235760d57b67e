// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Scope: a dirty-checking scope tree.
//!
//! This crate is the change-propagation core of a declarative binding layer.
//! State lives on [`Scope`]s arranged in a tree; watchers registered on a scope
//! observe derived values, and a digest re-evaluates them until nothing
//! changes.
//!
//! ## Core Concepts
//!
//! ### Scopes
//!
//! A [`Scope`] is an open bag of [`Value`] attributes. A child created with
//! [`Scope::spawn`] reads through to its parent for keys it does not set
//! itself; [`Scope::spawn_isolated`] creates a child with its own bag that is
//! still digested with the tree.
//!
//! ### Watchers and the digest
//!
//! [`Scope::watch`] registers a watch function and a listener. [`Scope::digest`]
//! evaluates watchers across the subtree, calls listeners for values that
//! changed and repeats until a pass is clean. Cyclic watchers that never settle
//! make the digest fail with [`ScopeError::Convergence`].
//!
//! ### Scheduling
//!
//! - [`Scope::apply`] runs a mutation and then digests the whole tree.
//! - [`Scope::eval_async`] defers work to the current or next digest.
//! - [`Scope::apply_async`] coalesces many mutations into one deferred apply.
//! - [`Scope::post_digest`] runs work after the next digest settles.
//!
//! Deferred digests go through a [`Scheduler`], the boundary to the host
//! event loop. [`TaskQueue`] is a simple implementation a host can pump; a
//! tree built without a scheduler uses one, available from
//! [`Scope::task_queue`].
//!
//! ### Events
//!
//! [`Scope::emit`] sends an [`Event`] up through the ancestors and can be
//! stopped; [`Scope::broadcast`] sends one down through the subtree.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::rc::Rc;
//! use understory_scope::{Scope, TaskQueue, Value};
//!
//! let queue = Rc::new(TaskQueue::new());
//! let root = Scope::builder().scheduler(queue.clone()).build();
//! let child = root.spawn();
//!
//! // Derive `greeting` from `name`, which the child inherits.
//! let _ = child.watch(
//!     |s| Ok(s.get("name")),
//!     |name, _, s| {
//!         if let Some(name) = name.as_str() {
//!             s.set("greeting", format!("Hello, {name}!"));
//!         }
//!         Ok(())
//!     },
//! );
//!
//! root.apply(|s| {
//!     s.set("name", "Ada");
//!     Ok(())
//! })
//! .unwrap();
//! assert_eq!(child.get("greeting"), Value::from("Hello, Ada!"));
//!
//! // Coalesced updates land on a later turn of the event loop.
//! root.apply_async(|s| {
//!     s.set("name", "Grace");
//!     Ok(())
//! });
//! assert_eq!(child.get("greeting"), Value::from("Hello, Ada!"));
//! queue.run_until_idle();
//! assert_eq!(child.get("greeting"), Value::from("Hello, Grace!"));
//! ```
//!
//! ## Errors
//!
//! Only digest convergence failures and phase conflicts are returned to the
//! caller. Errors raised by callbacks are contained where the callback runs and
//! passed to the tree's [`ErrorHandler`], which by default logs them with
//! `tracing`.
//!
//! ## Threading
//!
//! Scopes are single-threaded (`!Send`). All deferred work runs on the thread
//! that owns the tree.

mod collection;
mod config;
mod digest;
mod equality;
mod error;
mod event;
mod id;
mod queue;
mod schedule;
mod scope;
mod tree;
mod value;
mod watch;

pub use config::{DEFAULT_DIGEST_TTL, ScopeBuilder};
pub use equality::{Equality, are_equal, snapshot};
pub use error::{CallbackError, CallbackResult, CallbackSource, ErrorHandler, ScopeError};
pub use event::Event;
pub use id::ScopeId;
pub use schedule::{Scheduler, Task, TaskHandle, TaskQueue};
pub use scope::Scope;
pub use tree::Phase;
pub use value::{Array, HostValue, Object, Value};
pub use watch::{Deregistration, WatchFn, watch_fn};
