// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Identifier types.
//!
//! [`ScopeId`] addresses a node in its tree's arena. [`WatchId`] identifies a
//! watcher within a tree and is what the digest's short-circuit marker records.

use core::fmt;

/// Identifier for a scope within its tree.
///
/// An arena slot index plus a generation counter.
///
/// - A fresh slot starts at generation `1`.
/// - Once a destroyed scope has no children left, its slot is freed and its
///   generation incremented, so every id that pointed to it is stale.
/// - A reused slot keeps that new generation, so a stale id never aliases the
///   scope that now lives there.
///
/// Scope handles holding a stale id behave like destroyed scopes. The root is
/// always slot `0`, generation `1`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(u32, u32);

impl ScopeId {
    /// The id of every tree's root scope.
    pub const ROOT: Self = Self(0, 1);

    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self(index, generation)
    }

    /// Returns the underlying arena index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) const fn slot(self) -> u32 {
        self.0
    }

    /// Returns the slot's generation at the time this id was handed out.
    #[must_use]
    #[inline]
    pub const fn generation(self) -> u32 {
        self.1
    }
}

impl fmt::Debug for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScopeId").field(&self.0).field(&self.1).finish()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeId({}v{})", self.0, self.1)
    }
}

/// Identifier for a watcher, unique within its tree.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct WatchId(u64);

impl WatchId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WatchId").field(&self.0).finish()
    }
}
