// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! A single reader/writer lock around a [`Dag`], with scoped critical sections.
//!
//! Grounded on the wrapper pattern in `aura-agent/src/database/wrapper.rs` (a `parking_lot`
//! `RwLock` guarding mutable state behind an otherwise-async API), adapted to the DAG store.
//! `parking_lot` is not part of this codebase's existing stack; it is pulled in specifically
//! for this synchronous, never-held-across-`.await` lock (see DESIGN.md).

use std::hash::Hash;

use parking_lot::RwLock;

use crate::store::Dag;

/// Wraps a [`Dag`] behind one reader/writer lock. `with_read`/`with_write` are the only way
/// to touch the inner store; both run their closure synchronously while holding the lock and
/// release it before returning, so no callback ever executes while the lock is held.
pub struct ConcurrentDag<K, V>
where
    K: Ord + Hash + Clone,
{
    inner: RwLock<Dag<K, V>>,
}

impl<K, V> ConcurrentDag<K, V>
where
    K: Ord + Hash + Clone,
{
    pub fn new(dag: Dag<K, V>) -> Self {
        ConcurrentDag { inner: RwLock::new(dag) }
    }

    /// Runs `f` with a shared read lock held. Readers never block other readers.
    pub fn with_read<R>(&self, f: impl FnOnce(&Dag<K, V>) -> R) -> R {
        let guard = self.inner.read();
        f(&guard)
    }

    /// Runs `f` with the exclusive write lock held. Writers block everyone.
    pub fn with_write<R>(&self, f: impl FnOnce(&mut Dag<K, V>) -> R) -> R {
        let mut guard = self.inner.write();
        f(&mut guard)
    }

    /// Takes a snapshot clone of the current graph without holding the lock for the
    /// duration of whatever the caller does with it next.
    pub fn snapshot(&self) -> Dag<K, V> {
        self.with_read(|dag| dag.clone())
    }
}

impl<K, V> Default for ConcurrentDag<K, V>
where
    K: Ord + Hash + Clone,
{
    fn default() -> Self {
        ConcurrentDag::new(Dag::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn read_and_write_see_each_other() {
        let wrapper: ConcurrentDag<String, ()> = ConcurrentDag::default();
        wrapper.with_write(|dag| dag.add_vertex("a".to_string(), vec![HashMap::new()]));
        let len = wrapper.with_read(|dag| dag.len());
        assert_eq!(len, 1);
    }

    #[test]
    fn snapshot_is_independent() {
        let wrapper: ConcurrentDag<String, ()> = ConcurrentDag::default();
        wrapper.with_write(|dag| dag.add_vertex("a".to_string(), vec![HashMap::new()]));
        let snap = wrapper.snapshot();
        wrapper.with_write(|dag| dag.add_vertex("b".to_string(), vec![HashMap::new()]));
        assert_eq!(snap.len(), 1);
        assert_eq!(wrapper.with_read(|dag| dag.len()), 2);
    }
}
