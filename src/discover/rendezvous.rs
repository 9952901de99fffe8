// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The exactly-once gate: a keyed map of one-shot signals so that, across racing authoring
//! tasks for the same key, exactly one actually calls `Resolve`/`Discover` and the rest wait.
//!
//! Deliberately not built on `tokio::sync::OnceCell::get_or_try_init`: on an `Err` path that
//! primitive leaves the cell uninitialized, so a second racer would retry the callback,
//! violating "invoked at most once even on failure". Instead this hand-rolls the signal with
//! an atomic "done" flag plus a `Notify`, closed by an RAII guard so it fires on every exit
//! path including a panic unwind.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::errors::GraphError;

struct Entry {
    done: AtomicBool,
    notify: Notify,
}

impl Entry {
    fn new() -> Self {
        Entry {
            done: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.done.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

/// What the caller got back from [`RendezvousMap::enter`]: either the single author that
/// must do the work, or a waiter holding the same entry to park on.
pub enum Role {
    Author(AuthorTicket),
    Waiter(Arc<Entry>),
}

/// Closes the rendezvous signal exactly once, on every exit path (`Drop` runs during normal
/// return, an early `?`, or an unwinding panic), satisfying the protocol's "exit-on-all-paths"
/// requirement without hand-written cleanup at each return site.
pub struct AuthorTicket {
    entry: Arc<Entry>,
}

impl Drop for AuthorTicket {
    fn drop(&mut self) {
        self.entry.close();
    }
}

/// A concurrent map of `K -> one-shot signal`, guarded by a plain mutex. The critical section
/// (insert-or-observe) is synchronous and tiny, so a `std::sync::Mutex` is the right tool —
/// no need to hold it across an `.await`.
pub struct RendezvousMap<K> {
    entries: Mutex<HashMap<K, Arc<Entry>>>,
}

impl<K: Eq + Hash + Clone> RendezvousMap<K> {
    pub fn new() -> Self {
        RendezvousMap { entries: Mutex::new(HashMap::new()) }
    }

    /// Atomically becomes the author for `key`, or observes the existing signal as a waiter.
    /// This single insert-or-observe step is the exactly-once gate.
    pub fn enter(&self, key: &K) -> Role {
        let mut guard = self.entries.lock().expect("rendezvous map mutex poisoned");
        if let Some(existing) = guard.get(key) {
            return Role::Waiter(existing.clone());
        }
        let entry = Arc::new(Entry::new());
        guard.insert(key.clone(), entry.clone());
        Role::Author(AuthorTicket { entry })
    }

    /// Waits for the author holding `entry` to finish, or for cancellation, whichever first.
    pub async fn wait(entry: &Arc<Entry>, cancel: &CancellationToken) -> Result<(), GraphError> {
        loop {
            if entry.is_done() {
                return Ok(());
            }
            let notified = entry.notify.notified();
            if entry.is_done() {
                return Ok(());
            }
            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => return Err(GraphError::Cancelled),
            }
        }
    }
}

impl<K: Eq + Hash + Clone> Default for RendezvousMap<K> {
    fn default() -> Self {
        RendezvousMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_entrant_for_same_key_becomes_waiter() {
        let map: RendezvousMap<String> = RendezvousMap::new();
        let role_a = map.enter(&"a".to_string());
        assert!(matches!(role_a, Role::Author(_)));
        let role_b = map.enter(&"a".to_string());
        assert!(matches!(role_b, Role::Waiter(_)));
    }

    #[tokio::test]
    async fn waiter_is_released_when_author_drops() {
        let map: RendezvousMap<String> = RendezvousMap::new();
        let cancel = CancellationToken::new();
        let author = match map.enter(&"a".to_string()) {
            Role::Author(ticket) => ticket,
            Role::Waiter(_) => panic!("expected author"),
        };
        let waiter_entry = match map.enter(&"a".to_string()) {
            Role::Waiter(entry) => entry,
            Role::Author(_) => panic!("expected waiter"),
        };

        let waiting = tokio::spawn(async move { RendezvousMap::<String>::wait(&waiter_entry, &cancel).await });
        drop(author);
        waiting.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn waiter_observes_cancellation() {
        let map: RendezvousMap<String> = RendezvousMap::new();
        let cancel = CancellationToken::new();
        let _author = match map.enter(&"a".to_string()) {
            Role::Author(ticket) => ticket,
            Role::Waiter(_) => panic!("expected author"),
        };
        let waiter_entry = match map.enter(&"a".to_string()) {
            Role::Waiter(entry) => entry,
            Role::Author(_) => panic!("expected waiter"),
        };
        cancel.cancel();
        let result = RendezvousMap::<String>::wait(&waiter_entry, &cancel).await;
        assert!(matches!(result, Err(GraphError::Cancelled)));
    }
}
