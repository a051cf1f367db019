//! Ownership table and session index.

use super::types::Lock;
use std::collections::{HashMap, HashSet};

/// The two lock tables, mutated only through methods that keep them in step.
///
/// Invariants:
/// - `locks[t].owner == s` iff `t` is in `sessions[s]`
/// - no entry in `sessions` is ever an empty set
#[derive(Debug, Default)]
pub(super) struct LockTable {
    locks: HashMap<String, Lock>,
    sessions: HashMap<String, HashSet<String>>,
}

impl LockTable {
    pub(super) fn get(&self, task_id: &str) -> Option<&Lock> {
        self.locks.get(task_id)
    }

    /// Insert a lock for a currently unlocked task.
    pub(super) fn insert(&mut self, lock: Lock) {
        debug_assert!(!self.locks.contains_key(&lock.task_id));
        self.sessions
            .entry(lock.owner.clone())
            .or_default()
            .insert(lock.task_id.clone());
        self.locks.insert(lock.task_id.clone(), lock);
    }

    /// Remove the lock on `task_id`, dropping it from its owner's index entry.
    pub(super) fn remove(&mut self, task_id: &str) -> Option<Lock> {
        let lock = self.locks.remove(task_id)?;
        if let Some(held) = self.sessions.get_mut(&lock.owner) {
            held.remove(task_id);
            if held.is_empty() {
                self.sessions.remove(&lock.owner);
            }
        }
        Some(lock)
    }

    /// Remove every lock held by `session_id`, returning the freed task ids.
    pub(super) fn remove_session(&mut self, session_id: &str) -> Vec<String> {
        let Some(held) = self.sessions.remove(session_id) else {
            return Vec::new();
        };

        let mut released: Vec<String> = held.into_iter().collect();
        released.sort();
        for task_id in &released {
            self.locks.remove(task_id);
        }
        released
    }

    pub(super) fn held_by(&self, session_id: &str) -> Vec<String> {
        let mut held: Vec<String> = self
            .sessions
            .get(session_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        held.sort();
        held
    }

    pub(super) fn locks(&self) -> impl Iterator<Item = &Lock> {
        self.locks.values()
    }

    pub(super) fn session_count(&self) -> usize {
        self.sessions.len()
    }

    #[cfg(test)]
    pub(super) fn is_consistent(&self) -> bool {
        let indexed: usize = self.sessions.values().map(HashSet::len).sum();
        indexed == self.locks.len()
            && self.sessions.values().all(|set| !set.is_empty())
            && self.locks.values().all(|lock| {
                self.sessions
                    .get(&lock.owner)
                    .is_some_and(|set| set.contains(&lock.task_id))
            })
    }
}
