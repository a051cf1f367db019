//! Acquire, release, and disconnect cleanup.

use super::table::LockTable;
use super::types::{Lock, LockError};

/// Authoritative, in-memory lock coordinator.
///
/// Every method completes synchronously and leaves both tables consistent.
/// The coordinator is not `Sync`-shared; callers serialize access by giving a
/// single owner (the dispatcher) exclusive use of it.
#[derive(Debug, Default)]
pub struct LockCoordinator {
    table: LockTable,
}

impl LockCoordinator {
    /// Create a coordinator with empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock on `task_id` for `session_id`.
    ///
    /// # Returns
    ///
    /// * `Ok(Lock)` - A fresh lock, or the caller's existing lock (same token)
    /// * `Err(LockError::AlreadyLocked)` - Another session holds it; nothing changes
    pub fn acquire(&mut self, task_id: &str, session_id: &str) -> Result<Lock, LockError> {
        if let Some(current) = self.table.get(task_id) {
            if current.owner == session_id {
                return Ok(current.clone());
            }
            return Err(LockError::AlreadyLocked {
                task_id: task_id.to_string(),
                owner: current.owner.clone(),
            });
        }

        let lock = Lock::new(task_id, session_id);
        self.table.insert(lock.clone());
        Ok(lock)
    }

    /// Release the lock on `task_id`.
    ///
    /// The owner may always release. Any other caller may release only by
    /// presenting the lock's token.
    ///
    /// # Returns
    ///
    /// * `Ok(Lock)` - The destroyed lock
    /// * `Err(LockError::InvalidTask)` - The task is not locked
    /// * `Err(LockError::NotOwner)` - Caller is not the owner and has no matching token
    pub fn release(
        &mut self,
        task_id: &str,
        session_id: &str,
        token: Option<&str>,
    ) -> Result<Lock, LockError> {
        let current = self
            .table
            .get(task_id)
            .ok_or_else(|| LockError::InvalidTask(task_id.to_string()))?;

        let is_owner = current.owner == session_id;
        let has_token = token.is_some_and(|t| current.matches_token(t));
        if !is_owner && !has_token {
            return Err(LockError::NotOwner(task_id.to_string()));
        }

        self.table
            .remove(task_id)
            .ok_or_else(|| LockError::InvalidTask(task_id.to_string()))
    }

    /// Release every lock held by `session_id`.
    ///
    /// Returns the freed task ids (sorted). A session holding nothing yields
    /// an empty list.
    pub fn release_all(&mut self, session_id: &str) -> Vec<String> {
        self.table.remove_session(session_id)
    }

    /// Current lock on `task_id`, if any.
    pub fn query(&self, task_id: &str) -> Option<&Lock> {
        self.table.get(task_id)
    }

    /// Task ids currently held by `session_id` (sorted).
    pub fn held_by(&self, session_id: &str) -> Vec<String> {
        self.table.held_by(session_id)
    }

    /// Snapshot of every active lock, ordered by task id.
    pub fn active_locks(&self) -> Vec<Lock> {
        let mut locks: Vec<Lock> = self.table.locks().cloned().collect();
        locks.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        locks
    }

    /// Number of sessions holding at least one lock.
    pub fn session_count(&self) -> usize {
        self.table.session_count()
    }

    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        self.table.is_consistent()
    }
}
