//! Per-task notification channels.
//!
//! A session is a member of a task's channel while it owns the task's lock,
//! or while it explicitly watches the task. The two reasons are tracked
//! separately so releasing a lock does not cancel a watch.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Membership {
    owner: bool,
    watcher: bool,
}

impl Membership {
    fn is_empty(&self) -> bool {
        !self.owner && !self.watcher
    }
}

/// Channel membership with a reverse index for disconnect cleanup.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, HashMap<String, Membership>>,
    by_session: HashMap<String, HashSet<String>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join_as_owner(&mut self, task_id: &str, session_id: &str) {
        self.update(task_id, session_id, |m| m.owner = true);
    }

    pub fn leave_as_owner(&mut self, task_id: &str, session_id: &str) {
        self.update(task_id, session_id, |m| m.owner = false);
    }

    pub fn watch(&mut self, task_id: &str, session_id: &str) {
        self.update(task_id, session_id, |m| m.watcher = true);
    }

    pub fn unwatch(&mut self, task_id: &str, session_id: &str) {
        self.update(task_id, session_id, |m| m.watcher = false);
    }

    /// Remove a session from every channel it belongs to.
    pub fn drop_session(&mut self, session_id: &str) {
        let Some(task_ids) = self.by_session.remove(session_id) else {
            return;
        };
        for task_id in task_ids {
            if let Some(channel) = self.channels.get_mut(&task_id) {
                channel.remove(session_id);
                if channel.is_empty() {
                    self.channels.remove(&task_id);
                }
            }
        }
    }

    /// Sessions subscribed to `task_id`, sorted.
    pub fn members(&self, task_id: &str) -> Vec<String> {
        let mut members: Vec<String> = self
            .channels
            .get(task_id)
            .map(|channel| channel.keys().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    #[cfg(test)]
    pub(crate) fn is_member(&self, task_id: &str, session_id: &str) -> bool {
        self.channels
            .get(task_id)
            .is_some_and(|channel| channel.contains_key(session_id))
    }

    fn update(&mut self, task_id: &str, session_id: &str, f: impl FnOnce(&mut Membership)) {
        let channel = self.channels.entry(task_id.to_string()).or_default();
        let membership = channel.entry(session_id.to_string()).or_default();
        f(membership);

        if !membership.is_empty() {
            self.by_session
                .entry(session_id.to_string())
                .or_default()
                .insert(task_id.to_string());
            return;
        }

        channel.remove(session_id);
        if channel.is_empty() {
            self.channels.remove(task_id);
        }
        if let Some(task_ids) = self.by_session.get_mut(session_id) {
            task_ids.remove(task_id);
            if task_ids.is_empty() {
                self.by_session.remove(session_id);
            }
        }
    }
}
