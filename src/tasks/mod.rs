//! Task storage seam and the stateless mutation path.
//!
//! Task content is owned by an external store reached through [`TaskStore`].
//! [`MemoryTaskStore`] is the in-process stand-in used by the server and
//! tests. Requests that change or delete a task pass through the
//! [`MutationGate`](crate::gate::MutationGate) before the store is touched;
//! see [`service`].

mod requests;
pub mod service;


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use requests::{TaskEvent, TaskPatch};
pub use service::{TaskAck, TaskReply};

/// A task as stored and broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storage operations the mutation path needs.
pub trait TaskStore: Send {
    fn list(&self) -> Vec<Task>;
    fn get(&self, id: &str) -> Option<Task>;
    fn create(&mut self, title: &str) -> Task;
    /// Apply `patch`; `None` if no such task.
    fn update(&mut self, id: &str, patch: &TaskPatch) -> Option<Task>;
    /// Remove the task; `None` if no such task.
    fn delete(&mut self, id: &str) -> Option<Task>;
}

/// In-memory task store with sequential ids (`task-1`, `task-2`, ...).
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: BTreeMap<String, Task>,
    next_id: u64,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for MemoryTaskStore {
    fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tasks
    }

    fn get(&self, id: &str) -> Option<Task> {
        self.tasks.get(id).cloned()
    }

    fn create(&mut self, title: &str) -> Task {
        self.next_id += 1;
        let now = Utc::now();
        let task = Task {
            id: format!("task-{}", self.next_id),
            title: title.trim().to_string(),
            completed: false,
            created_at: now,
            updated_at: now,
        };
        self.tasks.insert(task.id.clone(), task.clone());
        task
    }

    fn update(&mut self, id: &str, patch: &TaskPatch) -> Option<Task> {
        let task = self.tasks.get_mut(id)?;
        if let Some(title) = &patch.title {
            task.title = title.trim().to_string();
        }
        if let Some(completed) = patch.completed {
            task.completed = completed;
        }
        task.updated_at = Utc::now();
        Some(task.clone())
    }

    fn delete(&mut self, id: &str) -> Option<Task> {
        self.tasks.remove(id)
    }
}
