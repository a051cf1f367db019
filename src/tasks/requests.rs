//! Task request names and body validation.

use serde::Deserialize;
use serde_json::Value;

/// Task requests on the stateless path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    /// `task:list {}`
    List,
    /// `task:get {taskId}`
    Get,
    /// `task:create {title}`
    Create,
    /// `task:update {taskId, title?, completed?}` (gated)
    Update,
    /// `task:delete {taskId}` (gated)
    Delete,
}

impl TaskEvent {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "task:list" => Some(Self::List),
            "task:get" => Some(Self::Get),
            "task:create" => Some(Self::Create),
            "task:update" => Some(Self::Update),
            "task:delete" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskEvent::List => "task:list",
            TaskEvent::Get => "task:get",
            TaskEvent::Create => "task:create",
            TaskEvent::Update => "task:update",
            TaskEvent::Delete => "task:delete",
        }
    }
}

/// Fields an update may change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetBody {
    task_id: String,
}

#[derive(Deserialize)]
struct CreateBody {
    title: String,
}

/// Extract the target task id. Checked before the gate, like a path param.
/// A non-string id is answered the same as a blank one.
pub(super) fn parse_target(data: &Value) -> Result<String, String> {
    let body = TargetBody::deserialize(data).map_err(|_| "Invalid ID format".to_string())?;
    if body.task_id.trim().is_empty() {
        return Err("Invalid ID format".to_string());
    }
    Ok(body.task_id)
}

/// Validate a create body: a title that is non-empty after trimming.
pub(super) fn parse_create(data: &Value) -> Result<String, String> {
    let body = CreateBody::deserialize(data).map_err(|_| "Task title is required".to_string())?;
    if body.title.trim().is_empty() {
        return Err("Task title cannot be empty".to_string());
    }
    Ok(body.title)
}

/// Validate an update body: at least one field, and no blank title.
pub(super) fn parse_patch(data: &Value) -> Result<TaskPatch, String> {
    let patch = TaskPatch::deserialize(data).map_err(|e| format!("Validation error: {}", e))?;
    if patch.title.is_none() && patch.completed.is_none() {
        return Err("At least one field is required for update".to_string());
    }
    if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err("Task title cannot be empty".to_string());
    }
    Ok(patch)
}
