//! Typed payload validation for lock requests.
//!
//! Payloads are checked completely before any coordinator call, so a
//! rejected payload never touches lock state.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// `{taskId}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRef {
    pub task_id: String,
}

/// `{taskId, token?}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleasePayload {
    pub task_id: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("taskId is required")]
    MissingTaskId,

    #[error("token must be a non-empty string")]
    EmptyToken,
}

/// Validate `{taskId}` with a non-empty task id.
pub fn parse_task_ref(data: &Value) -> Result<TaskRef, PayloadError> {
    let payload =
        TaskRef::deserialize(data).map_err(|e| PayloadError::Malformed(e.to_string()))?;
    require_task_id(&payload.task_id)?;
    Ok(payload)
}

/// Validate `{taskId, token?}`. A present token must be non-empty.
pub fn parse_release(data: &Value) -> Result<ReleasePayload, PayloadError> {
    let payload =
        ReleasePayload::deserialize(data).map_err(|e| PayloadError::Malformed(e.to_string()))?;
    require_task_id(&payload.task_id)?;
    if payload.token.as_deref().is_some_and(str::is_empty) {
        return Err(PayloadError::EmptyToken);
    }
    Ok(payload)
}

fn require_task_id(task_id: &str) -> Result<(), PayloadError> {
    if task_id.is_empty() {
        return Err(PayloadError::MissingTaskId);
    }
    Ok(())
}
