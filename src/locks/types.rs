//! Lock record and failure types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exclusive ownership of one task by one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lock {
    /// The locked task.
    pub task_id: String,

    /// Session that currently owns the lock.
    pub owner: String,

    /// Capability token, stable for the lifetime of this lock.
    pub token: String,

    /// When the lock was created. Informational only; nothing expires on it.
    pub acquired_at: DateTime<Utc>,
}

impl Lock {
    pub(super) fn new(task_id: &str, owner: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            owner: owner.to_string(),
            token: uuid::Uuid::new_v4().to_string(),
            acquired_at: Utc::now(),
        }
    }

    /// Whether `token` is this lock's capability token.
    pub fn matches_token(&self, token: &str) -> bool {
        self.token == token
    }
}

/// Wire-level failure reasons carried in negative acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockReason {
    /// Another session holds the lock.
    AlreadyLocked,
    /// The caller neither owns the lock nor presented its token.
    NotOwner,
    /// No lock exists for the task.
    InvalidTask,
    /// The request payload failed validation; no state was touched.
    BadPayload,
}

impl std::fmt::Display for LockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockReason::AlreadyLocked => write!(f, "ALREADY_LOCKED"),
            LockReason::NotOwner => write!(f, "NOT_OWNER"),
            LockReason::InvalidTask => write!(f, "INVALID_TASK"),
            LockReason::BadPayload => write!(f, "BAD_PAYLOAD"),
        }
    }
}

/// Ownership conflicts reported by the coordinator.
///
/// These are recoverable, per-request outcomes. None of them change state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The task is held by a different session.
    #[error("task '{task_id}' is locked by session '{owner}'")]
    AlreadyLocked { task_id: String, owner: String },

    /// The caller is not the owner and presented no matching token.
    #[error("session does not own the lock on task '{0}'")]
    NotOwner(String),

    /// There is no lock on the task.
    #[error("task '{0}' is not locked")]
    InvalidTask(String),
}

impl LockError {
    /// The reason code sent back to the client.
    pub fn reason(&self) -> LockReason {
        match self {
            LockError::AlreadyLocked { .. } => LockReason::AlreadyLocked,
            LockError::NotOwner(_) => LockReason::NotOwner,
            LockError::InvalidTask(_) => LockReason::InvalidTask,
        }
    }

    /// The current owner, when the failure discloses one.
    pub fn owner(&self) -> Option<&str> {
        match self {
            LockError::AlreadyLocked { owner, .. } => Some(owner),
            _ => None,
        }
    }
}
