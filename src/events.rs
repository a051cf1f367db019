//! Audit logging for tasklock.
//!
//! Lock activity is appended to an NDJSON file (one JSON object per line)
//! when `events_path` is configured. Each event has:
//! - `ts`: RFC3339 timestamp
//! - `action`: what happened (lock_acquired, lock_released, ...)
//! - `actor`: the server instance (`user@HOST`)
//! - `task`: optional task id
//! - `session`: optional session id
//! - `details`: freeform object with action-specific details
//!
//! Logging is best effort. A failed append prints a warning to stderr and
//! never affects lock state or acknowledgements.

use crate::error::{Result, TaskLockError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Actions that can be logged as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Listener bound and accepting sessions
    ServerStarted,
    /// Transport accepted a new session
    SessionConnected,
    /// Transport detected a session going away
    SessionDisconnected,
    /// Lock granted (fresh or idempotent re-acquire)
    LockAcquired,
    /// Acquire or release refused
    LockRejected,
    /// Lock released by owner or token holder
    LockReleased,
    /// Locks dropped because their owner disconnected
    LocksReleasedOnDisconnect,
    /// Stateless mutation refused by the gate
    MutationDenied,
    /// Stateless mutation applied to the task store
    TaskMutated,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventAction::ServerStarted => write!(f, "server_started"),
            EventAction::SessionConnected => write!(f, "session_connected"),
            EventAction::SessionDisconnected => write!(f, "session_disconnected"),
            EventAction::LockAcquired => write!(f, "lock_acquired"),
            EventAction::LockRejected => write!(f, "lock_rejected"),
            EventAction::LockReleased => write!(f, "lock_released"),
            EventAction::LocksReleasedOnDisconnect => write!(f, "locks_released_on_disconnect"),
            EventAction::MutationDenied => write!(f, "mutation_denied"),
            EventAction::TaskMutated => write!(f, "task_mutated"),
        }
    }
}

/// An event record for the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// RFC3339 timestamp when the event occurred.
    pub ts: DateTime<Utc>,

    /// The action that was performed.
    pub action: EventAction,

    /// The server instance that recorded the event (e.g., `user@HOST`).
    pub actor: String,

    /// Task the event concerns, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,

    /// Session the event concerns, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    /// Freeform details object with action-specific information.
    pub details: Value,
}

impl Event {
    /// Create a new event stamped with the current time and local actor.
    pub fn new(action: EventAction) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: get_actor_string(),
            task: None,
            session: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task = Some(task_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session = Some(session_id.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            TaskLockError::EventLogError(format!("failed to serialize event to JSON: {}", e))
        })
    }
}

/// Get the actor string for event metadata.
fn get_actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// Append-only audit log sink.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    path: Option<PathBuf>,
}

impl EventLog {
    /// A sink that discards every event.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Open (creating if needed) the log at `path`.
    ///
    /// Fails up front if the file cannot be created, so a misconfigured path
    /// is reported at startup instead of on the first lock.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                TaskLockError::EventLogError(format!(
                    "failed to create events directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                TaskLockError::EventLogError(format!(
                    "failed to open events file '{}': {}",
                    path.display(),
                    e
                ))
            })?;

        Ok(Self {
            path: Some(path.to_path_buf()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one event as a single JSON line.
    pub fn append(&self, event: &Event) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json_line = event.to_ndjson_line()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                TaskLockError::EventLogError(format!(
                    "failed to open events file '{}': {}",
                    path.display(),
                    e
                ))
            })?;

        writeln!(file, "{}", json_line).map_err(|e| {
            TaskLockError::EventLogError(format!(
                "failed to write event to '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Append an event, downgrading failure to a warning on stderr.
    pub fn record(&self, event: Event) {
        if let Err(e) = self.append(&event) {
            eprintln!("Warning: failed to log {} event: {}", event.action, e);
        }
    }
}

/// Read every event from an NDJSON log.
#[cfg(test)]
pub(crate) fn read_events<P: AsRef<Path>>(path: P) -> Result<Vec<Event>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        TaskLockError::EventLogError(format!(
            "failed to read events file '{}': {}",
            path.display(),
            e
        ))
    })?;

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| {
                TaskLockError::EventLogError(format!(
                    "failed to parse event in '{}': {}",
                    path.display(),
                    e
                ))
            })
        })
        .collect()
}
