//! Inbound event names, acknowledgements, and outbound broadcasts.

use crate::locks::{Lock, LockError, LockReason};
use crate::tasks::Task;
use serde::Serialize;

/// Lock protocol requests a session can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockEvent {
    /// `lock:acquire {taskId}`
    Acquire,
    /// `lock:release {taskId, token?}`
    Release,
    /// `lock:status {taskId}`
    Status,
    /// `lock:watch {taskId}`
    Watch,
    /// `lock:unwatch {taskId}`
    Unwatch,
}

impl LockEvent {
    /// Parse a wire event name. Returns `None` for non-lock events.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "lock:acquire" => Some(Self::Acquire),
            "lock:release" => Some(Self::Release),
            "lock:status" => Some(Self::Status),
            "lock:watch" => Some(Self::Watch),
            "lock:unwatch" => Some(Self::Unwatch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LockEvent::Acquire => "lock:acquire",
            LockEvent::Release => "lock:release",
            LockEvent::Status => "lock:status",
            LockEvent::Watch => "lock:watch",
            LockEvent::Unwatch => "lock:unwatch",
        }
    }
}

impl std::fmt::Display for LockEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acknowledgement returned to the requesting session.
///
/// Exactly one is produced per request, after any state change is complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub ok: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock: Option<Lock>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<LockReason>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
}

impl Ack {
    /// `{ok:true}`
    pub fn ok() -> Self {
        Self {
            ok: true,
            lock: None,
            reason: None,
            owner: None,
            locked: None,
        }
    }

    /// `{ok:true, lock}`
    pub fn acquired(lock: Lock) -> Self {
        Self {
            lock: Some(lock),
            ..Self::ok()
        }
    }

    /// `{ok:false, reason}`
    pub fn rejected(reason: LockReason) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
            ..Self::ok()
        }
    }

    /// `{ok:false, reason, owner?}` for a coordinator conflict.
    pub fn from_error(err: &LockError) -> Self {
        Self {
            owner: err.owner().map(str::to_string),
            ..Self::rejected(err.reason())
        }
    }

    /// `{ok:true, locked, owner?}`. The token is never included.
    pub fn status(lock: Option<&Lock>) -> Self {
        Self {
            locked: Some(lock.is_some()),
            owner: lock.map(|l| l.owner.clone()),
            ..Self::ok()
        }
    }
}

/// Events pushed to sessions without a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "task:locked", rename_all = "camelCase")]
    Locked { task_id: String, owner: String },

    #[serde(rename = "task:unlocked", rename_all = "camelCase")]
    Unlocked { task_id: String },

    #[serde(rename = "task:created")]
    TaskCreated(Task),

    #[serde(rename = "task:updated")]
    TaskUpdated(Task),

    #[serde(rename = "task:deleted")]
    TaskDeleted { id: String },
}

/// Who receives a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Members of one task channel, resolved after the state change.
    Sessions(Vec<String>),
    /// Every connected session.
    Everyone,
}

/// An event addressed to an audience.
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    pub audience: Audience,
    pub event: ServerEvent,
}

impl Broadcast {
    pub fn to_sessions(sessions: Vec<String>, event: ServerEvent) -> Self {
        Self {
            audience: Audience::Sessions(sessions),
            event,
        }
    }

    pub fn to_everyone(event: ServerEvent) -> Self {
        Self {
            audience: Audience::Everyone,
            event,
        }
    }
}
