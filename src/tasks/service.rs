//! Task reads and gated task mutations.
//!
//! Reads (`task:list`, `task:get`) and `task:create` are never gated.
//! Order of checks for a gated request mirrors a REST route:
//! 1. target id shape (400 `INVALID_ID`)
//! 2. mutation gate (423 `LOCKED`)
//! 3. body validation (400 `VALIDATION_ERROR`)
//! 4. store lookup (404 `TASK_NOT_FOUND`)

use super::requests::{self, TaskEvent};
use super::{Task, TaskStore};
use crate::events::{Event, EventAction};
use crate::gate::{GateDecision, MutationGate};
use crate::protocol::{Broadcast, ServerEvent};
use serde::Serialize;
use serde_json::{Value, json};

pub const STATUS_OK: u16 = 200;
pub const STATUS_CREATED: u16 = 201;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;

/// Error body carried by a failed task acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Acknowledgement for a task request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskAck {
    pub ok: bool,
    pub status: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<Task>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl TaskAck {
    fn success(status: u16) -> Self {
        Self {
            ok: true,
            status,
            task: None,
            tasks: None,
            id: None,
            error: None,
        }
    }

    fn failure(status: u16, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.into(),
            }),
            ..Self::success(status)
        }
    }
}

/// Outcome of a task request.
#[derive(Debug, Clone)]
pub struct TaskReply {
    pub ack: TaskAck,
    pub broadcast: Option<Broadcast>,
    pub audit: Option<Event>,
}

impl TaskReply {
    fn ack_only(ack: TaskAck) -> Self {
        Self {
            ack,
            broadcast: None,
            audit: None,
        }
    }
}

/// Apply one task request. `token` is the capability token from the request
/// headers; the caller's session, if any, plays no part.
pub fn apply(
    store: &mut dyn TaskStore,
    gate: &MutationGate<'_>,
    event: TaskEvent,
    token: Option<&str>,
    data: &Value,
) -> TaskReply {
    match event {
        TaskEvent::List => TaskReply::ack_only(TaskAck {
            tasks: Some(store.list()),
            ..TaskAck::success(STATUS_OK)
        }),
        TaskEvent::Get => get(store, data),
        TaskEvent::Create => create(store, data),
        TaskEvent::Update | TaskEvent::Delete => gated(store, gate, event, token, data),
    }
}

fn get(store: &dyn TaskStore, data: &Value) -> TaskReply {
    let task_id = match requests::parse_target(data) {
        Ok(id) => id,
        Err(message) => {
            return TaskReply::ack_only(TaskAck::failure(
                STATUS_BAD_REQUEST,
                "INVALID_ID",
                message,
            ));
        }
    };

    match store.get(&task_id) {
        Some(task) => TaskReply::ack_only(TaskAck {
            task: Some(task),
            ..TaskAck::success(STATUS_OK)
        }),
        None => not_found(),
    }
}

fn create(store: &mut dyn TaskStore, data: &Value) -> TaskReply {
    let title = match requests::parse_create(data) {
        Ok(title) => title,
        Err(message) => {
            return TaskReply::ack_only(TaskAck::failure(
                STATUS_BAD_REQUEST,
                "VALIDATION_ERROR",
                message,
            ));
        }
    };

    let task = store.create(&title);
    mutated(
        TaskEvent::Create,
        TaskAck {
            task: Some(task.clone()),
            ..TaskAck::success(STATUS_CREATED)
        },
        ServerEvent::TaskCreated(task),
    )
}

fn gated(
    store: &mut dyn TaskStore,
    gate: &MutationGate<'_>,
    event: TaskEvent,
    token: Option<&str>,
    data: &Value,
) -> TaskReply {
    let task_id = match requests::parse_target(data) {
        Ok(id) => id,
        Err(message) => {
            return TaskReply::ack_only(TaskAck::failure(
                STATUS_BAD_REQUEST,
                "INVALID_ID",
                message,
            ));
        }
    };

    if let GateDecision::Deny(rejection) = gate.check(&task_id, token) {
        let audit = Event::new(EventAction::MutationDenied)
            .with_task(&task_id)
            .with_details(json!({
                "event": event.as_str(),
                "owner": rejection.owner,
                "token_presented": token.is_some(),
            }));
        return TaskReply {
            ack: TaskAck::failure(rejection.status, rejection.code, rejection.message),
            broadcast: None,
            audit: Some(audit),
        };
    }

    match event {
        TaskEvent::Update => {
            let patch = match requests::parse_patch(data) {
                Ok(patch) => patch,
                Err(message) => {
                    return TaskReply::ack_only(TaskAck::failure(
                        STATUS_BAD_REQUEST,
                        "VALIDATION_ERROR",
                        message,
                    ));
                }
            };
            match store.update(&task_id, &patch) {
                Some(task) => mutated(
                    event,
                    TaskAck {
                        task: Some(task.clone()),
                        ..TaskAck::success(STATUS_OK)
                    },
                    ServerEvent::TaskUpdated(task),
                ),
                None => not_found(),
            }
        }
        _ => match store.delete(&task_id) {
            Some(task) => mutated(
                event,
                TaskAck {
                    id: Some(task.id.clone()),
                    ..TaskAck::success(STATUS_OK)
                },
                ServerEvent::TaskDeleted { id: task.id },
            ),
            None => not_found(),
        },
    }
}

fn mutated(event: TaskEvent, ack: TaskAck, broadcast: ServerEvent) -> TaskReply {
    let task_id = match &broadcast {
        ServerEvent::TaskCreated(task) | ServerEvent::TaskUpdated(task) => task.id.clone(),
        ServerEvent::TaskDeleted { id } => id.clone(),
        ServerEvent::Locked { task_id, .. } | ServerEvent::Unlocked { task_id } => {
            task_id.clone()
        }
    };
    let audit = Event::new(EventAction::TaskMutated)
        .with_task(task_id)
        .with_details(json!({ "event": event.as_str() }));

    TaskReply {
        ack,
        broadcast: Some(Broadcast::to_everyone(broadcast)),
        audit: Some(audit),
    }
}

fn not_found() -> TaskReply {
    TaskReply::ack_only(TaskAck::failure(
        STATUS_NOT_FOUND,
        "TASK_NOT_FOUND",
        "Task not found",
    ))
}
