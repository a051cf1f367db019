//! Binds lock requests and disconnects to coordinator calls.

use super::channels::ChannelRegistry;
use super::messages::{Ack, Broadcast, LockEvent, ServerEvent};
use super::payload::{self, PayloadError};
use crate::events::{Event, EventAction};
use crate::locks::{LockCoordinator, LockReason};
use serde_json::{Value, json};

/// Result of one lock request: the acknowledgement, the broadcasts it causes,
/// and an audit record.
#[derive(Debug, Clone)]
pub struct Reply {
    pub ack: Ack,
    pub broadcasts: Vec<Broadcast>,
    pub audit: Option<Event>,
}

impl Reply {
    fn ack_only(ack: Ack) -> Self {
        Self {
            ack,
            broadcasts: Vec::new(),
            audit: None,
        }
    }

    fn with_audit(mut self, event: Event) -> Self {
        self.audit = Some(event);
        self
    }
}

/// Result of a session going away.
#[derive(Debug, Clone, Default)]
pub struct Disconnect {
    pub released: Vec<String>,
    pub broadcasts: Vec<Broadcast>,
}

/// Realtime lock protocol.
///
/// Owns the coordinator and channel registry. Requests are applied one at a
/// time; each completes its state change before the reply is built, and
/// broadcast recipients are resolved only after the change.
#[derive(Debug)]
pub struct ProtocolHandler {
    coordinator: LockCoordinator,
    channels: ChannelRegistry,
    watchers_enabled: bool,
}

impl ProtocolHandler {
    pub fn new(watchers_enabled: bool) -> Self {
        Self {
            coordinator: LockCoordinator::new(),
            channels: ChannelRegistry::new(),
            watchers_enabled,
        }
    }

    /// Read-only access for the mutation gate and status output.
    pub fn coordinator(&self) -> &LockCoordinator {
        &self.coordinator
    }

    #[cfg(test)]
    pub(crate) fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn handle(&mut self, session_id: &str, event: LockEvent, data: &Value) -> Reply {
        match event {
            LockEvent::Acquire => self.acquire(session_id, data),
            LockEvent::Release => self.release(session_id, data),
            LockEvent::Status => self.status(session_id, data),
            LockEvent::Watch => self.watch(session_id, data, true),
            LockEvent::Unwatch => self.watch(session_id, data, false),
        }
    }

    /// `lock:acquire {taskId}`
    pub fn acquire(&mut self, session_id: &str, data: &Value) -> Reply {
        let payload = match payload::parse_task_ref(data) {
            Ok(payload) => payload,
            Err(e) => return bad_payload(session_id, LockEvent::Acquire, &e),
        };

        match self.coordinator.acquire(&payload.task_id, session_id) {
            Ok(lock) => {
                self.channels.join_as_owner(&lock.task_id, session_id);
                let broadcast = Broadcast::to_sessions(
                    self.channels.members(&lock.task_id),
                    ServerEvent::Locked {
                        task_id: lock.task_id.clone(),
                        owner: lock.owner.clone(),
                    },
                );
                let audit = Event::new(EventAction::LockAcquired)
                    .with_task(&lock.task_id)
                    .with_session(session_id);

                Reply {
                    ack: Ack::acquired(lock),
                    broadcasts: vec![broadcast],
                    audit: Some(audit),
                }
            }
            Err(err) => {
                let audit = Event::new(EventAction::LockRejected)
                    .with_task(&payload.task_id)
                    .with_session(session_id)
                    .with_details(json!({
                        "event": LockEvent::Acquire.as_str(),
                        "reason": err.reason(),
                        "owner": err.owner(),
                    }));
                Reply::ack_only(Ack::from_error(&err)).with_audit(audit)
            }
        }
    }

    /// `lock:release {taskId, token?}`
    pub fn release(&mut self, session_id: &str, data: &Value) -> Reply {
        let payload = match payload::parse_release(data) {
            Ok(payload) => payload,
            Err(e) => return bad_payload(session_id, LockEvent::Release, &e),
        };

        let released =
            self.coordinator
                .release(&payload.task_id, session_id, payload.token.as_deref());

        match released {
            Ok(lock) => {
                self.channels.leave_as_owner(&lock.task_id, session_id);
                let recipients = self.channels.members(&lock.task_id);
                let via_token = lock.owner != session_id;
                if via_token {
                    // The previous owner hears about it, then loses its owner membership.
                    self.channels.leave_as_owner(&lock.task_id, &lock.owner);
                }

                let audit = Event::new(EventAction::LockReleased)
                    .with_task(&lock.task_id)
                    .with_session(session_id)
                    .with_details(json!({
                        "owner": lock.owner,
                        "via_token": via_token,
                    }));

                Reply {
                    ack: Ack::ok(),
                    broadcasts: vec![Broadcast::to_sessions(
                        recipients,
                        ServerEvent::Unlocked {
                            task_id: lock.task_id,
                        },
                    )],
                    audit: Some(audit),
                }
            }
            Err(err) => {
                let audit = Event::new(EventAction::LockRejected)
                    .with_task(&payload.task_id)
                    .with_session(session_id)
                    .with_details(json!({
                        "event": LockEvent::Release.as_str(),
                        "reason": err.reason(),
                    }));
                Reply::ack_only(Ack::rejected(err.reason())).with_audit(audit)
            }
        }
    }

    /// `lock:status {taskId}`
    pub fn status(&self, session_id: &str, data: &Value) -> Reply {
        match payload::parse_task_ref(data) {
            Ok(payload) => Reply::ack_only(Ack::status(self.coordinator.query(&payload.task_id))),
            Err(e) => bad_payload(session_id, LockEvent::Status, &e),
        }
    }

    /// `lock:watch {taskId}` / `lock:unwatch {taskId}`
    pub fn watch(&mut self, session_id: &str, data: &Value, subscribe: bool) -> Reply {
        let event = if subscribe {
            LockEvent::Watch
        } else {
            LockEvent::Unwatch
        };
        if !self.watchers_enabled {
            return Reply::ack_only(Ack::rejected(LockReason::BadPayload));
        }

        let payload = match payload::parse_task_ref(data) {
            Ok(payload) => payload,
            Err(e) => return bad_payload(session_id, event, &e),
        };

        if subscribe {
            self.channels.watch(&payload.task_id, session_id);
        } else {
            self.channels.unwatch(&payload.task_id, session_id);
        }
        Reply::ack_only(Ack::ok())
    }

    /// Release everything a departed session held and tell each channel.
    pub fn disconnect(&mut self, session_id: &str) -> Disconnect {
        let released = self.coordinator.release_all(session_id);
        self.channels.drop_session(session_id);

        let broadcasts = released
            .iter()
            .map(|task_id| {
                Broadcast::to_sessions(
                    self.channels.members(task_id),
                    ServerEvent::Unlocked {
                        task_id: task_id.clone(),
                    },
                )
            })
            .collect();

        Disconnect {
            released,
            broadcasts,
        }
    }
}

fn bad_payload(session_id: &str, event: LockEvent, err: &PayloadError) -> Reply {
    let audit = Event::new(EventAction::LockRejected)
        .with_session(session_id)
        .with_details(json!({
            "event": event.as_str(),
            "reason": LockReason::BadPayload,
            "error": err.to_string(),
        }));
    Reply::ack_only(Ack::rejected(LockReason::BadPayload)).with_audit(audit)
}
