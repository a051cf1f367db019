//! Routes decoded frames to the lock protocol or the task path and turns the
//! results into addressed output lines.
//!
//! A `Dispatcher` is owned by exactly one task. Every request is applied and
//! answered before the next one is looked at, so coordinator updates and
//! channel membership never interleave.

use super::frame::{self, FrameError, InboundFrame};
use crate::config::Config;
use crate::events::{Event, EventAction, EventLog};
use crate::gate::{self, MutationGate};
use crate::locks::LockReason;
use crate::protocol::{Ack, Audience, Broadcast, LockEvent, ProtocolHandler};
use crate::tasks::{MemoryTaskStore, TaskEvent, TaskStore, service};
use serde::Serialize;
use serde_json::{Value, json};

/// Where an output line goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Session(String),
    Everyone,
}

/// An encoded line and its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: Recipient,
    pub line: String,
}

impl Delivery {
    fn to_session(session_id: &str, line: String) -> Self {
        Self {
            to: Recipient::Session(session_id.to_string()),
            line,
        }
    }
}

pub struct Dispatcher {
    handler: ProtocolHandler,
    tasks: Box<dyn TaskStore>,
    token_header: String,
    max_frame_bytes: usize,
    events: EventLog,
}

impl Dispatcher {
    /// Create a dispatcher backed by an empty in-memory task store.
    pub fn new(config: &Config, events: EventLog) -> Self {
        Self::with_store(config, events, Box::new(MemoryTaskStore::new()))
    }

    pub fn with_store(config: &Config, events: EventLog, tasks: Box<dyn TaskStore>) -> Self {
        Self {
            handler: ProtocolHandler::new(config.watchers_enabled),
            tasks,
            token_header: config.lock_token_header.clone(),
            max_frame_bytes: config.max_frame_bytes,
            events,
        }
    }

    pub fn handler(&self) -> &ProtocolHandler {
        &self.handler
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn on_connect(&mut self, session_id: &str) {
        self.events
            .record(Event::new(EventAction::SessionConnected).with_session(session_id));
    }

    /// Handle one inbound line from `session_id`.
    pub fn on_frame(&mut self, session_id: &str, line: &str) -> Vec<Delivery> {
        let frame = match frame::decode(line, self.max_frame_bytes) {
            Ok(frame) => frame,
            Err(err) => return self.on_rejected(session_id, &err),
        };

        if let Some(event) = LockEvent::from_name(&frame.event) {
            let reply = self.handler.handle(session_id, event, &frame.data);
            if let Some(audit) = reply.audit {
                self.events.record(audit);
            }
            let mut out = Vec::with_capacity(1 + reply.broadcasts.len());
            push_ack(&mut out, session_id, frame.id.as_ref(), &reply.ack);
            for broadcast in &reply.broadcasts {
                push_broadcast(&mut out, broadcast);
            }
            return out;
        }

        if let Some(event) = TaskEvent::from_name(&frame.event) {
            return self.on_task_frame(session_id, event, &frame);
        }

        let audit = Event::new(EventAction::LockRejected)
            .with_session(session_id)
            .with_details(json!({
                "event": frame.event,
                "reason": LockReason::BadPayload,
                "error": "unknown event",
            }));
        self.events.record(audit);
        let mut out = Vec::with_capacity(1);
        push_ack(
            &mut out,
            session_id,
            frame.id.as_ref(),
            &Ack::rejected(LockReason::BadPayload),
        );
        out
    }

    fn on_task_frame(
        &mut self,
        session_id: &str,
        event: TaskEvent,
        frame: &InboundFrame,
    ) -> Vec<Delivery> {
        let token = gate::token_from_headers(&frame.headers, &self.token_header);
        let gate = MutationGate::new(self.handler.coordinator());
        let reply = service::apply(self.tasks.as_mut(), &gate, event, token, &frame.data);

        if let Some(audit) = reply.audit {
            self.events.record(audit.with_session(session_id));
        }
        let mut out = Vec::with_capacity(2);
        push_ack(&mut out, session_id, frame.id.as_ref(), &reply.ack);
        if let Some(broadcast) = &reply.broadcast {
            push_broadcast(&mut out, broadcast);
        }
        out
    }

    /// Answer a line that could not become a frame, such as one over the
    /// size limit or one that is not UTF-8.
    pub fn on_rejected(&mut self, session_id: &str, err: &FrameError) -> Vec<Delivery> {
        self.events.record(
            Event::new(EventAction::LockRejected)
                .with_session(session_id)
                .with_details(json!({
                    "reason": LockReason::BadPayload,
                    "error": err.to_string(),
                })),
        );
        let mut out = Vec::with_capacity(1);
        push_ack(
            &mut out,
            session_id,
            None,
            &Ack::rejected(LockReason::BadPayload),
        );
        out
    }

    /// Release everything the session held. Produces broadcasts only.
    pub fn on_disconnect(&mut self, session_id: &str) -> Vec<Delivery> {
        let disconnect = self.handler.disconnect(session_id);

        if !disconnect.released.is_empty() {
            self.events.record(
                Event::new(EventAction::LocksReleasedOnDisconnect)
                    .with_session(session_id)
                    .with_details(json!({ "tasks": disconnect.released })),
            );
        }
        self.events
            .record(Event::new(EventAction::SessionDisconnected).with_session(session_id));

        let mut out = Vec::new();
        for broadcast in &disconnect.broadcasts {
            push_broadcast(&mut out, broadcast);
        }
        out
    }
}

fn push_ack<T: Serialize>(out: &mut Vec<Delivery>, session_id: &str, id: Option<&Value>, ack: &T) {
    match frame::encode_ack(id, ack) {
        Ok(line) => out.push(Delivery::to_session(session_id, line)),
        Err(e) => eprintln!("Warning: dropping ack for session {}: {}", session_id, e),
    }
}

fn push_broadcast(out: &mut Vec<Delivery>, broadcast: &Broadcast) {
    let line = match frame::encode_event(&broadcast.event) {
        Ok(line) => line,
        Err(e) => {
            eprintln!("Warning: dropping broadcast: {}", e);
            return;
        }
    };
    match &broadcast.audience {
        Audience::Sessions(sessions) => {
            out.extend(
                sessions
                    .iter()
                    .map(|session| Delivery::to_session(session, line.clone())),
            );
        }
        Audience::Everyone => out.push(Delivery {
            to: Recipient::Everyone,
            line,
        }),
    }
}
