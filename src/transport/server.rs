//! TCP listener and per-session I/O tasks.
//!
//! Each accepted connection gets a session id, a reader task, and a writer
//! task fed by a bounded outbox. Readers forward frames to a single
//! dispatcher task, which owns all lock and task state.

use super::dispatcher::{Delivery, Dispatcher, Recipient};
use super::frame::{FrameCodec, FrameError, FrameItem};
use crate::config::Config;
use crate::error::{Result, TaskLockError};
use crate::events::{Event, EventAction};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

/// Frames waiting for the dispatcher before readers are made to wait.
const INBOUND_CAPACITY: usize = 1024;

type FrameSink = SplitSink<Framed<TcpStream, FrameCodec>, String>;
type FrameStream = SplitStream<Framed<TcpStream, FrameCodec>>;

/// Messages from session tasks to the dispatcher task.
enum Inbound {
    Connected {
        session_id: String,
        handle: SessionHandle,
    },
    Frame {
        session_id: String,
        line: String,
    },
    Rejected {
        session_id: String,
        error: FrameError,
    },
    Closed {
        session_id: String,
    },
}

/// The dispatcher's side of a live session.
pub(super) struct SessionHandle {
    pub(super) outbox: Sender<String>,
    /// Cancelled to close the connection from the server side.
    pub(super) cancel: CancellationToken,
}

pub struct Server {
    listener: TcpListener,
    dispatcher: Dispatcher,
    max_frame_bytes: usize,
    outbox_capacity: usize,
}

impl Server {
    pub async fn bind(addr: SocketAddr, config: &Config, dispatcher: Dispatcher) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            TaskLockError::TransportError(format!("failed to bind {}: {}", addr, e))
        })?;
        Ok(Self {
            listener,
            dispatcher,
            max_frame_bytes: config.max_frame_bytes,
            outbox_capacity: config.outbox_capacity,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(|e| {
            TaskLockError::TransportError(format!("failed to read listener address: {}", e))
        })
    }

    /// Accept connections until `shutdown` completes.
    ///
    /// On shutdown every open session is closed and released, and the
    /// dispatcher is handed back once it has drained.
    pub async fn run_until<F>(self, shutdown: F) -> Result<Dispatcher>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        let Server {
            listener,
            dispatcher,
            max_frame_bytes,
            outbox_capacity,
        } = self;

        dispatcher.events().record(
            Event::new(EventAction::ServerStarted)
                .with_details(json!({ "listen_addr": addr.to_string() })),
        );

        let (inbound, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let dispatch = tokio::spawn(dispatch_loop(dispatcher, inbound_rx));
        let sessions = CancellationToken::new();

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let session_id = uuid::Uuid::new_v4().to_string();
                        eprintln!("Session {} connected from {}", session_id, peer);
                        tokio::spawn(run_session(
                            stream,
                            session_id,
                            inbound.clone(),
                            sessions.child_token(),
                            max_frame_bytes,
                            outbox_capacity,
                        ));
                    }
                    Err(e) => eprintln!("Warning: failed to accept connection: {}", e),
                },
            }
        }

        sessions.cancel();
        drop(inbound);
        dispatch.await.map_err(|e| {
            TaskLockError::TransportError(format!("dispatcher task failed: {}", e))
        })
    }
}

async fn run_session(
    stream: TcpStream,
    session_id: String,
    inbound: Sender<Inbound>,
    cancel: CancellationToken,
    max_frame_bytes: usize,
    outbox_capacity: usize,
) {
    let (outbox, outbox_rx) = mpsc::channel(outbox_capacity);

    // Registered before the first read so every frame has an outbox.
    let connected = Inbound::Connected {
        session_id: session_id.clone(),
        handle: SessionHandle {
            outbox,
            cancel: cancel.clone(),
        },
    };
    if inbound.send(connected).await.is_err() {
        return;
    }

    let (sink, lines) = Framed::new(stream, FrameCodec::new(max_frame_bytes)).split();
    let writer = tokio::spawn(write_loop(sink, outbox_rx, cancel.clone()));

    read_loop(lines, &session_id, &inbound, &cancel).await;

    eprintln!("Session {} disconnected", session_id);
    let _ = inbound.send(Inbound::Closed { session_id }).await;
    // The writer drains until the dispatcher drops the outbox.
    let _ = writer.await;
}

async fn read_loop(
    mut lines: FrameStream,
    session_id: &str,
    inbound: &Sender<Inbound>,
    cancel: &CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return,
            next = lines.next() => next,
        };
        let message = match next {
            Some(Ok(FrameItem::Line(line))) => {
                if line.trim().is_empty() {
                    continue;
                }
                Inbound::Frame {
                    session_id: session_id.to_string(),
                    line,
                }
            }
            Some(Ok(FrameItem::Rejected(error))) => Inbound::Rejected {
                session_id: session_id.to_string(),
                error,
            },
            Some(Err(e)) => {
                eprintln!("Warning: read error on session {}: {}", session_id, e);
                return;
            }
            None => return,
        };
        if inbound.send(message).await.is_err() {
            return;
        }
    }
}

async fn write_loop(mut sink: FrameSink, mut outbox: Receiver<String>, cancel: CancellationToken) {
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = outbox.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };
        let sent = tokio::select! {
            _ = cancel.cancelled() => break,
            sent = sink.send(line) => sent,
        };
        if sent.is_err() {
            break;
        }
    }
    // A dead writer takes the reader down with it.
    cancel.cancel();
}

async fn dispatch_loop(mut dispatcher: Dispatcher, mut inbound: Receiver<Inbound>) -> Dispatcher {
    let mut sessions: HashMap<String, SessionHandle> = HashMap::new();

    while let Some(message) = inbound.recv().await {
        let deliveries = match message {
            Inbound::Connected { session_id, handle } => {
                dispatcher.on_connect(&session_id);
                sessions.insert(session_id, handle);
                continue;
            }
            // Frames still queued from a session that was already dropped are ignored.
            Inbound::Frame { session_id, line } if sessions.contains_key(&session_id) => {
                dispatcher.on_frame(&session_id, &line)
            }
            Inbound::Rejected { session_id, error } if sessions.contains_key(&session_id) => {
                dispatcher.on_rejected(&session_id, &error)
            }
            Inbound::Frame { .. } | Inbound::Rejected { .. } => continue,
            Inbound::Closed { session_id } => {
                // Dropping the outbox lets the writer finish what is queued.
                if sessions.remove(&session_id).is_none() {
                    continue;
                }
                dispatcher.on_disconnect(&session_id)
            }
        };
        deliver(&mut dispatcher, &mut sessions, deliveries);
    }

    dispatcher
}

/// Queue `deliveries` on session outboxes without waiting.
///
/// A session whose outbox is full or closed is dropped on the spot: its
/// connection is cancelled and its locks are released, and the resulting
/// broadcasts are delivered in turn.
pub(super) fn deliver(
    dispatcher: &mut Dispatcher,
    sessions: &mut HashMap<String, SessionHandle>,
    deliveries: Vec<Delivery>,
) {
    let mut pending = VecDeque::from(deliveries);

    while let Some(delivery) = pending.pop_front() {
        let targets: Vec<String> = match delivery.to {
            Recipient::Session(session_id) => vec![session_id],
            Recipient::Everyone => sessions.keys().cloned().collect(),
        };

        for session_id in targets {
            let Some(handle) = sessions.get(&session_id) else {
                continue;
            };
            if handle.outbox.try_send(delivery.line.clone()).is_ok() {
                continue;
            }
            if let Some(handle) = sessions.remove(&session_id) {
                eprintln!(
                    "Warning: session {} is not keeping up; disconnecting",
                    session_id
                );
                handle.cancel.cancel();
                pending.extend(dispatcher.on_disconnect(&session_id));
            }
        }
    }
}
