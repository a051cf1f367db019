//! Tests for the frame codec, dispatcher routing, and the TCP server.

use super::frame::{self, FrameCodec, FrameError, FrameItem};
use super::server::{SessionHandle, deliver};
use super::*;
use crate::config::Config;
use crate::error::Result;
use crate::events::{EventAction, EventLog, read_events};
use bytes::BytesMut;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;

fn dispatcher() -> Dispatcher {
    Dispatcher::new(&Config::default(), EventLog::disabled())
}

fn send(dispatcher: &mut Dispatcher, session: &str, frame: Value) -> Vec<Delivery> {
    dispatcher.on_frame(session, &frame.to_string())
}

fn parse(delivery: &Delivery) -> Value {
    serde_json::from_str(&delivery.line).unwrap()
}

fn to(session: &str) -> Recipient {
    Recipient::Session(session.to_string())
}

// ============================================================================
// Frame codec
// ============================================================================

fn decode_all(codec: &mut FrameCodec, input: &[u8]) -> Vec<FrameItem> {
    let mut buf = BytesMut::from(input);
    let mut items = Vec::new();
    while let Some(item) = codec.decode(&mut buf).unwrap() {
        items.push(item);
    }
    if let Some(item) = codec.decode_eof(&mut buf).unwrap() {
        items.push(item);
    }
    items
}

fn line(text: &str) -> FrameItem {
    FrameItem::Line(text.to_string())
}

#[test]
fn test_codec_splits_lines() {
    let mut codec = FrameCodec::new(64);

    let items = decode_all(&mut codec, b"{\"a\":1}\r\n\n{\"b\":2}");

    assert_eq!(items, vec![line("{\"a\":1}"), line(""), line("{\"b\":2}")]);
}

#[test]
fn test_codec_exact_limit_is_accepted_with_either_terminator() {
    let mut codec = FrameCodec::new(4);

    let items = decode_all(&mut codec, b"abcd\nabcd\r\nabcde\n");

    assert_eq!(
        items,
        vec![
            line("abcd"),
            line("abcd"),
            FrameItem::Rejected(FrameError::TooLarge { max: 4 }),
        ]
    );
}

#[test]
fn test_codec_skips_oversized_line() {
    let mut codec = FrameCodec::new(16);
    let mut data = vec![b'x'; 40];
    data.extend_from_slice(b"\nok\n");

    let items = decode_all(&mut codec, &data);

    assert_eq!(
        items,
        vec![
            FrameItem::Rejected(FrameError::TooLarge { max: 16 }),
            line("ok"),
        ]
    );
}

#[test]
fn test_codec_rejects_invalid_utf8_and_continues() {
    let mut codec = FrameCodec::new(64);

    let items = decode_all(&mut codec, b"{\"event\":\"t\xff\"}\nok\n");

    assert_eq!(items.len(), 2);
    assert!(matches!(
        &items[0],
        FrameItem::Rejected(FrameError::Malformed(msg)) if msg.contains("UTF-8")
    ));
    assert_eq!(items[1], line("ok"));
}

#[test]
fn test_decode_errors() {
    assert!(matches!(
        frame::decode("{\"data\":{}}", 1024),
        Err(FrameError::Malformed(_))
    ));
    assert!(matches!(
        frame::decode("not json", 1024),
        Err(FrameError::Malformed(_))
    ));
    assert_eq!(
        frame::decode("{\"event\":\"lock:status\"}", 4),
        Err(FrameError::TooLarge { max: 4 })
    );
}

#[test]
fn test_decode_defaults() {
    let frame = frame::decode("{\"event\":\"task:list\"}", 1024).unwrap();

    assert_eq!(frame.event, "task:list");
    assert!(frame.id.is_none());
    assert!(frame.headers.is_empty());
    assert_eq!(frame.data, Value::Null);
}

#[test]
fn test_encode_ack_flattens_body() {
    let line = frame::encode_ack(
        Some(&json!("req-1")),
        &crate::protocol::Ack::status(None),
    )
    .unwrap();

    assert_eq!(
        serde_json::from_str::<Value>(&line).unwrap(),
        json!({"ack": "req-1", "ok": true, "locked": false})
    );
}

// ============================================================================
// Dispatcher
// ============================================================================

#[test]
fn test_acquire_acks_before_broadcast() {
    let mut dispatcher = dispatcher();

    let out = send(
        &mut dispatcher,
        "sockA",
        json!({"event": "lock:acquire", "id": 1, "data": {"taskId": "task-1"}}),
    );

    assert_eq!(out.len(), 2);
    assert_eq!(out[0].to, to("sockA"));
    let ack = parse(&out[0]);
    assert_eq!(ack["ack"], json!(1));
    assert_eq!(ack["ok"], json!(true));
    assert_eq!(ack["lock"]["owner"], json!("sockA"));
    assert!(ack["lock"]["token"].as_str().is_some_and(|t| !t.is_empty()));

    assert_eq!(out[1].to, to("sockA"));
    assert_eq!(
        parse(&out[1]),
        json!({"event": "task:locked", "data": {"taskId": "task-1", "owner": "sockA"}})
    );
}

#[test]
fn test_conflict_and_watcher_broadcasts() {
    let mut dispatcher = dispatcher();
    send(
        &mut dispatcher,
        "sockA",
        json!({"event": "lock:acquire", "data": {"taskId": "task-1"}}),
    );

    let out = send(
        &mut dispatcher,
        "sockB",
        json!({"event": "lock:acquire", "id": 2, "data": {"taskId": "task-1"}}),
    );
    assert_eq!(out.len(), 1);
    assert_eq!(
        parse(&out[0]),
        json!({"ack": 2, "ok": false, "reason": "ALREADY_LOCKED", "owner": "sockA"})
    );

    let out = send(
        &mut dispatcher,
        "sockB",
        json!({"event": "lock:watch", "id": 3, "data": {"taskId": "task-1"}}),
    );
    assert_eq!(parse(&out[0]), json!({"ack": 3, "ok": true}));

    let out = send(
        &mut dispatcher,
        "sockA",
        json!({"event": "lock:release", "id": 4, "data": {"taskId": "task-1"}}),
    );
    assert_eq!(parse(&out[0]), json!({"ack": 4, "ok": true}));
    assert_eq!(out.len(), 2);
    assert_eq!(out[1].to, to("sockB"));
    assert_eq!(
        parse(&out[1]),
        json!({"event": "task:unlocked", "data": {"taskId": "task-1"}})
    );
}

#[test]
fn test_unknown_event_and_malformed_frame() {
    let mut dispatcher = dispatcher();

    let out = send(&mut dispatcher, "sockA", json!({"event": "lock:steal", "id": 9}));
    assert_eq!(
        parse(&out[0]),
        json!({"ack": 9, "ok": false, "reason": "BAD_PAYLOAD"})
    );

    let out = dispatcher.on_frame("sockA", "{not json");
    assert_eq!(out.len(), 1);
    assert_eq!(
        parse(&out[0]),
        json!({"ack": null, "ok": false, "reason": "BAD_PAYLOAD"})
    );

    let out = dispatcher.on_rejected("sockA", &FrameError::TooLarge { max: 16 });
    assert_eq!(
        parse(&out[0]),
        json!({"ack": null, "ok": false, "reason": "BAD_PAYLOAD"})
    );
}

#[test]
fn test_task_update_uses_token_header() {
    let mut dispatcher = dispatcher();

    let out = send(
        &mut dispatcher,
        "http",
        json!({"event": "task:create", "id": 1, "data": {"title": "Draft"}}),
    );
    let created = parse(&out[0]);
    assert_eq!(created["status"], json!(201));
    let task_id = created["task"]["id"].as_str().unwrap().to_string();
    assert_eq!(out[1].to, Recipient::Everyone);
    assert_eq!(parse(&out[1])["event"], json!("task:created"));

    let out = send(
        &mut dispatcher,
        "http",
        json!({"event": "task:get", "id": "g", "data": {"taskId": task_id}}),
    );
    assert_eq!(out.len(), 1);
    assert_eq!(parse(&out[0])["task"]["title"], json!("Draft"));

    let out = send(
        &mut dispatcher,
        "sockA",
        json!({"event": "lock:acquire", "data": {"taskId": task_id}}),
    );
    let token = parse(&out[0])["lock"]["token"].as_str().unwrap().to_string();

    let out = send(
        &mut dispatcher,
        "http",
        json!({"event": "task:update", "id": 2, "data": {"taskId": task_id, "completed": true}}),
    );
    assert_eq!(out.len(), 1);
    assert_eq!(
        parse(&out[0]),
        json!({
            "ack": 2,
            "ok": false,
            "status": 423,
            "error": {"code": "LOCKED", "message": "Task is locked"}
        })
    );

    let out = send(
        &mut dispatcher,
        "http",
        json!({
            "event": "task:update",
            "id": 3,
            "headers": {"X-Lock-Token": token},
            "data": {"taskId": task_id, "completed": true}
        }),
    );
    let ack = parse(&out[0]);
    assert_eq!(ack["ok"], json!(true));
    assert_eq!(ack["task"]["completed"], json!(true));
    assert_eq!(parse(&out[1])["event"], json!("task:updated"));
}

#[test]
fn test_disconnect_releases_and_notifies_watchers() {
    let mut dispatcher = dispatcher();
    for task in ["task-1", "task-2"] {
        send(
            &mut dispatcher,
            "sockA",
            json!({"event": "lock:acquire", "data": {"taskId": task}}),
        );
    }
    send(
        &mut dispatcher,
        "sockB",
        json!({"event": "lock:watch", "data": {"taskId": "task-2"}}),
    );

    let out = dispatcher.on_disconnect("sockA");

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].to, to("sockB"));
    assert_eq!(
        parse(&out[0]),
        json!({"event": "task:unlocked", "data": {"taskId": "task-2"}})
    );
    assert!(dispatcher.handler().coordinator().active_locks().is_empty());
}

#[test]
fn test_dispatcher_records_audit_events() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("logs/events.ndjson");
    let log = EventLog::open(&path).unwrap();
    let mut dispatcher = Dispatcher::new(&Config::default(), log);

    dispatcher.on_connect("sockA");
    send(
        &mut dispatcher,
        "sockA",
        json!({"event": "lock:acquire", "data": {"taskId": "task-1"}}),
    );
    send(
        &mut dispatcher,
        "sockB",
        json!({"event": "lock:acquire", "data": {"taskId": "task-1"}}),
    );
    dispatcher.on_disconnect("sockA");

    let actions: Vec<EventAction> = read_events(&path)
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            EventAction::SessionConnected,
            EventAction::LockAcquired,
            EventAction::LockRejected,
            EventAction::LocksReleasedOnDisconnect,
            EventAction::SessionDisconnected,
        ]
    );
}

// ============================================================================
// Outbox backpressure
// ============================================================================

fn session_handle(capacity: usize) -> (SessionHandle, mpsc::Receiver<String>) {
    let (outbox, rx) = mpsc::channel(capacity);
    let handle = SessionHandle {
        outbox,
        cancel: CancellationToken::new(),
    };
    (handle, rx)
}

#[test]
fn test_full_outbox_drops_session_and_releases_locks() {
    let mut dispatcher = dispatcher();
    let mut sessions = HashMap::new();
    let (slow, mut slow_rx) = session_handle(1);
    let slow_cancel = slow.cancel.clone();
    let (watcher, mut watcher_rx) = session_handle(8);
    sessions.insert("slow".to_string(), slow);
    sessions.insert("watcher".to_string(), watcher);

    let out = send(
        &mut dispatcher,
        "watcher",
        json!({"event": "lock:watch", "id": 1, "data": {"taskId": "task-1"}}),
    );
    deliver(&mut dispatcher, &mut sessions, out);

    // The ack fills the slow outbox, so the broadcast behind it overflows.
    let out = send(
        &mut dispatcher,
        "slow",
        json!({"event": "lock:acquire", "id": 2, "data": {"taskId": "task-1"}}),
    );
    deliver(&mut dispatcher, &mut sessions, out);

    assert!(!sessions.contains_key("slow"));
    assert!(slow_cancel.is_cancelled());
    assert!(dispatcher.handler().coordinator().active_locks().is_empty());

    let slow_ack: Value = serde_json::from_str(&slow_rx.try_recv().unwrap()).unwrap();
    assert_eq!(slow_ack["ack"], json!(2));
    assert!(slow_rx.try_recv().is_err());

    let received: Vec<Value> = std::iter::from_fn(|| watcher_rx.try_recv().ok())
        .map(|line| serde_json::from_str(&line).unwrap())
        .collect();
    assert_eq!(
        received,
        vec![
            json!({"ack": 1, "ok": true}),
            json!({"event": "task:locked", "data": {"taskId": "task-1", "owner": "slow"}}),
            json!({"event": "task:unlocked", "data": {"taskId": "task-1"}}),
        ]
    );
}

#[test]
fn test_closed_outbox_is_treated_as_gone() {
    let mut dispatcher = dispatcher();
    let mut sessions = HashMap::new();
    let (gone, gone_rx) = session_handle(4);
    sessions.insert("gone".to_string(), gone);
    drop(gone_rx);

    let out = send(
        &mut dispatcher,
        "gone",
        json!({"event": "lock:acquire", "data": {"taskId": "task-1"}}),
    );
    deliver(&mut dispatcher, &mut sessions, out);

    assert!(sessions.is_empty());
    assert!(dispatcher.handler().coordinator().active_locks().is_empty());
}

// ============================================================================
// TCP server
// ============================================================================

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn send(&mut self, frame: Value) {
        self.send_raw(frame.to_string().as_bytes()).await;
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .expect("connection closed");
        serde_json::from_str(&line).unwrap()
    }
}

struct TestServer {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<Dispatcher>>,
}

impl TestServer {
    async fn start(config: Config) -> Self {
        let dispatcher = Dispatcher::new(&config, EventLog::disabled());
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = Server::bind(addr, &config, dispatcher).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async move {
            let _ = stopped.await;
        }));
        Self { addr, stop, handle }
    }

    /// Stop accepting, close every session, and return the drained dispatcher.
    async fn shutdown(self) -> Dispatcher {
        let _ = self.stop.send(());
        self.handle.await.unwrap().unwrap()
    }
}

fn config_with_frame_limit(max_frame_bytes: usize) -> Config {
    Config {
        max_frame_bytes,
        ..Config::default()
    }
}

#[tokio::test]
async fn test_server_lock_lifecycle_over_tcp() {
    let server = TestServer::start(config_with_frame_limit(4096)).await;
    let mut a = Client::connect(server.addr).await;
    let mut b = Client::connect(server.addr).await;

    a.send(json!({"event": "lock:acquire", "id": 1, "data": {"taskId": "task-1"}}))
        .await;
    let ack = a.recv().await;
    assert_eq!(ack["ack"], json!(1));
    assert_eq!(ack["ok"], json!(true));
    let owner = ack["lock"]["owner"].as_str().unwrap().to_string();
    assert_eq!(
        a.recv().await,
        json!({"event": "task:locked", "data": {"taskId": "task-1", "owner": owner}})
    );

    b.send(json!({"event": "lock:acquire", "id": 2, "data": {"taskId": "task-1"}}))
        .await;
    assert_eq!(
        b.recv().await,
        json!({"ack": 2, "ok": false, "reason": "ALREADY_LOCKED", "owner": owner})
    );

    b.send(json!({"event": "lock:watch", "id": 3, "data": {"taskId": "task-1"}}))
        .await;
    assert_eq!(b.recv().await, json!({"ack": 3, "ok": true}));

    drop(a);
    assert_eq!(
        b.recv().await,
        json!({"event": "task:unlocked", "data": {"taskId": "task-1"}})
    );

    b.send(json!({"event": "lock:acquire", "id": 4, "data": {"taskId": "task-1"}}))
        .await;
    let ack = b.recv().await;
    assert_eq!(ack["ok"], json!(true));
    assert_ne!(ack["lock"]["owner"], json!(owner));

    let dispatcher = server.shutdown().await;
    assert!(dispatcher.handler().coordinator().active_locks().is_empty());
}

#[tokio::test]
async fn test_server_rejects_oversized_frame_and_keeps_session() {
    let server = TestServer::start(config_with_frame_limit(128)).await;
    let mut client = Client::connect(server.addr).await;

    client.send_raw("x".repeat(1000).as_bytes()).await;
    assert_eq!(
        client.recv().await,
        json!({"ack": null, "ok": false, "reason": "BAD_PAYLOAD"})
    );

    client
        .send(json!({"event": "lock:status", "id": 1, "data": {"taskId": "task-1"}}))
        .await;
    assert_eq!(
        client.recv().await,
        json!({"ack": 1, "ok": true, "locked": false})
    );
}

#[tokio::test]
async fn test_server_rejects_invalid_utf8_and_keeps_session() {
    let server = TestServer::start(Config::default()).await;
    let mut client = Client::connect(server.addr).await;

    client
        .send_raw(b"{\"event\":\"lock:acquire\",\"data\":{\"taskId\":\"t\xff\"}}")
        .await;
    assert_eq!(
        client.recv().await,
        json!({"ack": null, "ok": false, "reason": "BAD_PAYLOAD"})
    );

    client
        .send(json!({"event": "lock:status", "id": 1, "data": {"taskId": "task-1"}}))
        .await;
    assert_eq!(
        client.recv().await,
        json!({"ack": 1, "ok": true, "locked": false})
    );

    let dispatcher = server.shutdown().await;
    assert!(dispatcher.handler().coordinator().active_locks().is_empty());
}

#[tokio::test]
async fn test_server_accepts_crlf_frame_at_exact_limit() {
    let frame = json!({"event": "lock:status", "id": 1, "data": {"taskId": "task-1"}});
    let line = frame.to_string();
    let server = TestServer::start(config_with_frame_limit(line.len())).await;
    let mut client = Client::connect(server.addr).await;

    client.send_raw(format!("{}\r", line).as_bytes()).await;

    assert_eq!(
        client.recv().await,
        json!({"ack": 1, "ok": true, "locked": false})
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_acquires_have_exactly_one_winner() {
    const CLIENTS: usize = 16;
    let server = TestServer::start(Config::default()).await;
    let mut clients = Vec::with_capacity(CLIENTS);
    for _ in 0..CLIENTS {
        clients.push(Client::connect(server.addr).await);
    }

    let acks = futures::future::join_all(clients.iter_mut().enumerate().map(
        |(i, client)| async move {
            client
                .send(json!({"event": "lock:acquire", "id": i, "data": {"taskId": "task-1"}}))
                .await;
            client.recv().await
        },
    ))
    .await;

    let winners: Vec<usize> = acks
        .iter()
        .enumerate()
        .filter(|(_, ack)| ack["ok"] == json!(true))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(winners.len(), 1, "acks: {:?}", acks);
    let winner = winners[0];
    let owner = acks[winner]["lock"]["owner"].clone();

    for (i, ack) in acks.iter().enumerate() {
        assert_eq!(ack["ack"], json!(i));
        if i != winner {
            assert_eq!(
                ack,
                &json!({"ack": i, "ok": false, "reason": "ALREADY_LOCKED", "owner": owner})
            );
        }
    }

    // Every session sees the same owner afterwards.
    for (i, client) in clients.iter_mut().enumerate() {
        if i == winner {
            assert_eq!(
                client.recv().await,
                json!({"event": "task:locked", "data": {"taskId": "task-1", "owner": owner}})
            );
        }
        client
            .send(json!({"event": "lock:status", "id": "s", "data": {"taskId": "task-1"}}))
            .await;
        assert_eq!(
            client.recv().await,
            json!({"ack": "s", "ok": true, "locked": true, "owner": owner})
        );
    }

    drop(clients);
    let dispatcher = server.shutdown().await;
    let coordinator = dispatcher.handler().coordinator();
    assert!(coordinator.is_consistent());
    assert!(coordinator.active_locks().is_empty());
}
