//! Implementation of the `tasklock replay` command.
//!
//! Drives a [`Dispatcher`] from a script instead of sockets. One JSON object
//! per line; blank lines and lines starting with `#` are skipped:
//!
//! ```text
//! {"session": "a", "event": "lock:acquire", "id": 1, "data": {"taskId": "task-1"}}
//! {"session": "b", "event": "lock:watch", "data": {"taskId": "task-1"}}
//! {"session": "a", "disconnect": true}
//! ```
//!
//! Everything but `session` and `disconnect` is passed through as the frame.
//! A session is connected the first time it appears.


use super::open_event_log;
use crate::cli::ReplayArgs;
use crate::config::Config;
use crate::error::{Result, TaskLockError};
use crate::transport::{Delivery, Dispatcher, Recipient};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};

/// Execute the `tasklock replay` command.
pub fn cmd_replay(args: ReplayArgs) -> Result<()> {
    let config = Config::resolve(args.config.as_deref(), None)?;
    let script = std::fs::read_to_string(&args.script).map_err(|e| {
        TaskLockError::UserError(format!(
            "failed to read replay script '{}': {}",
            args.script.display(),
            e
        ))
    })?;

    let events = open_event_log(&config)?;
    let mut dispatcher = Dispatcher::new(&config, events);
    for line in run_script(&mut dispatcher, &script)? {
        println!("{}", line);
    }

    println!();
    let coordinator = dispatcher.handler().coordinator();
    let locks = coordinator.active_locks();
    if locks.is_empty() {
        println!("No active locks.");
    } else {
        println!(
            "Active locks ({} held by {} session(s)):",
            locks.len(),
            coordinator.session_count()
        );
        let owners: BTreeSet<&str> = locks.iter().map(|lock| lock.owner.as_str()).collect();
        for owner in owners {
            println!("  {}: {}", owner, coordinator.held_by(owner).join(", "));
        }
    }

    Ok(())
}

/// Run every script line through `dispatcher`.
///
/// Returns one transcript line per delivery: `<recipient> <- <frame>`, where
/// the recipient is a session id or `*` for everyone.
pub fn run_script(dispatcher: &mut Dispatcher, script: &str) -> Result<Vec<String>> {
    let mut connected: HashSet<String> = HashSet::new();
    let mut transcript = Vec::new();

    for (index, raw) in script.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let step = parse_step(trimmed).map_err(|msg| {
            TaskLockError::UserError(format!("replay script line {}: {}", line_no, msg))
        })?;

        if connected.insert(step.session.clone()) {
            dispatcher.on_connect(&step.session);
        }

        let deliveries = match step.frame {
            Some(frame) => dispatcher.on_frame(&step.session, &frame),
            None => {
                connected.remove(&step.session);
                dispatcher.on_disconnect(&step.session)
            }
        };
        transcript.extend(deliveries.iter().map(format_delivery));
    }

    Ok(transcript)
}

struct Step {
    session: String,
    /// Encoded frame, or `None` for a disconnect.
    frame: Option<String>,
}

fn parse_step(line: &str) -> std::result::Result<Step, String> {
    let mut value: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
    let Some(object) = value.as_object_mut() else {
        return Err("expected a JSON object".to_string());
    };

    let session = match object.remove("session") {
        Some(Value::String(session)) if !session.trim().is_empty() => session,
        _ => return Err("\"session\" must be a non-empty string".to_string()),
    };
    let disconnect = object
        .remove("disconnect")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    Ok(Step {
        session,
        frame: (!disconnect).then(|| value.to_string()),
    })
}

fn format_delivery(delivery: &Delivery) -> String {
    match &delivery.to {
        Recipient::Session(session) => format!("{} <- {}", session, delivery.line),
        Recipient::Everyone => format!("* <- {}", delivery.line),
    }
}
