//! Command implementations for tasklock.
//!
//! This module routes CLI commands to their implementations.

mod config_cmd;
mod replay;
mod serve;

use crate::cli::Command;
use crate::config::Config;
use crate::error::Result;
use crate::events::EventLog;

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Serve(args) => serve::cmd_serve(args),
        Command::Replay(args) => replay::cmd_replay(args),
        Command::Config(args) => config_cmd::cmd_config(args),
    }
}

/// Open the audit log named by `events_path`, or a disabled sink.
fn open_event_log(config: &Config) -> Result<EventLog> {
    match &config.events_path {
        Some(path) => EventLog::open(path),
        None => Ok(EventLog::disabled()),
    }
}
