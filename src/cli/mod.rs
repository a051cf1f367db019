//! CLI argument parsing for tasklock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! Implementations live in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tasklock: in-memory task lock coordinator with a realtime lock protocol.
///
/// Sessions connect over TCP and exchange newline-delimited JSON frames:
/// - `lock:acquire` / `lock:release` take and drop exclusive edit locks
/// - `task:locked` / `task:unlocked` are broadcast to a task's channel
/// - `task:update` / `task:delete` are refused while a task is locked,
///   unless the request carries the lock token
#[derive(Parser, Debug)]
#[command(name = "tasklock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for tasklock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the lock server.
    ///
    /// Binds the configured listen address and serves sessions until the
    /// process is stopped. All locks live in memory and vanish on exit.
    Serve(ServeArgs),

    /// Run a scripted session exchange without a network.
    ///
    /// Reads NDJSON lines of the form
    /// `{"session": "a", "event": "lock:acquire", "data": {...}}` or
    /// `{"session": "a", "disconnect": true}` and prints every ack and
    /// broadcast with its recipient.
    Replay(ReplayArgs),

    /// Print the effective configuration as YAML.
    ///
    /// Shows the result of the config file, `TASKLOCK_*` environment
    /// overrides, and defaults.
    Config(ConfigArgs),
}

/// Arguments for the `serve` command.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Path to a YAML config file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen address (overrides config and environment), e.g. 127.0.0.1:4100.
    #[arg(short, long)]
    pub listen: Option<String>,
}

/// Arguments for the `replay` command.
#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// NDJSON script to run.
    pub script: PathBuf,

    /// Path to a YAML config file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the `config` command.
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Path to a YAML config file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
