//! Configuration model for tasklock.
//!
//! This module defines the Config struct read from a YAML file (for example
//! `tasklock.yaml`). It supports forward-compatible YAML parsing (unknown
//! fields are ignored), defaults for every field, environment overrides, and
//! validation of config values.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::Config;
pub use types::{ENV_EVENTS_PATH, ENV_LISTEN_ADDR};
