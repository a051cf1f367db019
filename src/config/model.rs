//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Configuration for a tasklock server.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Transport settings
    // =========================================================================
    /// Socket address the server listens on (default: "127.0.0.1:4100").
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Largest accepted inbound frame in bytes, newline excluded.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Outbound lines queued per session before it is dropped as too slow.
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,

    // =========================================================================
    // Channel settings
    // =========================================================================
    /// Whether sessions may watch tasks they do not own.
    #[serde(default = "default_true")]
    pub watchers_enabled: bool,

    // =========================================================================
    // Mutation gate settings
    // =========================================================================
    /// Header carrying the lock token on task mutation requests.
    #[serde(default = "default_lock_token_header")]
    pub lock_token_header: String,

    // =========================================================================
    // Audit settings
    // =========================================================================
    /// NDJSON audit log path. Logging is off when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_frame_bytes: default_max_frame_bytes(),
            outbox_capacity: default_outbox_capacity(),
            watchers_enabled: default_true(),
            lock_token_header: default_lock_token_header(),
            events_path: None,
        }
    }
}
