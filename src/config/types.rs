//! Configuration defaults and environment variable names.

/// Overrides `listen_addr` when set.
pub const ENV_LISTEN_ADDR: &str = "TASKLOCK_LISTEN_ADDR";

/// Overrides `events_path` when set.
pub const ENV_EVENTS_PATH: &str = "TASKLOCK_EVENTS_PATH";

// Default value functions for serde
pub(crate) fn default_listen_addr() -> String {
    "127.0.0.1:4100".to_string()
}
pub(crate) fn default_max_frame_bytes() -> usize {
    64 * 1024
}
pub(crate) fn default_outbox_capacity() -> usize {
    256
}
pub(crate) fn default_lock_token_header() -> String {
    crate::gate::DEFAULT_TOKEN_HEADER.to_string()
}
pub(crate) fn default_true() -> bool {
    true
}
