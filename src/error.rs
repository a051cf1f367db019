//! Error types for the tasklock server.
//!
//! Uses thiserror for derive macros. These are process-level failures; lock
//! conflicts are ordinary acknowledgement values and live in
//! [`crate::locks::LockError`] instead.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for tasklock operations.
#[derive(Error, Debug)]
pub enum TaskLockError {
    /// User provided invalid arguments or unreadable input.
    #[error("{0}")]
    UserError(String),

    /// Configuration could not be parsed or failed validation.
    #[error("config error: {0}")]
    ConfigError(String),

    /// Listener or connection I/O failed.
    #[error("transport error: {0}")]
    TransportError(String),

    /// The audit log could not be opened or written.
    #[error("event log error: {0}")]
    EventLogError(String),
}

impl TaskLockError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            TaskLockError::UserError(_) => exit_codes::USER_ERROR,
            TaskLockError::ConfigError(_) => exit_codes::CONFIG_FAILURE,
            TaskLockError::TransportError(_) => exit_codes::TRANSPORT_FAILURE,
            TaskLockError::EventLogError(_) => exit_codes::EVENT_LOG_FAILURE,
        }
    }
}

/// Result type alias for tasklock operations.
pub type Result<T> = std::result::Result<T, TaskLockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_error_has_correct_exit_code() {
        let err = TaskLockError::UserError("bad argument".to_string());
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    }

    #[test]
    fn config_error_has_correct_exit_code() {
        let err = TaskLockError::ConfigError("max_frame_bytes must be positive".to_string());
        assert_eq!(err.exit_code(), exit_codes::CONFIG_FAILURE);
    }

    #[test]
    fn transport_error_has_correct_exit_code() {
        let err = TaskLockError::TransportError("address in use".to_string());
        assert_eq!(err.exit_code(), exit_codes::TRANSPORT_FAILURE);
    }

    #[test]
    fn event_log_error_has_correct_exit_code() {
        let err = TaskLockError::EventLogError("permission denied".to_string());
        assert_eq!(err.exit_code(), exit_codes::EVENT_LOG_FAILURE);
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = TaskLockError::ConfigError("listen_addr is invalid".to_string());
        assert_eq!(err.to_string(), "config error: listen_addr is invalid");

        let err = TaskLockError::UserError("script not found".to_string());
        assert_eq!(err.to_string(), "script not found");
    }
}
