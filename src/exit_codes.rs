//! Exit code constants for the tasklock CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, unreadable replay script)
//! - 2: Configuration error (invalid YAML or values)
//! - 3: Transport failure (bind, accept, socket I/O)
//! - 4: Event log failure (audit log could not be opened)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or unreadable input files.
pub const USER_ERROR: i32 = 1;

/// Configuration could not be loaded or failed validation.
pub const CONFIG_FAILURE: i32 = 2;

/// The listener or a connection failed at the socket level.
pub const TRANSPORT_FAILURE: i32 = 3;

/// The audit log could not be opened or written.
pub const EVENT_LOG_FAILURE: i32 = 4;
