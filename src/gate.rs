//! Mutation gate for the stateless write path.
//!
//! Requests that modify or delete a task without going through the realtime
//! protocol are checked here first. The only credential that crosses over is
//! the lock token (carried as a request header); session ids never do.
//!
//! | Lock state           | Presented token     | Decision |
//! |----------------------|---------------------|----------|
//! | unlocked             | anything / none     | allow    |
//! | locked               | equals lock token   | allow    |
//! | locked               | absent or different | deny 423 |

use crate::locks::LockCoordinator;
use serde::Serialize;
use std::collections::BTreeMap;

/// HTTP-analog status for a rejected mutation.
pub const LOCKED_STATUS: u16 = 423;

/// Error code reported with a locked rejection.
pub const LOCKED_CODE: &str = "LOCKED";

/// Human-readable message reported with a locked rejection.
pub const LOCKED_MESSAGE: &str = "Task is locked";

/// Default header name carrying the capability token.
pub const DEFAULT_TOKEN_HEADER: &str = "x-lock-token";

/// Outcome of a gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The mutation may proceed.
    Allow,
    /// A live lock protects the task and no valid token was presented.
    Deny(LockedRejection),
}

impl GateDecision {
    #[cfg(test)]
    pub(crate) fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }
}

/// Body of a locked rejection, shaped like an API error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockedRejection {
    pub status: u16,
    pub code: &'static str,
    pub message: &'static str,
    /// Session holding the lock, for audit only; not sent to the caller.
    #[serde(skip)]
    pub owner: String,
}

/// Read-only view of the coordinator used by the mutation path.
pub struct MutationGate<'a> {
    coordinator: &'a LockCoordinator,
}

impl<'a> MutationGate<'a> {
    pub fn new(coordinator: &'a LockCoordinator) -> Self {
        Self { coordinator }
    }

    /// Decide whether a mutation of `task_id` may proceed.
    pub fn check(&self, task_id: &str, token: Option<&str>) -> GateDecision {
        let Some(lock) = self.coordinator.query(task_id) else {
            return GateDecision::Allow;
        };

        if token.is_some_and(|t| lock.matches_token(t)) {
            return GateDecision::Allow;
        }

        GateDecision::Deny(LockedRejection {
            status: LOCKED_STATUS,
            code: LOCKED_CODE,
            message: LOCKED_MESSAGE,
            owner: lock.owner.clone(),
        })
    }
}

/// Pull the token out of request headers.
///
/// Header names are matched case-insensitively. Blank values count as absent.
pub fn token_from_headers<'h>(
    headers: &'h BTreeMap<String, String>,
    header_name: &str,
) -> Option<&'h str> {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(header_name))
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}
