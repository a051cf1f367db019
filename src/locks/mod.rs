//! Locking subsystem for tasklock.
//!
//! This module owns the exclusive-edit lock model:
//! - Ownership table: task id -> [`Lock`] (owner session, capability token, timestamp)
//! - Session index: session id -> set of task ids the session currently holds
//!
//! Both tables live inside [`LockCoordinator`] and are only ever mutated
//! together, so a lock exists for a task exactly when that task is listed
//! under its owner in the session index.
//!
//! # Acquire / Release
//!
//! Acquisition is fail-fast: a losing caller gets [`LockError::AlreadyLocked`]
//! naming the current owner and is never queued. Re-acquiring a lock you
//! already hold returns the existing lock with the same token.
//!
//! Release succeeds for the owning session, or for any caller presenting the
//! lock's token. Disconnect releases everything a session holds in one step.
//!
//! # Tokens
//!
//! Each lock carries an unguessable token generated once per lock lifetime.
//! The token is the only credential accepted by the mutation gate, and it is
//! never disclosed to sessions other than the owner.

mod coordinator;
mod table;
mod types;


pub use coordinator::LockCoordinator;
pub use types::{Lock, LockError, LockReason};
