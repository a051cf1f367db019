//! Line-delimited JSON over TCP.
//!
//! - [`frame`]: the NDJSON codec and the bounded line codec
//! - [`Dispatcher`]: single-owner routing of frames to the protocol and task path
//! - [`Server`]: tokio listener plus per-session reader and writer tasks

mod dispatcher;
pub mod frame;
mod server;

#[cfg(test)]
mod tests;

pub use dispatcher::{Delivery, Dispatcher, Recipient};
pub use server::Server;
