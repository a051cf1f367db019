//! Realtime lock protocol.
//!
//! Maps inbound session requests onto the lock coordinator and shapes the
//! results into acknowledgements and channel broadcasts:
//!
//! - `lock:acquire`: `{ok:true, lock}` or `{ok:false, reason, owner?}`;
//!   broadcasts `task:locked` to the channel
//! - `lock:release`: `{ok:true}` or `{ok:false, reason}`; broadcasts
//!   `task:unlocked` to the channel
//! - `lock:status`: `{ok:true, locked, owner?}` or `{ok:false, reason}`
//! - `lock:watch` and `lock:unwatch`: `{ok:true}` or `{ok:false, reason}`
//!
//! A disconnect produces no ack, only one `task:unlocked` per freed task.

mod channels;
mod handler;
mod messages;
mod payload;


pub use handler::{Disconnect, ProtocolHandler, Reply};
pub use messages::{Ack, Audience, Broadcast, LockEvent, ServerEvent};
