//! Live sync with the collaboration hub
//!
//! Keeps one document replica converged with the hub over a WebSocket.
//!
//! ## Protocol
//!
//! JSON text frames, deltas hex-encoded:
//! 1. Connect to `{hub}/ws/documents/{id}?token={user}`
//! 2. Hub sends `sync` with the full snapshot
//! 3. Client applies it and answers once with `sync_request` carrying its heads
//! 4. Both sides exchange `update` frames for incremental changes
//!
//! `error` and `info` frames are reported and never end the session.
//!
//! ## Usage
//!
//! ```ignore
//! let handle = spawn_session(config, identity, AutomergeReplica::new(), gateway);
//! handle.edit("Hello".to_string()).await?;
//! handle.exit().await?;
//! ```

mod applier;
mod connection;
mod message;
mod pipeline;
mod session;

pub use connection::{spawn_session, SessionCommand, SessionConfig, SessionHandle};
pub use message::{ClientMessage, ServerMessage};
pub use pipeline::Debouncer;
pub use session::{
    SessionError, SessionEvent, SessionState, SessionStats, SyncSession, DEFAULT_DEBOUNCE,
};
