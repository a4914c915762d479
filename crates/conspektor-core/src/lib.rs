//! Conspektor Core Library
//!
//! Client side of a collaborative plain-text notes editor. Each open document
//! is a CRDT replica kept in sync with a collaboration hub, with a REST
//! gateway holding the durable copy.
//!
//! # Architecture
//!
//! - **Automerge**: The document replica; merges concurrent edits
//! - **Hub**: WebSocket relay exchanging hex-encoded deltas
//! - **Gateway**: REST persistence used as a periodic fallback save
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let identity = DocumentIdentity::new("42", "alice")?;
//! let gateway = GatewayClient::new(&config.gateway_url)?;
//!
//! let handle = spawn_session((&config).into(), identity, AutomergeReplica::new(), gateway);
//! handle.edit("Hello".to_string()).await?;
//! handle.exit().await?;
//! ```
//!
//! # Modules
//!
//! - `replica`: Replica engine trait and the Automerge adapter
//! - `codec`: Hex text encoding of deltas
//! - `identity`: Document identity and URL building
//! - `view`: Editor view mirror
//! - `sync`: Session state machine and the live connection driver
//! - `persistence`: REST gateway client
//! - `config`: Application configuration

pub mod codec;
pub mod config;
pub mod identity;
pub mod persistence;
pub mod replica;
pub mod sync;
pub mod view;

pub use codec::CodecError;
pub use config::Config;
pub use identity::{DocumentIdentity, IdentityError};
pub use persistence::{GatewayClient, PersistenceError, SnapshotStore};
pub use replica::{AutomergeReplica, CausalSummary, Delta, ReplicaEngine, ReplicaError};
pub use sync::{spawn_session, SessionEvent, SessionHandle, SessionState, SyncSession};
pub use view::{ViewSnapshot, ViewState};
