//! # cord-gateway
//!
//! The gateway half of cord: persistent WebSocket connections to the
//! platform's event stream.
//!
//! - [`Shard`] - one connection's state machine: identify/resume
//!   handshakes, the heartbeat loop, and the reconnect decision table
//! - [`ShardManager`] - spawns and reaps the shard fleet, serializes
//!   `IDENTIFY`s through a shared gate, and routes guild-scoped commands
//!   to the owning shard
//! - [`ShardEvent`] - the fan-in stream the client facade consumes

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod heartbeat;
pub mod manager;
pub mod reconnect;
pub mod send_limit;
pub mod shard;
pub mod state;

pub use error::GatewayError;
pub use events::ShardEvent;
pub use heartbeat::{start_heartbeat_task, HeartbeatHandle};
pub use manager::{IdentifyGate, ShardManager, ShardRunner};
pub use reconnect::ReconnectConfig;
pub use send_limit::SendLimiter;
pub use shard::{GatewayConfig, GatewayVersion, SequenceTracker, Shard, ShardCommand};
pub use state::{AtomicShardState, ShardState};
