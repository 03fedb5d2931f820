//! # cord
//!
//! A client library core for a large chat platform's bot API.
//!
//! The [`Client`] owns three subsystems and wires them together:
//!
//! - a sharded gateway (one WebSocket per shard, identify/resume
//!   handshakes, heartbeats, reconnect policy)
//! - a REST client whose every request passes a rate-limit governor
//! - an in-memory cache mutated by dispatch events before listeners run
//!
//! ```no_run
//! use cord::{Client, Config};
//! use cord_proto::EventKind;
//!
//! # async fn run() -> Result<(), cord::ClientError> {
//! let client = Client::start(Config::new("my-bot-token")).await?;
//! client.on(EventKind::MessageCreate, |event| {
//!     println!("message: {event:?}");
//! });
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod error;

pub use client::Client;
pub use config::{Config, ShardScheme};
pub use error::ClientError;

pub use cord_cache::{Cache, CachedGuild, ChannelOwner, EventDispatcher};
pub use cord_gateway::{GatewayError, GatewayVersion, ShardState};
pub use cord_proto::{Event, EventKind, Intents};
pub use cord_rest::{RestError, BULK_DELETE_MAX_AGE_DAYS};
