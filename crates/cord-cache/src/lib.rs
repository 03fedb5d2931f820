//! # cord-cache
//!
//! The in-memory half of event handling:
//!
//! - [`Cache`] - guilds, channels, members, and DMs, mutated by dispatch
//!   events under a single write lock so readers never observe a
//!   half-applied event
//! - [`EventDispatcher`] - per-event listener lists invoked in
//!   registration order after the cache mutation lands

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod dispatcher;

pub use cache::{Cache, CachedGuild, ChannelOwner};
pub use dispatcher::EventDispatcher;
