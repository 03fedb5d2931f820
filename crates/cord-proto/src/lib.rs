//! # cord-proto
//!
//! Wire protocol types shared by the gateway and REST halves of cord:
//!
//! - [`Snowflake`] and the typed id newtypes built on it
//! - [`OpCode`] / [`GatewayPayload`] - the raw gateway frame shape
//! - [`Event`] - typed dispatch events with a forward-compatible
//!   [`Event::Unknown`] variant
//! - [`Intents`] - the event-category bitmask sent with `IDENTIFY`
//! - [`CloseCode`] - gateway close codes and their reconnect policy
//! - Domain models for guilds, channels, members, and messages

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod close_code;
pub mod error;
pub mod event;
pub mod id;
pub mod intents;
pub mod model;
pub mod opcode;
pub mod payload;

pub use close_code::{CloseCode, ReconnectPolicy};
pub use error::ProtoError;
pub use event::{Event, EventKind};
pub use id::{
    ApplicationId, ChannelId, GuildId, MessageId, RoleId, Snowflake, UserId, WebhookId,
};
pub use intents::Intents;
pub use model::{
    BotGatewayInfo, Channel, ChannelType, CurrentUser, GatewayInfo, Group, Guild, GuildChannel,
    Member, MemberAdd, MemberRemove, MemberUpdate, Message, MessageDelete, PartialGuild, Presence,
    PresenceUser, PrivateChannel, Ready, Role, RoleCreate, RoleDelete, SessionStartLimit,
    TypingStart, UnavailableGuild, User, VoiceServerInfo, VoiceState,
};
pub use opcode::OpCode;
pub use payload::{
    Activity, GatewayPayload, Hello, Identify, IdentifyProperties, OnlineStatus,
    RequestGuildMembers, Resume, StatusUpdate, VoiceStateUpdate,
};
