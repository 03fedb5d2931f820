//! Typed dispatch events.

use serde_json::Value;

use crate::error::ProtoError;
use crate::model::{
    Channel, Guild, MemberAdd, MemberRemove, MemberUpdate, Message, MessageDelete, PartialGuild,
    Presence, Ready, RoleCreate, RoleDelete, TypingStart, UnavailableGuild, VoiceServerInfo,
    VoiceState,
};

/// A dispatch event, parsed from the `t`/`d` pair of an op-0 frame.
///
/// Event names this client does not recognize parse into
/// [`Event::Unknown`] with the raw payload retained, so new server events
/// never break the read loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Session is live; carries the session id and unavailable guilds.
    Ready(Ready),
    /// Replay after `RESUME` is complete.
    Resumed,
    /// A guild became available or was joined.
    GuildCreate(Guild),
    /// Guild settings changed.
    GuildUpdate(PartialGuild),
    /// A guild became unavailable or was left.
    GuildDelete(UnavailableGuild),
    /// A channel was created.
    ChannelCreate(Channel),
    /// A channel changed.
    ChannelUpdate(Channel),
    /// A channel was deleted.
    ChannelDelete(Channel),
    /// A member joined a guild.
    GuildMemberAdd(MemberAdd),
    /// A member changed.
    GuildMemberUpdate(MemberUpdate),
    /// A member left a guild.
    GuildMemberRemove(MemberRemove),
    /// A role was created.
    GuildRoleCreate(RoleCreate),
    /// A role changed.
    GuildRoleUpdate(RoleCreate),
    /// A role was deleted.
    GuildRoleDelete(RoleDelete),
    /// A message was sent.
    MessageCreate(Message),
    /// A message was edited.
    MessageUpdate(Message),
    /// A message was deleted.
    MessageDelete(MessageDelete),
    /// A member's presence changed.
    PresenceUpdate(Presence),
    /// A user started typing.
    TypingStart(TypingStart),
    /// A member's voice state changed.
    VoiceStateUpdate(VoiceState),
    /// Voice server credentials, for the external voice subsystem.
    VoiceServerUpdate(VoiceServerInfo),
    /// An event this client does not model.
    Unknown {
        /// The wire event name.
        name: String,
        /// The raw payload.
        raw: Value,
    },
}

impl Event {
    /// Parse a dispatch from its event name and payload.
    ///
    /// # Errors
    ///
    /// Returns an error if a recognized event's payload does not have the
    /// required shape. Unrecognized names succeed as [`Event::Unknown`].
    pub fn parse(name: &str, d: Value) -> Result<Self, ProtoError> {
        let event = match name {
            "READY" => Self::Ready(serde_json::from_value(d)?),
            "RESUMED" => Self::Resumed,
            "GUILD_CREATE" => Self::GuildCreate(serde_json::from_value(d)?),
            "GUILD_UPDATE" => Self::GuildUpdate(serde_json::from_value(d)?),
            "GUILD_DELETE" => Self::GuildDelete(serde_json::from_value(d)?),
            "CHANNEL_CREATE" => Self::ChannelCreate(serde_json::from_value(d)?),
            "CHANNEL_UPDATE" => Self::ChannelUpdate(serde_json::from_value(d)?),
            "CHANNEL_DELETE" => Self::ChannelDelete(serde_json::from_value(d)?),
            "GUILD_MEMBER_ADD" => Self::GuildMemberAdd(serde_json::from_value(d)?),
            "GUILD_MEMBER_UPDATE" => Self::GuildMemberUpdate(serde_json::from_value(d)?),
            "GUILD_MEMBER_REMOVE" => Self::GuildMemberRemove(serde_json::from_value(d)?),
            "GUILD_ROLE_CREATE" => Self::GuildRoleCreate(serde_json::from_value(d)?),
            "GUILD_ROLE_UPDATE" => Self::GuildRoleUpdate(serde_json::from_value(d)?),
            "GUILD_ROLE_DELETE" => Self::GuildRoleDelete(serde_json::from_value(d)?),
            "MESSAGE_CREATE" => Self::MessageCreate(serde_json::from_value(d)?),
            "MESSAGE_UPDATE" => Self::MessageUpdate(serde_json::from_value(d)?),
            "MESSAGE_DELETE" => Self::MessageDelete(serde_json::from_value(d)?),
            "PRESENCE_UPDATE" => Self::PresenceUpdate(serde_json::from_value(d)?),
            "TYPING_START" => Self::TypingStart(serde_json::from_value(d)?),
            "VOICE_STATE_UPDATE" => Self::VoiceStateUpdate(serde_json::from_value(d)?),
            "VOICE_SERVER_UPDATE" => Self::VoiceServerUpdate(serde_json::from_value(d)?),
            _ => Self::Unknown {
                name: name.to_string(),
                raw: d,
            },
        };
        Ok(event)
    }

    /// The kind of this event, for listener registration.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Ready(_) => EventKind::Ready,
            Self::Resumed => EventKind::Resumed,
            Self::GuildCreate(_) => EventKind::GuildCreate,
            Self::GuildUpdate(_) => EventKind::GuildUpdate,
            Self::GuildDelete(_) => EventKind::GuildDelete,
            Self::ChannelCreate(_) => EventKind::ChannelCreate,
            Self::ChannelUpdate(_) => EventKind::ChannelUpdate,
            Self::ChannelDelete(_) => EventKind::ChannelDelete,
            Self::GuildMemberAdd(_) => EventKind::GuildMemberAdd,
            Self::GuildMemberUpdate(_) => EventKind::GuildMemberUpdate,
            Self::GuildMemberRemove(_) => EventKind::GuildMemberRemove,
            Self::GuildRoleCreate(_) => EventKind::GuildRoleCreate,
            Self::GuildRoleUpdate(_) => EventKind::GuildRoleUpdate,
            Self::GuildRoleDelete(_) => EventKind::GuildRoleDelete,
            Self::MessageCreate(_) => EventKind::MessageCreate,
            Self::MessageUpdate(_) => EventKind::MessageUpdate,
            Self::MessageDelete(_) => EventKind::MessageDelete,
            Self::PresenceUpdate(_) => EventKind::PresenceUpdate,
            Self::TypingStart(_) => EventKind::TypingStart,
            Self::VoiceStateUpdate(_) => EventKind::VoiceStateUpdate,
            Self::VoiceServerUpdate(_) => EventKind::VoiceServerUpdate,
            Self::Unknown { .. } => EventKind::Unknown,
        }
    }
}

/// Discriminant of [`Event`], used as the listener registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)] // names mirror the Event variants one-to-one
pub enum EventKind {
    Ready,
    Resumed,
    GuildCreate,
    GuildUpdate,
    GuildDelete,
    ChannelCreate,
    ChannelUpdate,
    ChannelDelete,
    GuildMemberAdd,
    GuildMemberUpdate,
    GuildMemberRemove,
    GuildRoleCreate,
    GuildRoleUpdate,
    GuildRoleDelete,
    MessageCreate,
    MessageUpdate,
    MessageDelete,
    PresenceUpdate,
    TypingStart,
    VoiceStateUpdate,
    VoiceServerUpdate,
    Unknown,
}
