//! Domain entities, at the identity-and-relations level the client models.
//!
//! Unknown wire fields are ignored and optional fields default, so payload
//! additions on the server never break parsing.

use serde::{Deserialize, Serialize};

use crate::id::{ChannelId, GuildId, MessageId, RoleId, UserId};

/// A user visible to the bot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// User id.
    pub id: UserId,
    /// Username.
    #[serde(default)]
    pub username: String,
    /// Legacy discriminator, when present.
    #[serde(default)]
    pub discriminator: Option<String>,
    /// Avatar hash.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Whether this user is a bot.
    #[serde(default)]
    pub bot: bool,
}

/// The bot's own user, from `READY`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentUser {
    /// User id.
    pub id: UserId,
    /// Username.
    #[serde(default)]
    pub username: String,
    /// Legacy discriminator, when present.
    #[serde(default)]
    pub discriminator: Option<String>,
    /// Whether the account is a bot (always true for this client).
    #[serde(default)]
    pub bot: bool,
}

/// A guild member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Member {
    /// The member's user.
    pub user: User,
    /// Per-guild nickname.
    #[serde(default)]
    pub nick: Option<String>,
    /// Role ids held by this member.
    #[serde(default)]
    pub roles: Vec<RoleId>,
    /// ISO-8601 join timestamp.
    #[serde(default)]
    pub joined_at: Option<String>,
    /// Server-deafened.
    #[serde(default)]
    pub deaf: bool,
    /// Server-muted.
    #[serde(default)]
    pub mute: bool,
}

/// A guild role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    /// Role id.
    pub id: RoleId,
    /// Role name.
    #[serde(default)]
    pub name: String,
    /// Packed RGB color.
    #[serde(default)]
    pub color: u32,
    /// Sort position.
    #[serde(default)]
    pub position: i64,
    /// Permission bitmask.
    #[serde(default)]
    pub permissions: u64,
    /// Displayed separately in the member list.
    #[serde(default)]
    pub hoist: bool,
    /// Mentionable by everyone.
    #[serde(default)]
    pub mentionable: bool,
    /// Managed by an integration.
    #[serde(default)]
    pub managed: bool,
}

/// Kind of a channel, as carried in the wire `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    /// A text channel inside a guild.
    GuildText,
    /// A one-on-one direct message channel.
    Private,
    /// A voice channel inside a guild.
    GuildVoice,
    /// A group direct message channel.
    Group,
    /// A category grouping guild channels.
    GuildCategory,
    /// A channel type this client does not know about.
    Unknown(u8),
}

impl ChannelType {
    /// Numeric wire value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::GuildText => 0,
            Self::Private => 1,
            Self::GuildVoice => 2,
            Self::Group => 3,
            Self::GuildCategory => 4,
            Self::Unknown(value) => value,
        }
    }

    /// Parse the numeric wire value.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::GuildText,
            1 => Self::Private,
            2 => Self::GuildVoice,
            3 => Self::Group,
            4 => Self::GuildCategory,
            other => Self::Unknown(other),
        }
    }

    /// Whether channels of this kind live inside a guild.
    #[must_use]
    pub const fn is_guild(self) -> bool {
        matches!(self, Self::GuildText | Self::GuildVoice | Self::GuildCategory)
    }
}

impl Serialize for ChannelType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for ChannelType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        Ok(Self::from_u8(value))
    }
}

impl Default for ChannelType {
    fn default() -> Self {
        Self::GuildText
    }
}

/// The wire superset of every channel shape.
///
/// `CHANNEL_*` dispatches carry this; the cache narrows it by
/// [`ChannelType`] into a guild channel, DM, or group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    /// Channel id.
    pub id: ChannelId,
    /// Channel kind.
    #[serde(rename = "type", default)]
    pub kind: ChannelType,
    /// Owning guild, for guild channels.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// Channel name, for guild channels and groups.
    #[serde(default)]
    pub name: Option<String>,
    /// Sort position, for guild channels.
    #[serde(default)]
    pub position: Option<i64>,
    /// Channel topic.
    #[serde(default)]
    pub topic: Option<String>,
    /// Parent category.
    #[serde(default)]
    pub parent_id: Option<ChannelId>,
    /// Recipients, for DMs and groups.
    #[serde(default)]
    pub recipients: Vec<User>,
    /// Group owner.
    #[serde(default)]
    pub owner_id: Option<UserId>,
}

impl Channel {
    /// The single DM recipient, when this is a private channel.
    #[must_use]
    pub fn recipient(&self) -> Option<&User> {
        if self.kind == ChannelType::Private {
            self.recipients.first()
        } else {
            None
        }
    }
}

/// A channel inside a guild.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuildChannel {
    /// Channel id.
    pub id: ChannelId,
    /// Channel kind.
    #[serde(rename = "type", default)]
    pub kind: ChannelType,
    /// Owning guild. Absent inside `GUILD_CREATE` payloads, where the
    /// guild is implied.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// Channel name.
    #[serde(default)]
    pub name: String,
    /// Sort position.
    #[serde(default)]
    pub position: i64,
    /// Channel topic.
    #[serde(default)]
    pub topic: Option<String>,
    /// Parent category.
    #[serde(default)]
    pub parent_id: Option<ChannelId>,
}

impl From<Channel> for GuildChannel {
    fn from(channel: Channel) -> Self {
        Self {
            id: channel.id,
            kind: channel.kind,
            guild_id: channel.guild_id,
            name: channel.name.unwrap_or_default(),
            position: channel.position.unwrap_or_default(),
            topic: channel.topic,
            parent_id: channel.parent_id,
        }
    }
}

/// A one-on-one direct message channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrivateChannel {
    /// Channel id.
    pub id: ChannelId,
    /// The other party.
    pub recipient: User,
}

/// A group direct message channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    /// Channel id.
    pub id: ChannelId,
    /// Group name, when set.
    #[serde(default)]
    pub name: Option<String>,
    /// Group owner.
    #[serde(default)]
    pub owner_id: Option<UserId>,
    /// Group recipients.
    #[serde(default)]
    pub recipients: Vec<User>,
}

/// A guild as carried by `GUILD_CREATE`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Guild {
    /// Guild id.
    pub id: GuildId,
    /// Guild name.
    #[serde(default)]
    pub name: String,
    /// Owning user.
    #[serde(default)]
    pub owner_id: Option<UserId>,
    /// Channels, present on `GUILD_CREATE`.
    #[serde(default)]
    pub channels: Vec<GuildChannel>,
    /// Members, present on `GUILD_CREATE` (capped for large guilds).
    #[serde(default)]
    pub members: Vec<Member>,
    /// Roles.
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Presences, present on `GUILD_CREATE` for small guilds.
    #[serde(default)]
    pub presences: Vec<Presence>,
    /// Total member count.
    #[serde(default)]
    pub member_count: Option<u64>,
    /// More members than the large threshold.
    #[serde(default)]
    pub large: bool,
    /// Guild is unavailable due to an outage.
    #[serde(default)]
    pub unavailable: bool,
}

/// The partial guild carried by `GUILD_UPDATE`; fields present on the wire
/// replace the cached values, absent ones are kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartialGuild {
    /// Guild id.
    pub id: GuildId,
    /// New name, when changed.
    #[serde(default)]
    pub name: Option<String>,
    /// New owner, when changed.
    #[serde(default)]
    pub owner_id: Option<UserId>,
}

/// A guild known only by id, pending its `GUILD_CREATE`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnavailableGuild {
    /// Guild id.
    pub id: GuildId,
    /// Set when the guild went down mid-session; absent when the user was
    /// removed from the guild.
    #[serde(default)]
    pub unavailable: bool,
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Message id.
    pub id: MessageId,
    /// Channel the message was sent in.
    pub channel_id: ChannelId,
    /// Guild the channel belongs to, absent for DMs.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// Author; absent on some partial updates.
    #[serde(default)]
    pub author: Option<User>,
    /// Message text.
    #[serde(default)]
    pub content: String,
    /// ISO-8601 creation timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Sent with text-to-speech.
    #[serde(default)]
    pub tts: bool,
    /// Mentioned users.
    #[serde(default)]
    pub mentions: Vec<User>,
}

/// The user half of a presence payload; only the id is guaranteed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceUser {
    /// User id.
    pub id: UserId,
}

/// A presence update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Presence {
    /// Whose presence changed.
    pub user: PresenceUser,
    /// New status string (`online`, `idle`, `dnd`, `offline`).
    #[serde(default)]
    pub status: Option<String>,
    /// Guild scope of the update.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
}

/// A member's voice connection state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoiceState {
    /// Guild scope.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// Connected channel, `None` when disconnecting.
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    /// Whose state this is.
    pub user_id: UserId,
    /// Voice session id, needed by the voice transport.
    #[serde(default)]
    pub session_id: String,
}

/// Payload of `VOICE_SERVER_UPDATE`, forwarded to the voice subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoiceServerInfo {
    /// Voice connection token.
    pub token: String,
    /// Guild scope.
    pub guild_id: GuildId,
    /// Voice server host, absent while the server allocates one.
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Payload of the `READY` dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ready {
    /// Gateway protocol version.
    #[serde(default)]
    pub v: Option<u8>,
    /// The bot's own user.
    pub user: CurrentUser,
    /// Session id for resuming.
    pub session_id: String,
    /// Guilds the bot is in, all initially unavailable.
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
    /// `[shard_id, shard_count]` echoed back.
    #[serde(default)]
    pub shard: Option<[u64; 2]>,
}

/// Payload of `GUILD_MEMBER_ADD`: a member with its guild scope inlined.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberAdd {
    /// Guild the member joined.
    pub guild_id: GuildId,
    /// The new member.
    #[serde(flatten)]
    pub member: Member,
}

/// Payload of `GUILD_MEMBER_REMOVE`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberRemove {
    /// Guild the member left.
    pub guild_id: GuildId,
    /// The departed user.
    pub user: User,
}

/// Payload of `GUILD_MEMBER_UPDATE`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberUpdate {
    /// Guild scope.
    pub guild_id: GuildId,
    /// The member's user.
    pub user: User,
    /// Current roles.
    #[serde(default)]
    pub roles: Vec<RoleId>,
    /// Current nickname.
    #[serde(default)]
    pub nick: Option<String>,
}

/// Payload of `GUILD_ROLE_CREATE` and `GUILD_ROLE_UPDATE`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleCreate {
    /// Guild scope.
    pub guild_id: GuildId,
    /// The role.
    pub role: Role,
}

/// Payload of `GUILD_ROLE_DELETE`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleDelete {
    /// Guild scope.
    pub guild_id: GuildId,
    /// The deleted role.
    pub role_id: RoleId,
}

/// Payload of `MESSAGE_DELETE`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageDelete {
    /// Deleted message id.
    pub id: MessageId,
    /// Channel scope.
    pub channel_id: ChannelId,
    /// Guild scope, absent for DMs.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
}

/// Payload of `TYPING_START`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingStart {
    /// Channel scope.
    pub channel_id: ChannelId,
    /// Who started typing.
    pub user_id: UserId,
    /// Unix seconds.
    #[serde(default)]
    pub timestamp: Option<u64>,
}

/// Response of `GET /gateway`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayInfo {
    /// WebSocket URL to connect to.
    pub url: String,
}

/// Session start quota, from `GET /gateway/bot`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStartLimit {
    /// Total session starts allowed per window.
    pub total: u64,
    /// Session starts remaining.
    pub remaining: u64,
    /// Milliseconds until the quota resets.
    pub reset_after: u64,
}

/// Response of `GET /gateway/bot`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BotGatewayInfo {
    /// WebSocket URL to connect to.
    pub url: String,
    /// Recommended shard count.
    pub shards: u64,
    /// Session start quota.
    #[serde(default)]
    pub session_start_limit: Option<SessionStartLimit>,
}
