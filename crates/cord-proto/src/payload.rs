//! The raw gateway frame and typed client commands.
//!
//! Every gateway frame is `{ "op": <int>, "d": <any>, "s": <int|null>,
//! "t": <string|null> }`. [`GatewayPayload`] keeps `d` as raw JSON; the
//! typed command structs in this module are serialized into it by the
//! constructor helpers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtoError;
use crate::id::{ChannelId, GuildId};
use crate::intents::Intents;
use crate::opcode::OpCode;

/// A raw gateway frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayload {
    /// Opcode.
    pub op: OpCode,
    /// Payload body; shape depends on `op` (and `t` for dispatches).
    #[serde(default)]
    pub d: Value,
    /// Sequence number; only present on dispatches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    /// Event name; only present on dispatches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayPayload {
    /// Parse a frame from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid frame.
    pub fn from_json(text: &str) -> Result<Self, ProtoError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize this frame to JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        Ok(serde_json::to_string(self)?)
    }

    fn command<T: Serialize>(op: OpCode, body: &T) -> Result<Self, ProtoError> {
        Ok(Self {
            op,
            d: serde_json::to_value(body)?,
            s: None,
            t: None,
        })
    }

    /// Build a `HEARTBEAT` frame carrying the last seen sequence.
    #[must_use]
    pub fn heartbeat(sequence: Option<u64>) -> Self {
        Self {
            op: OpCode::Heartbeat,
            d: sequence.map_or(Value::Null, Value::from),
            s: None,
            t: None,
        }
    }

    /// Build an `IDENTIFY` frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn identify(body: &Identify) -> Result<Self, ProtoError> {
        Self::command(OpCode::Identify, body)
    }

    /// Build a `RESUME` frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn resume(body: &Resume) -> Result<Self, ProtoError> {
        Self::command(OpCode::Resume, body)
    }

    /// Build a `STATUS_UPDATE` frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn status_update(body: &StatusUpdate) -> Result<Self, ProtoError> {
        Self::command(OpCode::StatusUpdate, body)
    }

    /// Build a `VOICE_STATE_UPDATE` frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn voice_state_update(body: &VoiceStateUpdate) -> Result<Self, ProtoError> {
        Self::command(OpCode::VoiceStateUpdate, body)
    }

    /// Build a `REQUEST_GUILD_MEMBERS` frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn request_guild_members(body: &RequestGuildMembers) -> Result<Self, ProtoError> {
        Self::command(OpCode::RequestGuildMembers, body)
    }

    /// Interpret the body of a `HELLO` frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a hello payload.
    pub fn hello(&self) -> Result<Hello, ProtoError> {
        Ok(serde_json::from_value(self.d.clone())?)
    }

    /// Interpret the body of an `INVALID_SESSION` frame: whether the
    /// session may be resumed.
    #[must_use]
    pub fn invalid_session_resumable(&self) -> bool {
        self.d.as_bool().unwrap_or(false)
    }
}

/// Body of the `HELLO` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    /// Cadence, in milliseconds, at which the client must heartbeat.
    pub heartbeat_interval: u64,
}

/// Connection properties reported with `IDENTIFY`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyProperties {
    /// Operating system name.
    #[serde(rename = "$os")]
    pub os: String,
    /// Library name.
    #[serde(rename = "$browser")]
    pub browser: String,
    /// Library name.
    #[serde(rename = "$device")]
    pub device: String,
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "cord".to_string(),
            device: "cord".to_string(),
        }
    }
}

/// Body of the `IDENTIFY` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identify {
    /// Bot token.
    pub token: String,
    /// Connection properties.
    pub properties: IdentifyProperties,
    /// Event categories the bot wants.
    pub intents: Intents,
    /// `[shard_id, shard_count]`.
    pub shard: [u64; 2],
    /// Member count above which a guild is sent as "large" (offline
    /// members elided).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_threshold: Option<u32>,
    /// Transport compression; this client does not negotiate it.
    pub compress: bool,
}

/// Body of the `RESUME` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resume {
    /// Bot token.
    pub token: String,
    /// The session being resumed.
    pub session_id: String,
    /// Last sequence received before the drop.
    pub seq: u64,
}

/// Online status carried in a presence update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OnlineStatus {
    /// Shown as online.
    #[default]
    Online,
    /// Shown as idle.
    Idle,
    /// Shown as do-not-disturb.
    Dnd,
    /// Connected but shown as offline.
    Invisible,
    /// Shown as offline.
    Offline,
}

/// An activity line shown under the bot's name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    /// Display text.
    pub name: String,
    /// Numeric activity type (0 = playing).
    #[serde(rename = "type", default)]
    pub kind: u8,
}

/// Body of the `STATUS_UPDATE` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Unix ms when the client went idle, if it did.
    pub since: Option<u64>,
    /// Current activity.
    pub game: Option<Activity>,
    /// Online status.
    pub status: OnlineStatus,
    /// Whether the client is AFK.
    pub afk: bool,
}

/// Body of the `VOICE_STATE_UPDATE` frame.
///
/// A `channel_id` of `None` disconnects from voice in that guild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceStateUpdate {
    /// Guild whose voice state changes.
    pub guild_id: GuildId,
    /// Channel to join, or `None` to leave.
    pub channel_id: Option<ChannelId>,
    /// Join muted.
    pub self_mute: bool,
    /// Join deafened.
    pub self_deaf: bool,
}

/// Body of the `REQUEST_GUILD_MEMBERS` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestGuildMembers {
    /// Guild to request members for.
    pub guild_id: GuildId,
    /// Username prefix filter; empty matches everyone.
    pub query: String,
    /// Maximum members to return; 0 means no limit.
    pub limit: u64,
}
