//! Gateway opcodes.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opcode of a gateway frame.
///
/// Unrecognized values are preserved as [`OpCode::Unknown`] so new server
/// opcodes never fail to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// An event dispatch (server to client). The only frames that carry a
    /// sequence number.
    Dispatch,
    /// Keepalive, carrying the last seen sequence (either direction).
    Heartbeat,
    /// Start a new session (client to server).
    Identify,
    /// Update the bot's presence (client to server).
    StatusUpdate,
    /// Join, move, or leave a voice channel (client to server).
    VoiceStateUpdate,
    /// Resume a dropped session (client to server).
    Resume,
    /// Server asks the client to reconnect and resume.
    Reconnect,
    /// Request guild member chunks (client to server).
    RequestGuildMembers,
    /// Session is invalid; `d` says whether it can be resumed.
    InvalidSession,
    /// First frame after connecting; carries the heartbeat interval.
    Hello,
    /// Server acknowledgement of a heartbeat.
    HeartbeatAck,
    /// An opcode this client does not know about.
    Unknown(u8),
}

impl OpCode {
    /// Numeric value of this opcode.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Dispatch => 0,
            Self::Heartbeat => 1,
            Self::Identify => 2,
            Self::StatusUpdate => 3,
            Self::VoiceStateUpdate => 4,
            Self::Resume => 6,
            Self::Reconnect => 7,
            Self::RequestGuildMembers => 8,
            Self::InvalidSession => 9,
            Self::Hello => 10,
            Self::HeartbeatAck => 11,
            Self::Unknown(value) => value,
        }
    }

    /// Parse a numeric opcode.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            3 => Self::StatusUpdate,
            4 => Self::VoiceStateUpdate,
            6 => Self::Resume,
            7 => Self::Reconnect,
            8 => Self::RequestGuildMembers,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

impl Serialize for OpCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

struct OpCodeVisitor;

impl Visitor<'_> for OpCodeVisitor {
    type Value = OpCode;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer opcode")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        u8::try_from(v)
            .map(OpCode::from_u8)
            .map_err(|_| E::custom(format!("opcode out of range: {v}")))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u8::try_from(v)
            .map(OpCode::from_u8)
            .map_err(|_| E::custom(format!("opcode out of range: {v}")))
    }
}

impl<'de> Deserialize<'de> for OpCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_u64(OpCodeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_opcodes_roundtrip() {
        for value in [0u8, 1, 2, 3, 4, 6, 7, 8, 9, 10, 11] {
            let op = OpCode::from_u8(value);
            assert!(!matches!(op, OpCode::Unknown(_)), "op {value} should be known");
            assert_eq!(op.as_u8(), value);
        }
    }

    #[test]
    fn test_unknown_opcode_preserved() {
        let op = OpCode::from_u8(42);
        assert_eq!(op, OpCode::Unknown(42));
        assert_eq!(op.as_u8(), 42);
    }

    #[test]
    fn test_opcode_serde() {
        let json = serde_json::to_string(&OpCode::Hello).unwrap();
        assert_eq!(json, "10");

        let op: OpCode = serde_json::from_str("11").unwrap();
        assert_eq!(op, OpCode::HeartbeatAck);

        let unknown: OpCode = serde_json::from_str("99").unwrap();
        assert_eq!(unknown, OpCode::Unknown(99));
    }
}
