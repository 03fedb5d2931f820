//! Gateway close codes and the reconnect decision table.

use std::fmt;

/// What a shard should do after its socket closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Reconnect and resume with the kept session id and sequence.
    Resume,
    /// Reconnect with a fresh `IDENTIFY`, dropping the session.
    Reidentify,
    /// Do not reconnect; the shard is dead and the error surfaces to the
    /// caller.
    Fatal,
}

/// A close code received on the gateway socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// Unknown server error.
    UnknownError,
    /// Client sent an invalid opcode.
    UnknownOpcode,
    /// Client sent a payload the server could not decode.
    DecodeError,
    /// Client sent a payload before identifying.
    NotAuthenticated,
    /// The token in `IDENTIFY` was invalid.
    AuthenticationFailed,
    /// Client sent more than one `IDENTIFY`.
    AlreadyAuthenticated,
    /// The sequence sent with `RESUME` was invalid.
    InvalidSequence,
    /// Client sent payloads too quickly.
    RateLimited,
    /// The session timed out server-side.
    SessionTimedOut,
    /// The shard tuple in `IDENTIFY` was invalid.
    InvalidShard,
    /// The bot is in too many guilds for a single session; increase the
    /// shard count.
    ShardingRequired,
    /// The requested gateway version is invalid.
    InvalidApiVersion,
    /// The intents bitmask was malformed.
    InvalidIntents,
    /// A privileged intent was requested without enrollment.
    DisallowedIntents,
    /// A close code this client does not know about.
    Unknown(u16),
}

impl CloseCode {
    /// Parse a numeric close code.
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            4000 => Self::UnknownError,
            4001 => Self::UnknownOpcode,
            4002 => Self::DecodeError,
            4003 => Self::NotAuthenticated,
            4004 => Self::AuthenticationFailed,
            4005 => Self::AlreadyAuthenticated,
            4007 => Self::InvalidSequence,
            4008 => Self::RateLimited,
            4009 => Self::SessionTimedOut,
            4010 => Self::InvalidShard,
            4011 => Self::ShardingRequired,
            4012 => Self::InvalidApiVersion,
            4013 => Self::InvalidIntents,
            4014 => Self::DisallowedIntents,
            other => Self::Unknown(other),
        }
    }

    /// Numeric value of this close code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::UnknownError => 4000,
            Self::UnknownOpcode => 4001,
            Self::DecodeError => 4002,
            Self::NotAuthenticated => 4003,
            Self::AuthenticationFailed => 4004,
            Self::AlreadyAuthenticated => 4005,
            Self::InvalidSequence => 4007,
            Self::RateLimited => 4008,
            Self::SessionTimedOut => 4009,
            Self::InvalidShard => 4010,
            Self::ShardingRequired => 4011,
            Self::InvalidApiVersion => 4012,
            Self::InvalidIntents => 4013,
            Self::DisallowedIntents => 4014,
            Self::Unknown(code) => code,
        }
    }

    /// The reconnect decision for this close code.
    #[must_use]
    pub const fn policy(self) -> ReconnectPolicy {
        match self {
            Self::AuthenticationFailed
            | Self::InvalidShard
            | Self::ShardingRequired
            | Self::InvalidApiVersion
            | Self::InvalidIntents
            | Self::DisallowedIntents => ReconnectPolicy::Fatal,

            Self::InvalidSequence | Self::SessionTimedOut => ReconnectPolicy::Reidentify,

            // 4000-4003, 4005, 4008 and anything unrecognized: resume.
            Self::UnknownError
            | Self::UnknownOpcode
            | Self::DecodeError
            | Self::NotAuthenticated
            | Self::AlreadyAuthenticated
            | Self::RateLimited
            | Self::Unknown(_) => ReconnectPolicy::Resume,
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}
