//! Error types for gateway operations.

use cord_proto::ProtoError;
use thiserror::Error;

/// Errors that can occur on a gateway connection.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// TCP/TLS/WebSocket-layer failure.
    #[error("gateway transport error: {0}")]
    Transport(String),

    /// The socket closed with a close code.
    #[error("gateway closed with code {code}")]
    Close {
        /// The close code, verbatim from the close frame.
        code: u16,
    },

    /// A payload could not be interpreted.
    #[error("gateway protocol error: {0}")]
    Protocol(String),

    /// The token or intents were rejected. Fatal process-wide.
    #[error("authentication failed: the token or intents were rejected")]
    Authentication,

    /// The bot needs more shards than were configured.
    #[error("sharding required: increase the shard count")]
    ShardingRequired,

    /// A handshake step did not complete in time.
    #[error("gateway timed out")]
    Timeout,
}

impl From<ProtoError> for GatewayError {
    fn from(err: ProtoError) -> Self {
        Self::Protocol(err.to_string())
    }
}
