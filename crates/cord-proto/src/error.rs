//! Error types for protocol encoding and decoding.

use thiserror::Error;

/// Errors that can occur while encoding or decoding protocol payloads.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field was absent from a payload.
    #[error("missing field `{0}` in payload")]
    MissingField(&'static str),

    /// A payload did not have the shape the opcode requires.
    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),

    /// An identifier could not be parsed as a snowflake.
    #[error("invalid snowflake: {0}")]
    InvalidId(String),
}
