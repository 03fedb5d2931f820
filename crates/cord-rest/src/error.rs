//! Error types for REST operations.

use cord_proto::MessageId;
use thiserror::Error;

/// Result type for REST operations.
pub type RestResult<T> = Result<T, RestError>;

/// Errors that can occur while performing REST requests.
#[derive(Debug, Error)]
pub enum RestError {
    /// TCP/TLS/HTTP-layer failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    ///
    /// 4xx statuses surface here immediately; 5xx statuses arrive only
    /// after the governor's retry budget is spent.
    #[error("http status {code}: {body}")]
    HttpStatus {
        /// HTTP status code.
        code: u16,
        /// Response body text.
        body: String,
    },

    /// The request was rate limited more times than the governor retries.
    #[error("rate limit retries exhausted for {route}")]
    RateLimitExhausted {
        /// Bucket key of the throttled route.
        route: String,
    },

    /// The per-attempt deadline elapsed.
    #[error("request timed out")]
    Timeout,

    /// Response body decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A message in a bulk delete is older than the platform allows.
    #[error("message {id} is {age_days} days old; bulk delete accepts at most 14 days")]
    MessageTooOld {
        /// The offending message id.
        id: MessageId,
        /// Age derived from the snowflake timestamp.
        age_days: i64,
    },

    /// The caller passed arguments the platform would reject.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl RestError {
    pub(crate) fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}
