//! Error type for client operations.

use cord_gateway::GatewayError;
use cord_rest::RestError;
use thiserror::Error;

/// Errors surfaced by the client facade.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A REST operation failed.
    #[error(transparent)]
    Rest(#[from] RestError),

    /// A gateway operation failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A synchronous cache getter found nothing.
    #[error("not in cache: {0}")]
    CacheMiss(String),
}
