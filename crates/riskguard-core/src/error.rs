//! Broker error types.

use thiserror::Error;

/// Errors surfaced by broker gateway operations.
///
/// Read-side failures abort the calling operation. Order placement raises
/// these only for transport or connection loss; business rejections come back
/// inside [`crate::types::OrderResult`] with `success = false`.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("not connected: {0}")]
    NotConnected(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("session rejected: {0}")]
    Auth(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

/// Result type alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;
