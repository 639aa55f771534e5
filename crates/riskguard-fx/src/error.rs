//! FX cache error types.
//!
//! These never reach conversion callers: refresh failures are logged and the
//! cache degrades to stale or 1:1 rates. Construction is the only fallible
//! surface.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FxError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("malformed rate response: {0}")]
    MalformedResponse(String),
}

pub type FxResult<T> = Result<T, FxError>;
