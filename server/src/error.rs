//! Errors surfaced by relay operations.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Problem while serving a relay request.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The token does not name a live session.
    #[error("unknown session")]
    UnknownSession,

    /// The request payload was malformed or out of bounds. Nothing was changed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The OS random source failed while minting a token.
    #[error("secure random source failed: {0}")]
    Entropy(#[from] rand::Error),

    /// A response body could not be encoded.
    #[error("response encoding failed: {0}")]
    Encode(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownSession | Self::InvalidInput(_) => StatusCode::NOT_ACCEPTABLE,
            Self::Entropy(_) | Self::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Entropy(e) => tracing::error!("Token generation failed: {}", e),
            Self::Encode(e) => tracing::error!("Response encoding failed: {}", e),
            other => tracing::debug!("Rejected request: {}", other),
        }
        (status, self.to_string()).into_response()
    }
}
