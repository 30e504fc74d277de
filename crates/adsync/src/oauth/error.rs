//! Credential renewal error types.

use thiserror::Error;

use crate::graph::GraphError;
use crate::repository::RepositoryError;

/// Errors that can occur while renewing connection credentials.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// The token exchange request failed.
    #[error("Token exchange failed: {0}")]
    Exchange(#[from] GraphError),

    /// Failed to parse the exchange response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// App credentials are missing or invalid.
    #[error("OAuth configuration error: {0}")]
    Configuration(String),

    /// The connection holds no token to exchange.
    #[error("Connection has no access token")]
    MissingToken,

    /// The renewed credentials could not be stored.
    #[error("Failed to store renewed token: {0}")]
    Repository(#[from] RepositoryError),
}

impl OAuthError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether the upstream throttled the exchange.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Exchange(e) if e.is_rate_limited())
    }
}

/// Result type for renewal operations.
pub type Result<T> = std::result::Result<T, OAuthError>;
