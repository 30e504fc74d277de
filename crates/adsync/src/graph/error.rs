//! Graph API error types.

use thiserror::Error;

use super::types::ErrorEnvelope;
use crate::http::{HttpError, HttpRequest, HttpResponse};

/// Graph error code for an expired or invalid access token.
pub const INVALID_TOKEN_CODE: i64 = 190;

/// Errors that can occur when talking to the Graph API.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Transport-level failure (connection, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(HttpError),

    /// The API throttled the request. Keeps the exchange that tripped the
    /// detection.
    #[error("Rate limited by Graph API (HTTP {status})")]
    RateLimited {
        status: u16,
        code: Option<i64>,
        retry_after_secs: Option<u64>,
        request: Box<HttpRequest>,
        response: Box<HttpResponse>,
    },

    /// The API returned an error response.
    #[error("Graph API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    /// Authentication failed or the token is no longer valid.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl GraphError {
    /// Build an error from a non-success response.
    pub fn from_response(response: &HttpResponse) -> Self {
        let envelope = serde_json::from_slice::<ErrorEnvelope>(&response.body).ok();
        let code = envelope.as_ref().and_then(|e| e.error.code);
        let message = envelope
            .and_then(|e| e.error.message)
            .unwrap_or_else(|| format!("HTTP {}", response.status));

        if response.status == 401 || code == Some(INVALID_TOKEN_CODE) {
            return Self::Auth(message);
        }

        Self::Api {
            status: response.status,
            code,
            message,
        }
    }

    /// Whether the error is a throttling signal that should be retried later.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Whether the error means the connection's credentials are unusable.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

impl From<HttpError> for GraphError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::RateLimited { request, response } => Self::RateLimited {
                status: response.status,
                code: super::sentinel::error_code(&response),
                retry_after_secs: super::sentinel::retry_after(&response).map(|d| d.as_secs()),
                request,
                response,
            },
            other => Self::Http(other),
        }
    }
}

/// First line of an error's message, for compact log and report output.
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for Graph API operations.
pub type Result<T> = std::result::Result<T, GraphError>;
