use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sea-orm.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Record not found.
    #[error("{entity} not found: {context}")]
    NotFound {
        entity: &'static str,
        context: String,
    },

    /// Invalid input data.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl RepositoryError {
    /// Create a NotFound error for a UUID lookup.
    pub fn not_found_by_id(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound {
            entity,
            context: format!("id={id}"),
        }
    }

    /// Create a NotFound error for an upstream identifier lookup.
    pub fn not_found_by_external_id(entity: &'static str, external_id: &str) -> Self {
        Self::NotFound {
            entity,
            context: format!("external_id={external_id}"),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
