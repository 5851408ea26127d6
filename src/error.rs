use thiserror::Error;

/// Failures raised by the collaborators behind a collection: the remote
/// store and blob storage.
#[derive(Debug, Error)]
pub enum StoreError {
    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Row (de)serialization
    #[error("Malformed row: {0}")]
    Decode(#[from] serde_json::Error),

    // Constraint violations reported by the store
    #[error("duplicate key value violates unique constraint on {relation} ({columns})")]
    UniqueViolation { relation: String, columns: String },

    // Blob storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Failures surfaced verbatim from the store
    #[error("{0}")]
    Rejected(String),

    // Internal errors
    #[error("Internal store error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The error recorded on a collection when one of its operations fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    // Auth errors
    #[error("Not authenticated. Please log in to {0}.")]
    NotAuthenticated(String),

    // Validation errors
    #[error("A record with the same {field} already exists.")]
    Duplicate { field: String },
    #[error("Another record with the same {field} already exists.")]
    DuplicateOnUpdate { field: String },
    #[error("Validation error: {0}")]
    Validation(String),

    // Remote failures
    #[error("{0}")]
    Remote(String),

    // Lookups
    #[error("{0}")]
    NotFound(String),
}

impl AppError {
    pub fn not_found(relation: &str, key: &str) -> Self {
        AppError::NotFound(format!("No {} found with id {}", relation, key))
    }

    /// Name of the field that collided, for uniqueness failures.
    pub fn duplicate_field(&self) -> Option<&str> {
        match self {
            AppError::Duplicate { field } | AppError::DuplicateOnUpdate { field } => Some(field),
            _ => None,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Remote(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_message_names_the_field() {
        let err = AppError::Duplicate {
            field: "name".to_string(),
        };
        assert_eq!(err.to_string(), "A record with the same name already exists.");
        assert_eq!(err.duplicate_field(), Some("name"));
    }

    #[test]
    fn store_errors_become_remote_with_store_message() {
        let err: AppError = StoreError::Rejected("permission denied for table promo".into()).into();
        assert_eq!(
            err,
            AppError::Remote("permission denied for table promo".to_string())
        );
    }

    #[test]
    fn not_authenticated_names_the_action() {
        let err = AppError::NotAuthenticated("add a player".to_string());
        assert_eq!(
            err.to_string(),
            "Not authenticated. Please log in to add a player."
        );
    }
}
