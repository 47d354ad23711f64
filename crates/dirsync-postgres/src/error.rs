//! Error types for the PostgreSQL store.

use dirsync_core::StoreError;
use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for serialization failures (40001).
pub const PG_SERIALIZATION_FAILURE: &str = "40001";

/// PostgreSQL error code for detected deadlocks (40P01).
pub const PG_DEADLOCK_DETECTED: &str = "40P01";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Errors specific to the PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Error reported by the driver or the database.
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A stored row could not be turned into a domain value.
    #[error("Invalid row: {message}")]
    Decode { message: String },

    /// A write did not touch the rows the plan expected.
    #[error("Integrity error: {message}")]
    Integrity { message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a new decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a new integrity error.
    #[must_use]
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for StoreError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Database(e) => match &e {
                SqlxError::Database(db_err)
                    if db_err.is_unique_violation()
                        || db_err.is_foreign_key_violation()
                        || db_err.is_check_violation() =>
                {
                    StoreError::constraint(db_err.message())
                }
                SqlxError::Database(_)
                    if has_pg_error_code(&e, PG_SERIALIZATION_FAILURE)
                        || has_pg_error_code(&e, PG_DEADLOCK_DETECTED) =>
                {
                    StoreError::transaction(e.to_string())
                }
                SqlxError::Io(_)
                | SqlxError::Tls(_)
                | SqlxError::PoolTimedOut
                | SqlxError::PoolClosed
                | SqlxError::WorkerCrashed => StoreError::connection(e.to_string()),
                _ => StoreError::internal(e.to_string()),
            },
            PostgresError::Migration(e) => StoreError::internal(format!("Migration error: {e}")),
            PostgresError::Config { message } => {
                StoreError::internal(format!("Configuration error: {message}"))
            }
            PostgresError::Decode { message } => {
                StoreError::internal(format!("Invalid row: {message}"))
            }
            PostgresError::Integrity { message } => StoreError::constraint(message),
        }
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PostgresError::config("invalid URL");
        assert!(err.to_string().contains("Configuration error"));

        let err = PostgresError::integrity("membership references unknown group G:1");
        assert!(err.to_string().contains("Integrity error"));
    }

    #[test]
    fn test_conversion_to_store_error() {
        let store_err: StoreError = PostgresError::config("test error").into();
        assert!(matches!(store_err, StoreError::Internal { .. }));

        let store_err: StoreError = PostgresError::integrity("missing row").into();
        assert!(store_err.is_constraint());

        let store_err: StoreError = PostgresError::Database(SqlxError::PoolTimedOut).into();
        assert!(matches!(store_err, StoreError::Connection { .. }));

        let store_err: StoreError = PostgresError::Database(SqlxError::RowNotFound).into();
        assert!(matches!(store_err, StoreError::Internal { .. }));
    }
}
