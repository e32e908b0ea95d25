//! Error types for database access
//!
//! Every backend maps its native errors onto [`DatabaseError`] so the
//! migration engine can tell an unreachable server from a failing statement
//! and a uniqueness conflict.

use thiserror::Error;

/// Result type alias for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Error types for database operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DatabaseError {
    /// The server cannot be reached, authenticated against, or the pool is unusable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Begin, commit or rollback failed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A statement was rejected
    #[error("Query error: {0}")]
    Query(String),

    /// A unique constraint rejected an insert
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Connection settings could not be turned into client options
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl DatabaseError {
    pub fn is_connection(&self) -> bool {
        matches!(self, DatabaseError::Connection(_))
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DatabaseError::UniqueViolation(_))
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => DatabaseError::Connection(err.to_string()),
            sqlx::Error::Configuration(_) => DatabaseError::Configuration(err.to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DatabaseError::UniqueViolation(err.to_string())
            }
            _ => DatabaseError::Query(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlx_error_classification() {
        assert!(DatabaseError::from(sqlx::Error::PoolTimedOut).is_connection());
        assert!(DatabaseError::from(sqlx::Error::PoolClosed).is_connection());

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(DatabaseError::from(sqlx::Error::Io(io)).is_connection());

        assert!(matches!(
            DatabaseError::from(sqlx::Error::RowNotFound),
            DatabaseError::Query(_)
        ));
    }

    #[test]
    fn test_error_display() {
        let err = DatabaseError::UniqueViolation("version 0001_init".to_string());
        assert_eq!(err.to_string(), "Unique constraint violation: version 0001_init");
        assert!(err.is_unique_violation());
        assert!(!err.is_connection());
    }
}
