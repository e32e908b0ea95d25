use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::error::DatabaseError;

/// Error types for migration operations
///
/// Every variant aborts the run. Variants raised while applying a script
/// carry its version.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Database unavailable ({context}): {source}")]
    Connectivity {
        context: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Failed to create migrations table: {0}")]
    SchemaInit(#[source] DatabaseError),

    #[error("Failed to read migrations directory {}: {source}", .path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read migration file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to query applied migrations: {0}")]
    ListApplied(#[source] DatabaseError),

    #[error("Failed to execute migration {version}: {source}")]
    Execution {
        version: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Failed to record migration {version}: {source}")]
    Record {
        version: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Failed to commit migration {version}: {source}; re-run to check whether it was applied")]
    Commit {
        version: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Invalid migration name '{0}': it must contain at least one letter or digit")]
    InvalidName(String),

    #[error("Failed to create migration file {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MigrationError {
    /// Version of the migration that failed, when the failure is tied to one
    pub fn version(&self) -> Option<&str> {
        match self {
            MigrationError::Execution { version, .. }
            | MigrationError::Record { version, .. }
            | MigrationError::Commit { version, .. } => Some(version),
            _ => None,
        }
    }

    /// True when the tracking insert found the version already recorded.
    ///
    /// Only races decided at the insert show up here. When two runners apply
    /// the same DDL, the loser usually fails earlier in the catalog and
    /// surfaces as [`MigrationError::Execution`].
    pub fn is_conflict(&self) -> bool {
        matches!(self, MigrationError::Record { source, .. } if source.is_unique_violation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_failing_version() {
        let err = MigrationError::Execution {
            version: "0002_add_col".to_string(),
            source: DatabaseError::Query("syntax error at or near \"TABEL\"".to_string()),
        };
        assert_eq!(err.version(), Some("0002_add_col"));
        assert!(err.to_string().contains("0002_add_col"));
        assert!(err.to_string().contains("syntax error"));
    }

    #[test]
    fn test_conflict_detection() {
        let conflict = MigrationError::Record {
            version: "0001_init".to_string(),
            source: DatabaseError::UniqueViolation("duplicate key".to_string()),
        };
        assert!(conflict.is_conflict());

        let other = MigrationError::Record {
            version: "0001_init".to_string(),
            source: DatabaseError::Query("permission denied".to_string()),
        };
        assert!(!other.is_conflict());
    }

    #[test]
    fn test_discovery_message_includes_path() {
        let err = MigrationError::Discovery {
            path: PathBuf::from("/srv/migrations"),
            source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        };
        assert_eq!(err.version(), None);
        assert!(err.to_string().contains("/srv/migrations"));
    }
}
