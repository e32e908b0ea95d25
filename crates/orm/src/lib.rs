//! # loyalty-orm: Database Layer for the coffee loyalty backend
//!
//! Connection management over a PostgreSQL pool, the schema migration
//! engine (source, tracking repository, runner) and the user store.
//!
//! Everything that touches the database goes through [`ConnectionManager`],
//! so the migration engine can run against the in-memory double in
//! [`testing`] as well as against PostgreSQL.

pub mod error;
pub mod database;
pub mod transaction;
pub mod migrations;
pub mod users;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export core traits and types
pub use error::*;
pub use database::*;
pub use transaction::*;
pub use migrations::*;
pub use users::*;
