//! Migration System
//!
//! Discovers `.sql` scripts in a directory, compares them with the versions
//! recorded in the tracking table, and applies the difference in ascending
//! version order, one transaction per script.

mod definitions;
mod error;
mod reporter;
mod repository;
mod runner;
mod source;

pub use definitions::*;
pub use error::MigrationError;
pub use reporter::{ConsoleReporter, MigrationReporter, TracingReporter};
pub use repository::{MigrationRepository, PgMigrationRepository};
pub use runner::{pending_migrations, MigrationRunner};
pub use source::{version_from_file_name, MigrationSource, MIGRATION_EXTENSION};
