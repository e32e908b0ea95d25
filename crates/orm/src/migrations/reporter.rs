//! Progress reporting for migration runs

use std::io::{self, Write};

use tracing::{info, warn};

use super::definitions::MigrationRunResult;

/// Receives user-facing confirmations from a [`crate::MigrationRunner`]
pub trait MigrationReporter: Send + Sync {
    /// `version` was committed together with its tracking record
    fn applied(&self, version: &str);

    /// The run finished without error
    fn completed(&self, result: &MigrationRunResult);
}

/// Prints confirmations to stdout for operators running the CLI
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl MigrationReporter for ConsoleReporter {
    fn applied(&self, version: &str) {
        if let Err(e) = write_applied(&mut io::stdout().lock(), version) {
            warn!("Failed to write to stdout: {}", e);
        }
    }

    fn completed(&self, result: &MigrationRunResult) {
        if let Err(e) = write_completed(&mut io::stdout().lock(), result) {
            warn!("Failed to write to stdout: {}", e);
        }
    }
}

fn write_applied<W: Write>(out: &mut W, version: &str) -> io::Result<()> {
    writeln!(out, "Applied migration: {}", version)
}

fn write_completed<W: Write>(out: &mut W, result: &MigrationRunResult) -> io::Result<()> {
    if result.applied.is_empty() {
        writeln!(out, "No pending migrations ({} already applied)", result.skipped)?;
    }
    writeln!(out, "All migrations completed successfully!")
}

/// Emits confirmations as `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl MigrationReporter for TracingReporter {
    fn applied(&self, version: &str) {
        info!(version, "Applied migration");
    }

    fn completed(&self, result: &MigrationRunResult) {
        info!(
            applied = result.applied_count(),
            skipped = result.skipped,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "All migrations completed successfully"
        );
    }
}
