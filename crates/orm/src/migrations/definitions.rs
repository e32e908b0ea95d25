//! Migration Definitions - Core types and structures for migrations

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A migration script discovered on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// File name without the extension; both the identity and the sort key
    pub version: String,
    /// Statement text, applied verbatim
    pub body: String,
    /// Where the script was read from
    pub path: PathBuf,
}

/// A row of the tracking table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigrationRecord {
    pub version: String,
    pub applied_at: DateTime<Utc>,
}

/// Result of running migrations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationRunResult {
    /// Versions applied by this run, in application order
    pub applied: Vec<String>,
    /// Number of discovered migrations that were already applied
    pub skipped: usize,
    /// Wall time of the whole run
    pub elapsed: Duration,
}

impl MigrationRunResult {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

/// Where a [`crate::MigrationRunner`] is in its run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Initializing,
    Discovering,
    Diffing,
    /// Applying the pending migration at `index` (0-based within the pending set)
    Applying { index: usize, version: String },
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Initializing => write!(f, "initializing"),
            RunState::Discovering => write!(f, "discovering"),
            RunState::Diffing => write!(f, "diffing"),
            RunState::Applying { index, version } => write!(f, "applying #{} ({})", index, version),
            RunState::Done => write!(f, "done"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// Migration status in the system
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStatus {
    /// Migration is pending (not yet applied)
    Pending,
    /// Migration has been applied
    Applied {
        /// When it was applied
        applied_at: DateTime<Utc>,
    },
}

/// One discovered migration and its status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatusEntry {
    pub version: String,
    pub status: MigrationStatus,
}

/// Status of every discovered migration plus records without a script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationStatusReport {
    pub entries: Vec<MigrationStatusEntry>,
    /// Recorded versions whose script is no longer in the directory
    pub orphaned: Vec<AppliedMigrationRecord>,
}

impl MigrationStatusReport {
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|entry| entry.status == MigrationStatus::Pending)
            .map(|entry| entry.version.as_str())
    }

    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }
}
