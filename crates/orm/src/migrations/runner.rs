//! Migration Runner - Executes migrations against the database
//!
//! Computes the pending set (discovered minus applied) and applies each
//! pending migration, in ascending version order, inside one transaction
//! that both executes its script and records its version. The first failure
//! stops the run; migrations committed before it stay committed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::definitions::{
    Migration, MigrationRunResult, MigrationStatus, MigrationStatusEntry, MigrationStatusReport,
    RunState,
};
use super::error::MigrationError;
use super::reporter::MigrationReporter;
use super::repository::MigrationRepository;
use super::source::MigrationSource;
use crate::database::ConnectionManager;
use crate::error::DatabaseError;
use crate::transaction::TransactionScope;

/// Migration runner that executes migrations against a database
pub struct MigrationRunner<C, R> {
    connections: C,
    repository: R,
    source: MigrationSource,
    reporter: Arc<dyn MigrationReporter>,
    state: RunState,
}

impl<C, R> MigrationRunner<C, R>
where
    C: ConnectionManager,
    R: MigrationRepository<Transaction = C::Transaction>,
{
    pub fn new(
        connections: C,
        repository: R,
        source: MigrationSource,
        reporter: Arc<dyn MigrationReporter>,
    ) -> Self {
        Self {
            connections,
            repository,
            source,
            reporter,
            state: RunState::Idle,
        }
    }

    /// Where the last (or current) run stopped
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Apply every pending migration.
    ///
    /// Leaves the runner in [`RunState::Done`] on success and
    /// [`RunState::Failed`] on the first error.
    pub async fn run(&mut self) -> Result<MigrationRunResult, MigrationError> {
        match self.run_inner().await {
            Ok(result) => {
                self.state = RunState::Done;
                self.reporter.completed(&result);
                Ok(result)
            }
            Err(e) => {
                error!("Migration run failed in state {}: {}", self.state, e);
                self.state = RunState::Failed;
                Err(e)
            }
        }
    }

    async fn run_inner(&mut self) -> Result<MigrationRunResult, MigrationError> {
        let start_time = Instant::now();

        self.state = RunState::Initializing;
        self.connections
            .ping()
            .await
            .map_err(|source| MigrationError::Connectivity {
                context: "readiness check".to_string(),
                source,
            })?;
        self.repository
            .ensure_schema()
            .await
            .map_err(|source| match source {
                DatabaseError::Connection(_) => MigrationError::Connectivity {
                    context: "creating the tracking table".to_string(),
                    source,
                },
                other => MigrationError::SchemaInit(other),
            })?;

        self.state = RunState::Discovering;
        let discovered = self.source.discover()?;

        self.state = RunState::Diffing;
        let applied = self
            .repository
            .list_applied()
            .await
            .map_err(MigrationError::ListApplied)?;
        let discovered_count = discovered.len();
        let pending = pending_migrations(discovered, &applied);
        let skipped = discovered_count - pending.len();

        if pending.is_empty() {
            info!("Database schema is up to date ({} applied)", skipped);
        } else {
            info!("Applying {} pending migration(s)", pending.len());
        }

        let mut applied_versions = Vec::with_capacity(pending.len());
        for (index, migration) in pending.iter().enumerate() {
            self.state = RunState::Applying {
                index,
                version: migration.version.clone(),
            };
            self.apply(migration).await?;

            self.reporter.applied(&migration.version);
            applied_versions.push(migration.version.clone());
        }

        Ok(MigrationRunResult {
            applied: applied_versions,
            skipped,
            elapsed: start_time.elapsed(),
        })
    }

    /// Execute and record one migration in a single transaction
    async fn apply(&self, migration: &Migration) -> Result<(), MigrationError> {
        let version = &migration.version;
        debug!("Applying migration {} from {}", version, migration.path.display());

        let mut tx = self
            .connections
            .begin()
            .await
            .map_err(|source| MigrationError::Connectivity {
                context: format!("opening a transaction for migration {}", version),
                source,
            })?;

        if let Err(source) = tx.execute(&migration.body).await {
            rollback(tx, version).await;
            return Err(MigrationError::Execution {
                version: version.clone(),
                source,
            });
        }

        if let Err(source) = self.repository.record_applied(version, &mut tx).await {
            rollback(tx, version).await;
            return Err(MigrationError::Record {
                version: version.clone(),
                source,
            });
        }

        tx.commit().await.map_err(|source| MigrationError::Commit {
            version: version.clone(),
            source,
        })
    }

    /// Every discovered migration with its status, plus orphaned records.
    ///
    /// Reads only; a missing tracking table means nothing is applied yet.
    pub async fn status(&self) -> Result<MigrationStatusReport, MigrationError> {
        let discovered = self.source.discover()?;

        let schema_exists = self
            .repository
            .schema_exists()
            .await
            .map_err(|source| MigrationError::Connectivity {
                context: "checking the tracking table".to_string(),
                source,
            })?;
        let records = if schema_exists {
            self.repository
                .list_records()
                .await
                .map_err(MigrationError::ListApplied)?
        } else {
            Vec::new()
        };

        let mut applied_at: BTreeMap<&str, DateTime<Utc>> = records
            .iter()
            .map(|record| (record.version.as_str(), record.applied_at))
            .collect();

        let entries = discovered
            .iter()
            .map(|migration| MigrationStatusEntry {
                version: migration.version.clone(),
                status: match applied_at.remove(migration.version.as_str()) {
                    Some(applied_at) => MigrationStatus::Applied { applied_at },
                    None => MigrationStatus::Pending,
                },
            })
            .collect();

        let orphaned = records
            .iter()
            .filter(|record| applied_at.contains_key(record.version.as_str()))
            .cloned()
            .collect();

        Ok(MigrationStatusReport { entries, orphaned })
    }
}

/// Discovered migrations whose version is not in `applied`, keeping their order
pub fn pending_migrations(discovered: Vec<Migration>, applied: &BTreeSet<String>) -> Vec<Migration> {
    discovered
        .into_iter()
        .filter(|migration| !applied.contains(&migration.version))
        .collect()
}

async fn rollback<T: TransactionScope>(tx: T, version: &str) {
    if let Err(e) = tx.rollback().await {
        warn!("Rollback of migration {} failed: {}", version, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryDatabase, MemoryRepository, RecordingReporter};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    fn runner(
        db: &MemoryDatabase,
        dir: &Path,
        reporter: &Arc<RecordingReporter>,
    ) -> MigrationRunner<MemoryDatabase, MemoryRepository> {
        MigrationRunner::new(
            db.clone(),
            db.repository(),
            MigrationSource::new(dir),
            reporter.clone(),
        )
    }

    fn migration(version: &str) -> Migration {
        Migration {
            version: version.to_string(),
            body: String::new(),
            path: format!("{}.sql", version).into(),
        }
    }

    #[test]
    fn test_pending_set_preserves_order() {
        let discovered = vec![migration("0001"), migration("0002"), migration("0003")];
        let applied: BTreeSet<String> = ["0002".to_string()].into_iter().collect();

        let pending = pending_migrations(discovered, &applied);
        let versions: Vec<_> = pending.iter().map(|m| m.version.as_str()).collect();
        assert_eq!(versions, vec!["0001", "0003"]);
    }

    #[tokio::test]
    async fn test_applies_in_lexical_order() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "0002_add_col.sql", "ALTER users ADD name");
        write(temp_dir.path(), "0010_index.sql", "CREATE INDEX");
        write(temp_dir.path(), "0001_init.sql", "CREATE users");

        let db = MemoryDatabase::new();
        let reporter = Arc::new(RecordingReporter::default());
        let mut runner = runner(&db, temp_dir.path(), &reporter);

        let result = runner.run().await.unwrap();
        assert_eq!(result.applied, vec!["0001_init", "0002_add_col", "0010_index"]);
        assert_eq!(result.skipped, 0);
        assert_eq!(runner.state(), &RunState::Done);

        assert_eq!(
            db.committed_statements(),
            vec!["CREATE users", "ALTER users ADD name", "CREATE INDEX"]
        );
        assert_eq!(reporter.applied_versions(), vec!["0001_init", "0002_add_col", "0010_index"]);
        assert_eq!(reporter.completed_runs(), 1);
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "0001_init.sql", "CREATE users");
        write(temp_dir.path(), "0002_add_col.sql", "ALTER users");

        let db = MemoryDatabase::new();
        let reporter = Arc::new(RecordingReporter::default());
        runner(&db, temp_dir.path(), &reporter).run().await.unwrap();
        let records_before = db.records();

        let mut second = runner(&db, temp_dir.path(), &reporter);
        let result = second.run().await.unwrap();
        assert!(result.applied.is_empty());
        assert_eq!(result.skipped, 2);
        assert_eq!(db.records(), records_before);
        assert_eq!(db.committed_statements().len(), 2);
    }

    #[tokio::test]
    async fn test_orphaned_records_are_not_counted_as_skipped() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "0001_init.sql", "CREATE users");
        write(temp_dir.path(), "0002_add_col.sql", "ALTER users");

        let db = MemoryDatabase::new();
        db.seed_applied("0000_removed_script");
        db.seed_applied("0001_init");
        let reporter = Arc::new(RecordingReporter::default());

        let result = runner(&db, temp_dir.path(), &reporter).run().await.unwrap();
        assert_eq!(result.applied, vec!["0002_add_col"]);
        assert_eq!(result.skipped, 1);
    }

    #[tokio::test]
    async fn test_records_both_versions_in_order() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "0001_init.sql", "CREATE users");
        write(temp_dir.path(), "0002_add_col.sql", "ALTER users");

        let db = MemoryDatabase::new();
        let reporter = Arc::new(RecordingReporter::default());
        runner(&db, temp_dir.path(), &reporter).run().await.unwrap();

        let records = db.records();
        let versions: Vec<_> = records.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, vec!["0001_init", "0002_add_col"]);
        assert!(records[0].applied_at <= records[1].applied_at);
    }

    #[tokio::test]
    async fn test_execution_failure_rolls_back_and_stops() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "0001_init.sql", "CREATE users");
        write(
            temp_dir.path(),
            "0002_broken.sql",
            "CREATE points; INSERT BROKEN",
        );
        write(temp_dir.path(), "0003_later.sql", "CREATE rewards");

        let db = MemoryDatabase::new();
        db.fail_on("BROKEN");
        let reporter = Arc::new(RecordingReporter::default());
        let mut runner = runner(&db, temp_dir.path(), &reporter);

        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, MigrationError::Execution { .. }));
        assert_eq!(err.version(), Some("0002_broken"));
        assert_eq!(runner.state(), &RunState::Failed);

        assert_eq!(db.applied_versions(), vec!["0001_init"]);
        assert_eq!(db.committed_statements(), vec!["CREATE users"]);
        assert_eq!(db.rollbacks(), 1);
        assert_eq!(db.open_transactions(), 0);
        assert_eq!(reporter.applied_versions(), vec!["0001_init"]);
        assert_eq!(reporter.completed_runs(), 0);
    }

    #[tokio::test]
    async fn test_resumes_after_failure_is_fixed() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "0001_init.sql", "CREATE users");
        write(temp_dir.path(), "0002_add_col.sql", "ALTER BROKEN");

        let db = MemoryDatabase::new();
        db.fail_on("BROKEN");
        let reporter = Arc::new(RecordingReporter::default());
        assert!(runner(&db, temp_dir.path(), &reporter).run().await.is_err());

        write(temp_dir.path(), "0002_add_col.sql", "ALTER users");
        let result = runner(&db, temp_dir.path(), &reporter).run().await.unwrap();
        assert_eq!(result.applied, vec!["0002_add_col"]);
        assert_eq!(result.skipped, 1);
        assert_eq!(db.applied_versions(), vec!["0001_init", "0002_add_col"]);
    }

    #[tokio::test]
    async fn test_applies_only_what_is_missing() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "0001_init.sql", "CREATE users");
        write(temp_dir.path(), "0002_add_col.sql", "ALTER users");

        let db = MemoryDatabase::new();
        db.seed_applied("0001_init");
        let reporter = Arc::new(RecordingReporter::default());

        let result = runner(&db, temp_dir.path(), &reporter).run().await.unwrap();
        assert_eq!(result.applied, vec!["0002_add_col"]);
        assert_eq!(db.committed_statements(), vec!["ALTER users"]);
    }

    #[tokio::test]
    async fn test_record_conflict_rolls_back_script() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "0001_init.sql", "CREATE users");

        let db = MemoryDatabase::new();
        db.commit_concurrently("0001_init");
        let reporter = Arc::new(RecordingReporter::default());
        let mut runner = runner(&db, temp_dir.path(), &reporter);

        let err = runner.run().await.unwrap_err();
        assert!(err.is_conflict(), "unexpected error: {}", err);
        assert_eq!(err.version(), Some("0001_init"));

        // Only the concurrent runner's application is visible
        assert_eq!(db.applied_versions(), vec!["0001_init"]);
        assert!(db.committed_statements().is_empty());
        assert_eq!(db.rollbacks(), 1);
        assert!(reporter.applied_versions().is_empty());
    }

    #[tokio::test]
    async fn test_commit_failure_is_reported_with_version() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "0001_init.sql", "CREATE users");
        write(temp_dir.path(), "0002_add_col.sql", "ALTER users");

        let db = MemoryDatabase::new();
        db.fail_commit_of("0002_add_col");
        let reporter = Arc::new(RecordingReporter::default());
        let mut runner = runner(&db, temp_dir.path(), &reporter);

        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, MigrationError::Commit { .. }));
        assert_eq!(err.version(), Some("0002_add_col"));
        assert_eq!(db.applied_versions(), vec!["0001_init"]);
        assert_eq!(runner.state(), &RunState::Failed);
    }

    #[tokio::test]
    async fn test_unreachable_database_fails_before_discovery() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");

        let db = MemoryDatabase::new();
        db.set_unreachable(true);
        let reporter = Arc::new(RecordingReporter::default());
        let mut runner = runner(&db, &missing, &reporter);

        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, MigrationError::Connectivity { .. }));
        assert_eq!(runner.state(), &RunState::Failed);
    }

    #[tokio::test]
    async fn test_schema_init_failure_aborts() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "0001_init.sql", "CREATE users");

        let db = MemoryDatabase::new();
        db.fail_schema_init();
        let reporter = Arc::new(RecordingReporter::default());

        let err = runner(&db, temp_dir.path(), &reporter).run().await.unwrap_err();
        assert!(matches!(err, MigrationError::SchemaInit(_)));
        assert!(db.committed_statements().is_empty());
    }

    #[tokio::test]
    async fn test_discovery_failure_aborts() {
        let temp_dir = TempDir::new().unwrap();

        let db = MemoryDatabase::new();
        let reporter = Arc::new(RecordingReporter::default());
        let mut runner = runner(&db, &temp_dir.path().join("missing"), &reporter);

        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, MigrationError::Discovery { .. }));
        assert!(db.schema_initialized());
        assert_eq!(runner.state(), &RunState::Failed);
    }

    #[tokio::test]
    async fn test_list_applied_failure_aborts() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "0001_init.sql", "CREATE users");

        let db = MemoryDatabase::new();
        db.fail_list_applied();
        let reporter = Arc::new(RecordingReporter::default());

        let err = runner(&db, temp_dir.path(), &reporter).run().await.unwrap_err();
        assert!(matches!(err, MigrationError::ListApplied(_)));
        assert!(db.committed_statements().is_empty());
    }

    #[tokio::test]
    async fn test_empty_directory_completes() {
        let temp_dir = TempDir::new().unwrap();

        let db = MemoryDatabase::new();
        let reporter = Arc::new(RecordingReporter::default());
        let mut runner = runner(&db, temp_dir.path(), &reporter);

        let result = runner.run().await.unwrap();
        assert_eq!(result.applied_count(), 0);
        assert_eq!(runner.state(), &RunState::Done);
        assert_eq!(reporter.completed_runs(), 1);
    }

    #[tokio::test]
    async fn test_status_reports_pending_applied_and_orphaned() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "0001_init.sql", "CREATE users");
        write(temp_dir.path(), "0002_add_col.sql", "ALTER users");

        let db = MemoryDatabase::new();
        db.seed_applied("0001_init");
        db.seed_applied("0000_removed");
        let reporter = Arc::new(RecordingReporter::default());
        let runner = runner(&db, temp_dir.path(), &reporter);

        let report = runner.status().await.unwrap();
        assert_eq!(report.entries.len(), 2);
        assert!(matches!(
            report.entries[0].status,
            MigrationStatus::Applied { .. }
        ));
        assert_eq!(report.entries[1].status, MigrationStatus::Pending);
        assert_eq!(report.pending().collect::<Vec<_>>(), vec!["0002_add_col"]);

        let orphaned: Vec<_> = report.orphaned.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(orphaned, vec!["0000_removed"]);
        assert_eq!(runner.state(), &RunState::Idle);
    }

    #[tokio::test]
    async fn test_status_does_not_create_tracking_table() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "0001_init.sql", "CREATE users");

        let db = MemoryDatabase::new();
        let reporter = Arc::new(RecordingReporter::default());

        let report = runner(&db, temp_dir.path(), &reporter).status().await.unwrap();
        assert_eq!(report.pending_count(), 1);
        assert!(!db.schema_initialized());
    }
}
