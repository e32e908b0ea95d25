//! In-memory test doubles
//!
//! [`MemoryDatabase`] buffers each transaction's statements and tracking
//! records and only publishes them on commit, so tests can observe exactly
//! what a real database would have persisted. Failures are scripted with
//! `fail_*` hooks.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::database::ConnectionManager;
use crate::error::{DatabaseError, DatabaseResult};
use crate::migrations::{AppliedMigrationRecord, MigrationReporter, MigrationRepository, MigrationRunResult};
use crate::transaction::TransactionScope;
use crate::users::{User, UserStore};

#[derive(Debug, Default)]
struct MemoryState {
    schema_initialized: bool,
    records: Vec<AppliedMigrationRecord>,
    committed_statements: Vec<String>,
    open_transactions: usize,
    rollbacks: usize,
    closed: bool,

    unreachable: bool,
    fail_schema_init: bool,
    fail_list_applied: bool,
    failing_markers: Vec<String>,
    failing_commits: BTreeSet<String>,
    concurrent_commits: Vec<String>,
}

impl MemoryState {
    fn check_reachable(&self) -> DatabaseResult<()> {
        if self.unreachable {
            return Err(DatabaseError::Connection("connection refused".to_string()));
        }
        if self.closed {
            return Err(DatabaseError::Connection("Database pool is closed".to_string()));
        }
        Ok(())
    }

    fn is_recorded(&self, version: &str) -> bool {
        self.records.iter().any(|record| record.version == version)
    }

    fn push_record(&mut self, version: String) {
        // Keep applied_at monotonic even when the clock does not advance
        let now = Utc::now();
        let applied_at = self
            .records
            .last()
            .map_or(now, |last| last.applied_at.max(now));
        self.records.push(AppliedMigrationRecord {
            version,
            applied_at,
        });
    }
}

/// Shared in-memory database; clones observe the same state
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tracking table view over this database
    pub fn repository(&self) -> MemoryRepository {
        MemoryRepository { db: self.clone() }
    }

    /// Make every statement batch containing `marker` fail
    pub fn fail_on(&self, marker: impl Into<String>) {
        self.state().failing_markers.push(marker.into());
    }

    /// Make the commit of the transaction recording `version` fail
    pub fn fail_commit_of(&self, version: impl Into<String>) {
        self.state().failing_commits.insert(version.into());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    pub fn fail_schema_init(&self) {
        self.state().fail_schema_init = true;
    }

    pub fn fail_list_applied(&self) {
        self.state().fail_list_applied = true;
    }

    /// Simulate another runner committing `version` just after the next
    /// transaction begins
    pub fn commit_concurrently(&self, version: impl Into<String>) {
        self.state().concurrent_commits.push(version.into());
    }

    /// Record `version` as applied without running anything
    pub fn seed_applied(&self, version: impl Into<String>) {
        let mut state = self.state();
        state.schema_initialized = true;
        state.push_record(version.into());
    }

    /// Committed versions in commit order
    pub fn applied_versions(&self) -> Vec<String> {
        self.state()
            .records
            .iter()
            .map(|record| record.version.clone())
            .collect()
    }

    pub fn records(&self) -> Vec<AppliedMigrationRecord> {
        self.state().records.clone()
    }

    /// Statement batches from committed transactions, in commit order
    pub fn committed_statements(&self) -> Vec<String> {
        self.state().committed_statements.clone()
    }

    pub fn open_transactions(&self) -> usize {
        self.state().open_transactions
    }

    pub fn rollbacks(&self) -> usize {
        self.state().rollbacks
    }

    pub fn schema_initialized(&self) -> bool {
        self.state().schema_initialized
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

#[async_trait]
impl ConnectionManager for MemoryDatabase {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> DatabaseResult<MemoryTransaction> {
        let mut state = self.state();
        state.check_reachable()?;
        state.open_transactions += 1;

        let concurrent: Vec<String> = state.concurrent_commits.drain(..).collect();
        for version in concurrent {
            state.schema_initialized = true;
            state.push_record(version);
        }

        Ok(MemoryTransaction {
            db: self.clone(),
            statements: Vec::new(),
            versions: Vec::new(),
            finished: false,
        })
    }

    async fn ping(&self) -> DatabaseResult<()> {
        self.state().check_reachable()
    }

    async fn close(&self) {
        self.state().closed = true;
    }
}

/// Buffered transaction; dropped without commit counts as a rollback
#[derive(Debug)]
pub struct MemoryTransaction {
    db: MemoryDatabase,
    statements: Vec<String>,
    versions: Vec<String>,
    finished: bool,
}

impl MemoryTransaction {
    fn finish(&mut self, rolled_back: bool) {
        self.finished = true;
        let mut state = self.db.state();
        state.open_transactions = state.open_transactions.saturating_sub(1);
        if rolled_back {
            state.rollbacks += 1;
        }
    }
}

#[async_trait]
impl TransactionScope for MemoryTransaction {
    async fn execute(&mut self, sql: &str) -> DatabaseResult<u64> {
        {
            let state = self.db.state();
            state.check_reachable()?;
            if let Some(marker) = state
                .failing_markers
                .iter()
                .find(|marker| sql.contains(marker.as_str()))
            {
                return Err(DatabaseError::Query(format!(
                    "syntax error at or near \"{}\"",
                    marker
                )));
            }
        }

        self.statements.push(sql.to_string());
        Ok(0)
    }

    async fn commit(mut self) -> DatabaseResult<()> {
        let failing = {
            let state = self.db.state();
            self.versions
                .iter()
                .find(|version| state.failing_commits.contains(*version))
                .cloned()
        };
        if let Some(version) = failing {
            self.finish(false);
            return Err(DatabaseError::Transaction(format!(
                "Failed to commit transaction recording {}: connection reset",
                version
            )));
        }

        let statements = std::mem::take(&mut self.statements);
        let versions = std::mem::take(&mut self.versions);
        {
            let mut state = self.db.state();
            state.committed_statements.extend(statements);
            for version in versions {
                state.push_record(version);
            }
        }
        self.finish(false);
        Ok(())
    }

    async fn rollback(mut self) -> DatabaseResult<()> {
        self.finish(true);
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(true);
        }
    }
}

/// Tracking table stored in a [`MemoryDatabase`]
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    db: MemoryDatabase,
}

#[async_trait]
impl MigrationRepository for MemoryRepository {
    type Transaction = MemoryTransaction;

    async fn ensure_schema(&self) -> DatabaseResult<()> {
        let mut state = self.db.state();
        state.check_reachable()?;
        if state.fail_schema_init {
            return Err(DatabaseError::Query(
                "permission denied for schema public".to_string(),
            ));
        }
        state.schema_initialized = true;
        Ok(())
    }

    async fn schema_exists(&self) -> DatabaseResult<bool> {
        let state = self.db.state();
        state.check_reachable()?;
        Ok(state.schema_initialized)
    }

    async fn list_applied(&self) -> DatabaseResult<BTreeSet<String>> {
        let state = self.db.state();
        state.check_reachable()?;
        if state.fail_list_applied {
            return Err(DatabaseError::Query(
                "relation \"schema_migrations\" does not exist".to_string(),
            ));
        }
        Ok(state.records.iter().map(|r| r.version.clone()).collect())
    }

    async fn list_records(&self) -> DatabaseResult<Vec<AppliedMigrationRecord>> {
        let state = self.db.state();
        state.check_reachable()?;
        let mut records = state.records.clone();
        records.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(records)
    }

    async fn record_applied(&self, version: &str, tx: &mut MemoryTransaction) -> DatabaseResult<()> {
        let state = self.db.state();
        state.check_reachable()?;
        if state.is_recorded(version) || tx.versions.iter().any(|v| v == version) {
            return Err(DatabaseError::UniqueViolation(format!(
                "duplicate key value violates unique constraint \"schema_migrations_version_key\": {}",
                version
            )));
        }
        drop(state);

        tx.versions.push(version.to_string());
        Ok(())
    }
}

/// Reporter that remembers what it was told
#[derive(Debug, Default)]
pub struct RecordingReporter {
    applied: Mutex<Vec<String>>,
    completed: Mutex<Vec<MigrationRunResult>>,
}

impl RecordingReporter {
    pub fn applied_versions(&self) -> Vec<String> {
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn completed_runs(&self) -> usize {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl MigrationReporter for RecordingReporter {
    fn applied(&self, version: &str) {
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(version.to_string());
    }

    fn completed(&self, result: &MigrationRunResult) {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result.clone());
    }
}

/// Fixed list of users, or a scripted failure
#[derive(Debug, Clone, Default)]
pub struct MemoryUserStore {
    users: Vec<User>,
    failing: bool,
}

impl MemoryUserStore {
    pub fn new(users: Vec<User>) -> Self {
        Self {
            users,
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            users: Vec::new(),
            failing: true,
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn list_users(&self) -> DatabaseResult<Vec<User>> {
        if self.failing {
            return Err(DatabaseError::Connection("connection refused".to_string()));
        }
        let mut users = self.users.clone();
        users.sort_by_key(|user| user.id);
        Ok(users)
    }
}
