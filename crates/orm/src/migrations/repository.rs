//! Migration Repository - the tracking table
//!
//! Records which versions have been applied. A version is recorded in the
//! same transaction as its script, and the `UNIQUE` constraint on `version`
//! rejects a second recording of the same version.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loyalty_core::config::{validate_identifier, MigrationConfig};
use sqlx::{PgPool, Row};
use tracing::debug;

use super::definitions::AppliedMigrationRecord;
use crate::error::{DatabaseError, DatabaseResult};
use crate::transaction::PgTransaction;

/// Persistent record of applied versions
#[async_trait]
pub trait MigrationRepository: Send + Sync {
    /// Transaction type `record_applied` writes through
    type Transaction: Send;

    /// Create the tracking table if it does not exist; idempotent
    async fn ensure_schema(&self) -> DatabaseResult<()>;

    /// Whether the tracking table exists, without creating it
    async fn schema_exists(&self) -> DatabaseResult<bool>;

    /// Every recorded version
    async fn list_applied(&self) -> DatabaseResult<BTreeSet<String>>;

    /// Every record with its timestamp, ordered by version
    async fn list_records(&self) -> DatabaseResult<Vec<AppliedMigrationRecord>>;

    /// Record `version` as applied inside `tx`.
    ///
    /// Fails with [`DatabaseError::UniqueViolation`] if it is already recorded.
    async fn record_applied(&self, version: &str, tx: &mut Self::Transaction)
        -> DatabaseResult<()>;
}

/// PostgreSQL tracking table
#[derive(Debug, Clone)]
pub struct PgMigrationRepository {
    pool: PgPool,
    table: String,
}

impl PgMigrationRepository {
    /// The table name is interpolated into SQL, so it must be a plain identifier
    pub fn new(pool: PgPool, table: impl Into<String>) -> DatabaseResult<Self> {
        let table = table.into();
        validate_identifier("migrations_table", &table)
            .map_err(|e| DatabaseError::Configuration(e.to_string()))?;
        Ok(Self { pool, table })
    }

    pub fn from_config(pool: PgPool, config: &MigrationConfig) -> DatabaseResult<Self> {
        Self::new(pool, config.migrations_table.clone())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// SQL to create the migrations tracking table
    fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                id SERIAL PRIMARY KEY,\n    \
                version VARCHAR(255) UNIQUE NOT NULL,\n    \
                applied_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP\n\
            )",
            self.table
        )
    }

    /// SQL to record a migration as applied
    fn record_sql(&self) -> String {
        format!("INSERT INTO {} (version) VALUES ($1)", self.table)
    }

    /// SQL to list applied versions
    fn applied_versions_sql(&self) -> String {
        format!("SELECT version FROM {}", self.table)
    }

    /// SQL to list applied records
    fn records_sql(&self) -> String {
        format!(
            "SELECT version, applied_at FROM {} ORDER BY version",
            self.table
        )
    }
}

#[async_trait]
impl MigrationRepository for PgMigrationRepository {
    type Transaction = PgTransaction;

    async fn ensure_schema(&self) -> DatabaseResult<()> {
        let sql = self.create_table_sql();
        match sqlx::query(&sql).execute(&self.pool).await.map_err(DatabaseError::from) {
            Ok(_) => {}
            // Two concurrent CREATE TABLE IF NOT EXISTS can both pass the
            // existence check; the loser trips the catalog's unique index.
            Err(DatabaseError::UniqueViolation(msg)) => {
                debug!("Tracking table {} created concurrently: {}", self.table, msg);
            }
            Err(e) => return Err(e),
        }

        debug!("Tracking table {} is ready", self.table);
        Ok(())
    }

    async fn schema_exists(&self) -> DatabaseResult<bool> {
        let row = sqlx::query("SELECT to_regclass($1) IS NOT NULL AS present")
            .bind(&self.table)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("present")?)
    }

    async fn list_applied(&self) -> DatabaseResult<BTreeSet<String>> {
        let sql = self.applied_versions_sql();
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("version").map_err(DatabaseError::from))
            .collect()
    }

    async fn list_records(&self) -> DatabaseResult<Vec<AppliedMigrationRecord>> {
        let sql = self.records_sql();
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let version: String = row.try_get("version")?;
            let applied_at: DateTime<Utc> = row.try_get("applied_at")?;
            records.push(AppliedMigrationRecord {
                version,
                applied_at,
            });
        }
        Ok(records)
    }

    async fn record_applied(&self, version: &str, tx: &mut PgTransaction) -> DatabaseResult<()> {
        let sql = self.record_sql();
        sqlx::query(&sql)
            .bind(version)
            .execute(tx.connection())
            .await?;
        Ok(())
    }
}
