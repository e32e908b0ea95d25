//! Transaction Management
//!
//! A [`TransactionScope`] is one open transaction on one pooled connection.
//! Dropping a scope without calling [`TransactionScope::commit`] rolls it
//! back, so an early return on an error path never leaves work pending.

use async_trait::async_trait;
use sqlx::{Executor, PgConnection, Postgres, Transaction as SqlxTransaction};
use tracing::debug;

use crate::error::{DatabaseError, DatabaseResult};

/// An open transaction handed out by a [`crate::ConnectionManager`]
#[async_trait]
pub trait TransactionScope: Send {
    /// Execute `sql` verbatim as a single batch; multiple statements are allowed.
    ///
    /// Returns the number of rows affected.
    async fn execute(&mut self, sql: &str) -> DatabaseResult<u64>;

    /// Commit the transaction
    async fn commit(self) -> DatabaseResult<()>;

    /// Rollback the transaction
    async fn rollback(self) -> DatabaseResult<()>;
}

/// PostgreSQL transaction owning its pooled connection
pub struct PgTransaction {
    inner: SqlxTransaction<'static, Postgres>,
}

impl PgTransaction {
    pub(crate) fn new(inner: SqlxTransaction<'static, Postgres>) -> Self {
        Self { inner }
    }

    /// Connection inside the transaction, for bound queries
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.inner
    }
}

#[async_trait]
impl TransactionScope for PgTransaction {
    async fn execute(&mut self, sql: &str) -> DatabaseResult<u64> {
        // An unbound &str goes over the simple query protocol, which accepts
        // several statements in one round trip.
        let result = self.connection().execute(sql).await?;
        Ok(result.rows_affected())
    }

    async fn commit(self) -> DatabaseResult<()> {
        debug!("Committing transaction");
        self.inner
            .commit()
            .await
            .map_err(|e| DatabaseError::Transaction(format!("Failed to commit transaction: {}", e)))
    }

    async fn rollback(self) -> DatabaseResult<()> {
        debug!("Rolling back transaction");
        self.inner.rollback().await.map_err(|e| {
            DatabaseError::Transaction(format!("Failed to rollback transaction: {}", e))
        })
    }
}
