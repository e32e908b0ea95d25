//! Connection management
//!
//! [`ConnectionManager`] is the capability the migration engine and the HTTP
//! layer depend on: scoped transactions plus a readiness probe.
//! [`PgConnectionManager`] is the PostgreSQL implementation over a sqlx pool;
//! tests substitute an in-memory implementation.

use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use loyalty_core::config::{DatabaseConfig, PoolConfig};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use tracing::{debug, error, info};

use crate::error::{DatabaseError, DatabaseResult};
use crate::transaction::{PgTransaction, TransactionScope};

/// Pooled database handle supporting scoped transactions and a readiness probe
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    type Transaction: TransactionScope;

    /// Open a transaction on a connection taken from the pool
    async fn begin(&self) -> DatabaseResult<Self::Transaction>;

    /// Check that the database answers
    async fn ping(&self) -> DatabaseResult<()>;

    /// Close the pool; outstanding connections finish first
    async fn close(&self);
}

/// PostgreSQL connection manager
#[derive(Clone)]
pub struct PgConnectionManager {
    pool: PgPool,
}

impl PgConnectionManager {
    /// Create the pool from configuration and verify the server answers.
    ///
    /// Any failure here is a connectivity failure.
    pub async fn connect(config: &DatabaseConfig) -> DatabaseResult<Self> {
        debug!("Creating database pool for {}", config.display_url());

        let options = connect_options(config)?;
        let pool = pool_options(&config.pool)
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("Failed to create database pool: {}", e);
                DatabaseError::Connection(format!("Failed to create connection pool: {}", e))
            })?;

        let manager = Self::from_pool(pool);
        manager.ping().await?;

        info!(
            "Database pool ready ({} max connections) at {}",
            config.pool.max_connections,
            config.display_url()
        );
        Ok(manager)
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ConnectionManager for PgConnectionManager {
    type Transaction = PgTransaction;

    async fn begin(&self) -> DatabaseResult<PgTransaction> {
        if self.pool.is_closed() {
            return Err(DatabaseError::Connection("Database pool is closed".to_string()));
        }

        let tx = self.pool.begin().await.map_err(|e| match DatabaseError::from(e) {
            DatabaseError::Query(msg) => {
                DatabaseError::Transaction(format!("Failed to begin transaction: {}", msg))
            }
            other => other,
        })?;

        debug!("Database transaction started");
        Ok(PgTransaction::new(tx))
    }

    async fn ping(&self) -> DatabaseResult<()> {
        let start = Instant::now();

        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| {
            DatabaseError::Connection(format!("Error connecting to the database: {}", e))
        })?;

        debug!("Database ping answered in {:?}", start.elapsed());
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}

/// Client options for the configured server
pub fn connect_options(config: &DatabaseConfig) -> DatabaseResult<PgConnectOptions> {
    let ssl_mode = PgSslMode::from_str(&config.ssl_mode).map_err(|e| {
        DatabaseError::Configuration(format!("Invalid sslmode '{}': {}", config.ssl_mode, e))
    })?;

    Ok(PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.name)
        .ssl_mode(ssl_mode))
}

/// Pool sizing taken from configuration; zero lifetimes mean "unbounded"
pub fn pool_options(config: &PoolConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout))
        .max_lifetime(non_zero_secs(config.max_lifetime))
        .idle_timeout(non_zero_secs(config.idle_timeout))
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
