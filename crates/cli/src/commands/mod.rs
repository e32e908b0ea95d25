pub mod migrate;
pub mod serve;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use loyalty_core::{AppConfig, AppConfigTrait};
use loyalty_orm::PgConnectionManager;

/// Overrides for where migrations live and where they are tracked
#[derive(Args, Debug, Clone, Default)]
pub struct MigrationTargetArgs {
    /// Directory holding the `.sql` scripts (default: $MIGRATIONS_DIR or ./migrations)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Tracking table name (default: $MIGRATIONS_TABLE or schema_migrations)
    #[arg(long)]
    pub table: Option<String>,
}

impl MigrationTargetArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.dir {
            config.migrations.migrations_dir = dir.clone();
        }
        if let Some(table) = &self.table {
            config.migrations.migrations_table = table.clone();
        }
    }
}

/// Check the assembled configuration before anything touches the database
pub fn validate(config: &AppConfig) -> Result<()> {
    config.validate().context("Invalid configuration")
}

pub async fn connect(config: &AppConfig) -> Result<PgConnectionManager> {
    PgConnectionManager::connect(&config.database)
        .await
        .with_context(|| {
            format!(
                "Error connecting to the database at {}",
                config.database.display_url()
            )
        })
}
