use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use loyalty_core::AppConfig;
use loyalty_orm::{
    ConnectionManager, ConsoleReporter, MigrationRunner, MigrationSource, MigrationStatus,
    MigrationStatusEntry, MigrationStatusReport, PgConnectionManager, PgMigrationRepository,
};
use tracing::{info, warn};

type PgMigrationRunner = MigrationRunner<PgConnectionManager, PgMigrationRepository>;

fn build_runner(config: &AppConfig, connections: &PgConnectionManager) -> Result<PgMigrationRunner> {
    let repository = PgMigrationRepository::from_config(connections.pool().clone(), &config.migrations)
        .context("Invalid migrations table")?;

    Ok(MigrationRunner::new(
        connections.clone(),
        repository,
        MigrationSource::from_config(&config.migrations),
        Arc::new(ConsoleReporter),
    ))
}

/// Apply every pending migration
pub async fn run(config: &AppConfig) -> Result<()> {
    let connections = super::connect(config).await?;
    let mut runner = build_runner(config, &connections)?;

    let result = runner.run().await;
    connections.close().await;

    let result = result.context("Migration failed")?;
    info!(
        "Applied {} migration(s), {} already applied, in {:?}",
        result.applied_count(),
        result.skipped,
        result.elapsed
    );
    Ok(())
}

/// Show which migrations are applied and which are pending
pub async fn status(config: &AppConfig) -> Result<()> {
    let connections = super::connect(config).await?;
    let runner = build_runner(config, &connections)?;

    let report = runner.status().await;
    connections.close().await;
    let report = report.context("Failed to read migration status")?;

    print!("{}", render_status(&report));
    if !report.orphaned.is_empty() {
        warn!("{} applied migration(s) have no script", report.orphaned.len());
    }
    Ok(())
}

/// Write a new, empty migration script
pub fn create(config: &AppConfig, name: &str) -> Result<()> {
    let path = create_in(&config.migrations.migrations_dir, name)?;
    println!("Created migration: {}", path.display());
    Ok(())
}

fn create_in(dir: &Path, name: &str) -> Result<PathBuf> {
    MigrationSource::new(dir)
        .create(name, Utc::now())
        .context("Failed to create migration")
}

fn status_line(entry: &MigrationStatusEntry) -> String {
    match &entry.status {
        MigrationStatus::Applied { applied_at } => format!(
            "[applied {}] {}",
            applied_at.format("%Y-%m-%d %H:%M:%S UTC"),
            entry.version
        ),
        MigrationStatus::Pending => format!("[pending] {}", entry.version),
    }
}

fn render_status(report: &MigrationStatusReport) -> String {
    let mut out = String::new();
    if report.entries.is_empty() {
        out.push_str("No migrations found\n");
    }
    for entry in &report.entries {
        out.push_str(&status_line(entry));
        out.push('\n');
    }
    for orphan in &report.orphaned {
        out.push_str(&format!(
            "warning: {} is recorded as applied but has no script\n",
            orphan.version
        ));
    }
    out.push_str(&format!(
        "{} applied, {} pending\n",
        report.entries.len() - report.pending_count(),
        report.pending_count()
    ));
    out
}
