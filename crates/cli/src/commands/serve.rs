use std::sync::Arc;

use anyhow::{Context, Result};
use loyalty_core::AppConfig;
use loyalty_orm::PgUserStore;
use tracing::info;

/// Run the HTTP server until Ctrl+C or SIGTERM
pub async fn run(config: &AppConfig) -> Result<()> {
    let connections = super::connect(config).await?;
    let users = Arc::new(PgUserStore::new(connections.pool().clone()));

    info!("Starting server on {}", config.server.bind_address());
    loyalty_http::serve(&config.server, connections, users)
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}
