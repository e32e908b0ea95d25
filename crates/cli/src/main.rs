mod commands;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use commands::*;
use loyalty_core::{init_logging, AppConfig, AppConfigTrait};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "loyalty")]
#[command(version, about = "Coffee loyalty backend: schema migrations and HTTP server")]
struct Cli {
    /// Load environment variables from this file first; variables already set win
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Database migrations
    Migrate {
        #[command(subcommand)]
        migrate_command: MigrateCommands,
    },

    /// Run the HTTP server
    Serve,
}

#[derive(Subcommand, Debug)]
enum MigrateCommands {
    /// Apply all pending migrations
    Run {
        #[command(flatten)]
        target: MigrationTargetArgs,
    },

    /// Show applied and pending migrations
    Status {
        #[command(flatten)]
        target: MigrationTargetArgs,
    },

    /// Create a new migration file
    Create {
        /// Migration name, e.g. "add loyalty points"
        name: String,

        /// Directory to create it in (default: $MIGRATIONS_DIR or ./migrations)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

impl Commands {
    fn target(&self) -> MigrationTargetArgs {
        match self {
            Commands::Migrate { migrate_command } => match migrate_command {
                MigrateCommands::Run { target } | MigrateCommands::Status { target } => {
                    target.clone()
                }
                MigrateCommands::Create { dir, .. } => MigrationTargetArgs {
                    dir: dir.clone(),
                    table: None,
                },
            },
            Commands::Serve => MigrationTargetArgs::default(),
        }
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    if let Some(path) = &cli.env_file {
        dotenvy::from_path(path)
            .with_context(|| format!("Failed to load environment file {}", path.display()))?;
    }

    let mut config = AppConfig::from_env().context("Failed to load configuration")?;
    cli.command.target().apply(&mut config);
    validate(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    init_logging(&config.logging).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;
    debug!("Configuration sources: {:?}", config.database.config_sources());

    match cli.command {
        Commands::Migrate { migrate_command } => match migrate_command {
            MigrateCommands::Run { .. } => migrate::run(&config).await?,
            MigrateCommands::Status { .. } => migrate::status(&config).await?,
            MigrateCommands::Create { name, .. } => migrate::create(&config, &name)?,
        },
        Commands::Serve => serve::run(&config).await?,
    }

    Ok(())
}
