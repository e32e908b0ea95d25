//! # loyalty-core
//!
//! Environment-driven configuration and logging setup shared by the
//! migration engine, the HTTP server and the command line front end.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, AppConfigTrait, ConfigError, ConfigSource, DatabaseConfig, LogFormat,
    LoggingConfig, MigrationConfig, PoolConfig, ServerConfig,
};
pub use logging::init_logging;
