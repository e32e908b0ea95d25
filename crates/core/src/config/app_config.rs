use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::database::{DatabaseConfig, MigrationConfig};
use super::sources::{env_or_default, env_parse_or_default, source_of, ConfigSource};
use super::validation::ConfigError;

/// Configuration trait for application configuration
pub trait AppConfigTrait: Sized {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;

    /// Get configuration source information for debugging
    fn config_sources(&self) -> HashMap<String, ConfigSource>;
}

/// Application configuration structure
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub migrations: MigrationConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl AppConfigTrait for AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(AppConfig {
            database: DatabaseConfig::from_env()?,
            migrations: MigrationConfig::from_env()?,
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.migrations.validate()?;
        self.server.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        ["database", "migrations", "server", "logging"]
            .into_iter()
            .map(|section| (section.to_string(), ConfigSource::Nested))
            .collect()
    }
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Per-request timeout in seconds
    pub request_timeout: u64,
    /// Grace period for in-flight requests on shutdown, in seconds
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout: 15,
            shutdown_timeout: 10,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl AppConfigTrait for ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(ServerConfig {
            host: env_or_default("SERVER_HOST", &defaults.host),
            port: env_parse_or_default("SERVER_PORT", defaults.port, "valid port number (1-65535)")?,
            request_timeout: env_parse_or_default(
                "SERVER_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout,
                "number of seconds",
            )?,
            shutdown_timeout: env_parse_or_default(
                "SERVER_SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout,
                "number of seconds",
            )?,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::validation_failed("host", "Host cannot be empty"));
        }

        if self.port == 0 {
            return Err(ConfigError::validation_failed("port", "Port cannot be 0"));
        }

        if self.request_timeout == 0 {
            return Err(ConfigError::validation_failed(
                "request_timeout",
                "Request timeout cannot be 0",
            ));
        }

        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let defaults = Self::default();
        let mut sources = HashMap::new();
        sources.insert("host".to_string(), source_of("SERVER_HOST", defaults.host));
        sources.insert("port".to_string(), source_of("SERVER_PORT", defaults.port));
        sources.insert(
            "request_timeout".to_string(),
            source_of("SERVER_REQUEST_TIMEOUT_SECS", defaults.request_timeout),
        );
        sources.insert(
            "shutdown_timeout".to_string(),
            source_of("SERVER_SHUTDOWN_TIMEOUT_SECS", defaults.shutdown_timeout),
        );
        sources
    }
}

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::invalid_value(
                "LOG_FORMAT",
                s,
                "compact, pretty, or json",
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl AppConfigTrait for LoggingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let level = env_or_default("LOG_LEVEL", "info").to_lowercase();
        let format = env_or_default("LOG_FORMAT", "compact").parse::<LogFormat>()?;

        Ok(LoggingConfig { level, format })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(ConfigError::invalid_value(
                "level",
                self.level.clone(),
                "trace, debug, info, warn, or error",
            ));
        }

        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        sources.insert("level".to_string(), source_of("LOG_LEVEL", "info"));
        sources.insert("format".to_string(), source_of("LOG_FORMAT", LogFormat::Compact));
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_test_env() {
        for key in [
            "SERVER_HOST",
            "SERVER_PORT",
            "SERVER_REQUEST_TIMEOUT_SECS",
            "SERVER_SHUTDOWN_TIMEOUT_SECS",
            "LOG_LEVEL",
            "LOG_FORMAT",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_server_config_defaults() {
        clean_test_env();

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.request_timeout, 15);
        assert_eq!(config.shutdown_timeout, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_server_config_from_env() {
        clean_test_env();
        env::set_var("SERVER_HOST", "127.0.0.1");
        env::set_var("SERVER_PORT", "3000");

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:3000");

        env::set_var("SERVER_PORT", "70000");
        assert!(ServerConfig::from_env().is_err());

        clean_test_env();
    }

    #[test]
    #[serial]
    fn test_logging_config_from_env() {
        clean_test_env();
        env::set_var("LOG_LEVEL", "DEBUG");
        env::set_var("LOG_FORMAT", "json");

        let config = LoggingConfig::from_env().unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.validate().is_ok());

        env::set_var("LOG_FORMAT", "xml");
        assert!(LoggingConfig::from_env().is_err());

        clean_test_env();
    }

    #[test]
    fn test_invalid_log_level() {
        let config = LoggingConfig {
            level: "verbose".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_app_config_default_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.config_sources().len(), 4);
    }
}
