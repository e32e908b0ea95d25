//! Environment lookups shared by the configuration structs.
//!
//! An empty variable counts as unset, so `DB_HOST=` falls back to the default.

use std::env;
use std::str::FromStr;

use super::validation::ConfigError;

/// Configuration source information for debugging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    EnvVar(String),
    Default(String),
    Nested,
}

fn lookup(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

pub(crate) fn env_or_default(key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_string())
}

/// Parse an optional variable, failing loudly on a present but malformed value.
pub(crate) fn env_parse_or_default<T: FromStr>(
    key: &str,
    default: T,
    expected: &str,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::invalid_value(key, raw.as_str(), expected)),
        None => Ok(default),
    }
}

pub(crate) fn source_of(key: &str, default: impl ToString) -> ConfigSource {
    match lookup(key) {
        Some(_) => ConfigSource::EnvVar(key.to_string()),
        None => ConfigSource::Default(default.to_string()),
    }
}
