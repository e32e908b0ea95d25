use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Create a validation failed error
    pub fn validation_failed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Longest identifier PostgreSQL keeps without truncation.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Check that `name` is a plain, unquoted SQL identifier.
///
/// Table names are interpolated into DDL, so anything outside
/// `[A-Za-z_][A-Za-z0-9_]*` is refused.
pub fn validate_identifier(field: &str, name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let starts_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !starts_ok || !rest_ok {
        return Err(ConfigError::invalid_value(
            field,
            name,
            "an identifier matching [A-Za-z_][A-Za-z0-9_]*",
        ));
    }

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(ConfigError::validation_failed(
            field,
            format!("identifier is longer than {} bytes", MAX_IDENTIFIER_LEN),
        ));
    }

    Ok(())
}
