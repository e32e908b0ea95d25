//! HTTP server error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use loyalty_orm::DatabaseError;
use thiserror::Error;
use tracing::{error, warn};

/// Result type for HTTP operations
pub type HttpResult<T> = Result<T, HttpError>;

/// HTTP server errors
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Server startup failed: {message}")]
    StartupFailed { message: String },

    #[error("Server error: {message}")]
    ServerFailed { message: String },

    #[error("Server did not drain within {seconds}s and was forced to shut down")]
    ShutdownTimedOut { seconds: u64 },

    #[error("Database unavailable: {0}")]
    Unavailable(#[source] DatabaseError),

    #[error("Error fetching {resource}: {source}")]
    Fetch {
        resource: &'static str,
        #[source]
        source: DatabaseError,
    },
}

impl HttpError {
    /// Create a startup error
    pub fn startup<T: Into<String>>(message: T) -> Self {
        HttpError::StartupFailed {
            message: message.into(),
        }
    }

    /// Create a server error
    pub fn server<T: Into<String>>(message: T) -> Self {
        HttpError::ServerFailed {
            message: message.into(),
        }
    }

    pub fn fetch(resource: &'static str, source: DatabaseError) -> Self {
        HttpError::Fetch { resource, source }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            HttpError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body shown to clients; database details stay in the logs
    pub fn public_message(&self) -> String {
        match self {
            HttpError::Unavailable(_) => "database unavailable".to_string(),
            HttpError::Fetch { resource, .. } => format!("Error fetching {}", resource),
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!("{}", self);
        } else {
            warn!("{}", self);
        }

        (status, self.public_message()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let unavailable = HttpError::Unavailable(DatabaseError::Connection("refused".to_string()));
        assert_eq!(unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(unavailable.public_message(), "database unavailable");

        let fetch = HttpError::fetch("users", DatabaseError::Query("boom".to_string()));
        assert_eq!(fetch.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fetch.public_message(), "Error fetching users");
        assert!(fetch.to_string().contains("boom"));
    }

    #[test]
    fn test_public_message_hides_details() {
        let err = HttpError::fetch(
            "users",
            DatabaseError::Query("password authentication failed for user \"postgres\"".to_string()),
        );
        assert!(!err.public_message().contains("password"));
    }
}
