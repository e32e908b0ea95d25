//! # loyalty-http: HTTP server for the coffee loyalty backend
//!
//! Exposes a readiness probe on `/health` and the user listing on
//! `/api/users/`, on top of axum with request tracing and timeouts.

pub mod error;
pub mod health;
pub mod routes;
pub mod server;
pub mod users;

pub use error::{HttpError, HttpResult};
pub use health::HealthProbe;
pub use routes::{router, AppState};
pub use server::{bind, serve, serve_with_shutdown, shutdown_signal};
