//! Router and shared handler state

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use loyalty_core::config::ServerConfig;
use loyalty_orm::UserStore;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::health::{health_check, HealthProbe};
use crate::users::list_users;

/// Collaborators the handlers need
#[derive(Clone)]
pub struct AppState {
    pub health: Arc<dyn HealthProbe>,
    pub users: Arc<dyn UserStore>,
}

impl AppState {
    pub fn new(health: Arc<dyn HealthProbe>, users: Arc<dyn UserStore>) -> Self {
        Self { health, users }
    }
}

/// Build the application router with request tracing and a per-request timeout
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/users", get(list_users))
        .route("/api/users/", get(list_users))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout))),
        )
        .with_state(state)
}
