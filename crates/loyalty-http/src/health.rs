//! Readiness endpoint

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use loyalty_orm::{ConnectionManager, DatabaseResult};

use crate::error::HttpError;
use crate::routes::AppState;

/// Something that can tell whether the service is ready to take traffic
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> DatabaseResult<()>;
}

#[async_trait]
impl<T: ConnectionManager> HealthProbe for T {
    async fn check(&self) -> DatabaseResult<()> {
        self.ping().await
    }
}

/// `GET /health`: `200 OK` while the database answers, `503` otherwise
pub async fn health_check(State(state): State<AppState>) -> Result<(StatusCode, &'static str), HttpError> {
    state.health.check().await.map_err(HttpError::Unavailable)?;
    Ok((StatusCode::OK, "OK"))
}
