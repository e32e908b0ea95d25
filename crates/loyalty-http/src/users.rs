use axum::extract::State;
use axum::Json;
use loyalty_orm::User;

use crate::error::HttpError;
use crate::routes::AppState;

/// `GET /api/users/`: every user ordered by id
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, HttpError> {
    let users = state
        .users
        .list_users()
        .await
        .map_err(|e| HttpError::fetch("users", e))?;
    Ok(Json(users))
}
