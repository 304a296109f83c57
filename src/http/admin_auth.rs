//! `/api/admin/auth` (§6.1): exchanges the configured admin password for
//! a short-lived JWT used on every subsequent admin call.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/admin/auth", post(authenticate))
}

#[derive(Debug, Deserialize)]
struct AuthBody {
    password: String,
}

async fn authenticate(State(state): State<AppState>, Json(body): Json<AuthBody>) -> AppResult<impl IntoResponse> {
    if !state.auth.verify_admin_password(&body.password) {
        return Err(AppError::Unauthorized);
    }
    let token = state.auth.issue_admin_token()?;
    Ok(Json(serde_json::json!({ "token": token })))
}
