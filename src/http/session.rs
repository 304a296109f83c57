//! `/api/session` (§4.9/§6.1): read the current session, or (admin-only)
//! create one / change its status.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::session::SessionStatus;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/session", get(get_session).post(create_session))
        .route("/api/session/:id", put(update_session))
}

async fn get_session(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let session = state.sessions.current().await.ok_or(AppError::SessionNotFound)?;
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
struct CreateSessionBody {
    name: String,
    teams: Vec<String>,
}

async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateSessionBody>,
) -> AppResult<impl IntoResponse> {
    super::require_admin(&headers, &state.auth)?;
    for team in &body.teams {
        if !crate::catalog::is_valid_team_id(team) {
            return Err(AppError::Validation(format!("invalid team id: {team}")));
        }
    }
    let session = state.sessions.create_session(body.name, body.teams).await?;
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SessionStatusUpdate {
    Active,
    Paused,
    Ended,
}

#[derive(Debug, Deserialize)]
struct UpdateSessionBody {
    status: SessionStatusUpdate,
}

async fn update_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateSessionBody>,
) -> AppResult<impl IntoResponse> {
    super::require_admin(&headers, &state.auth)?;
    let session = state.sessions.current().await.ok_or(AppError::SessionNotFound)?;
    if session.id != id {
        return Err(AppError::SessionIdMismatch(id));
    }

    let updated = match body.status {
        SessionStatusUpdate::Active => state.sessions.update_status(&session.id, SessionStatus::Active).await?,
        SessionStatusUpdate::Paused => state.sessions.update_status(&session.id, SessionStatus::Paused).await?,
        SessionStatusUpdate::Ended => state.sessions.end_session(&session.id, "http admin").await?,
    };
    Ok(Json(updated))
}
