//! `/api/state` and `/api/tokens` (§4.9): read-only projections of game
//! state and the token catalog.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::error::AppResult;
use crate::projector::StateProjector;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/tokens", get(get_tokens))
}

async fn get_state(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let session = state.sessions.current().await;
    let video_queue = state.video.snapshot().await;
    let vlc_connected = state.vlc.health().await;
    let game_state = StateProjector::project(session.as_ref(), video_queue, vlc_connected);
    Ok(Json(game_state))
}

async fn get_tokens(State(state): State<AppState>) -> impl IntoResponse {
    let tokens: Vec<_> = state.catalog.all().collect();
    Json(tokens)
}
