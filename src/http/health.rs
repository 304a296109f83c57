//! `/health` (§6.1): the startup self-check used by orchestrators and the
//! GM dashboard's connection banner alike (§11).

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthBody {
    status: &'static str,
    startup_phase: &'static str,
    catalog_tokens: usize,
    session_restored: bool,
    vlc_connected: bool,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let vlc_connected = state.vlc.health().await;
    let session_restored = state.sessions.current().await.is_some();
    let startup_phase = state.startup.phase_name();

    let status = if state.catalog.is_empty() {
        "degraded"
    } else {
        "ok"
    };

    Json(HealthBody {
        status,
        startup_phase,
        catalog_tokens: state.catalog.len(),
        session_restored,
        vlc_connected,
    })
}
