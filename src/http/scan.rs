//! `/api/scan` and `/api/scan/batch` (§4.9): the HTTP equivalent of the
//! WebSocket `transaction:submit`/offline-batch flow, for scanner clients
//! that would rather poll than hold a socket open.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::AppResult;
use crate::offline::BatchItem;
use crate::session::{DeviceType, ScanMode, ScanRequest, TransactionStatus};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/scan", post(scan))
        .route("/api/scan/batch", post(scan_batch))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanBody {
    token_id: String,
    #[serde(default)]
    team_id: Option<String>,
    device_id: String,
    #[serde(default = "default_device_type")]
    device_type: DeviceType,
    #[serde(default)]
    mode: ScanMode,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

fn default_device_type() -> DeviceType {
    DeviceType::Player
}

async fn scan(State(state): State<AppState>, Json(body): Json<ScanBody>) -> AppResult<impl IntoResponse> {
    if !crate::catalog::is_valid_token_id(&body.token_id) {
        return Err(crate::error::AppError::Validation(
            "tokenId must match ^[A-Za-z_0-9]{1,100}$".into(),
        ));
    }
    let team_id = body.team_id.unwrap_or_default();
    if !team_id.is_empty() && !crate::catalog::is_valid_team_id(&team_id) {
        return Err(crate::error::AppError::Validation("teamId must match ^[0-9]{3}$".into()));
    }

    let transaction = state
        .engine
        .process_scan(ScanRequest {
            token_id: body.token_id,
            team_id,
            device_id: body.device_id,
            device_type: body.device_type,
            mode: body.mode,
            timestamp: body.timestamp,
        })
        .await?;

    // §4.9: 200 for accepted/unknown, 409 for a duplicate scan — the
    // request succeeded, it's just not the first time for this token.
    let status = match transaction.status {
        TransactionStatus::Duplicate => StatusCode::CONFLICT,
        _ => StatusCode::OK,
    };
    Ok((status, Json(transaction)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanBatchBody {
    batch_id: String,
    device_id: String,
    items: Vec<BatchItem>,
}

async fn scan_batch(State(state): State<AppState>, Json(body): Json<ScanBatchBody>) -> AppResult<impl IntoResponse> {
    let result = state
        .offline
        .process_batch(&body.batch_id, &body.device_id, body.items)
        .await?;
    Ok(Json(result))
}
