//! Connection handshake and inbound event loop (§4.7). Grounded on the
//! teacher's `ws_handler`/`handle_socket` axum wiring, generalized with
//! the writer-task/`mpsc`/`select!` heartbeat-and-idle-timeout loop other
//! examples in the pack use for long-lived WebSocket connections.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::admin::AdminCommand;
use crate::session::{DeviceConnection, DeviceType, ScanMode, ScanRequest};
use crate::state::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(15);
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const OUTBOUND_CAPACITY: usize = 1024;
/// RFC 6455 policy-violation close code, used when a socket fails the
/// §4.7 handshake (missing/invalid token, disallowed `deviceType`).
const CLOSE_POLICY_VIOLATION: u16 = 1008;

pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsQuery {
    device_id: String,
    #[serde(default = "default_device_type")]
    device_type: DeviceType,
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    /// Required: the WebSocket Router only admits `gm`/`admin` devices
    /// (§4.7), so every connection must present a valid admin JWT.
    #[serde(default)]
    token: Option<String>,
}

fn default_device_type() -> DeviceType {
    DeviceType::Player
}

async fn ws_upgrade(State(state): State<AppState>, Query(q): Query<WsQuery>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, q, socket))
}

async fn handle_socket(state: AppState, q: WsQuery, socket: WebSocket) {
    let span = tracing::info_span!("ws_connection", device_id = %q.device_id, device_type = ?q.device_type);
    let _enter = span.enter();

    // §4.7: the WebSocket Router only admits `gm`/`admin` devices, and
    // failure rejects the connection with a transport-level error — no
    // application events (not even `sync:full`) are ever sent.
    if q.device_type == DeviceType::Player {
        tracing::info!("connection rejected: websocket restricted to gm/admin devices");
        reject(socket, "websocket restricted to gm/admin devices").await;
        return;
    }
    let Some(token) = q.token.as_deref() else {
        tracing::info!("connection rejected: missing auth token");
        reject(socket, "missing auth token").await;
        return;
    };
    if state.auth.verify(token).is_err() {
        tracing::info!("connection rejected: invalid auth token");
        reject(socket, "invalid auth token").await;
        return;
    }
    let is_gm = true;

    let Some(session) = state.sessions.current().await else {
        tracing::info!("connection rejected: no active session");
        reject(socket, "no active session").await;
        return;
    };

    let is_reconnection = session.connected_devices.contains_key(&q.device_id);
    let device = DeviceConnection {
        id: q.device_id.clone(),
        device_type: q.device_type,
        name: q.name.clone(),
        version: q.version.clone(),
        ip_address: String::new(),
        connection_time: chrono::Utc::now(),
        last_heartbeat: chrono::Utc::now(),
        disconnection_time: None,
        socket_id: Some(uuid::Uuid::new_v4().to_string()),
    };
    if let Err(e) = state.sessions.upsert_device(&session.id, device).await {
        tracing::warn!(error = %e, "failed to register device");
    }

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    // §4.7 post-connection sequence: join rooms, then send sync:full.
    let mut room_tasks = Vec::new();
    let rooms = vec![format!("device:{}", q.device_id), "gm".to_string()];
    for room in rooms {
        room_tasks.push(spawn_room_forwarder(state.rooms.clone(), room, out_tx.clone()));
    }

    send_sync_full(&state, &out_tx, is_reconnection, &q.device_id).await;

    let mut last_rx = Instant::now();
    let mut ping_tick = tokio::time::interval(PING_INTERVAL);

    loop {
        tokio::select! {
            _ = ping_tick.tick() => {
                if out_tx.try_send(Message::Ping(Vec::new())).is_err() {
                    break;
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        last_rx = Instant::now();
                        handle_inbound(&state, &q, is_gm, &text, &out_tx).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = out_tx.try_send(Message::Pong(data));
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Binary(_))) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "websocket error");
                        break;
                    }
                }
            }
            _ = tokio::time::sleep_until(last_rx + IDLE_TIMEOUT) => {
                tracing::info!("idle timeout; closing connection");
                break;
            }
        }
    }

    for task in room_tasks {
        task.abort();
    }
    writer.abort();
    if let Err(e) = state
        .sessions
        .mark_device_disconnected(&session.id, &q.device_id, "socket closed")
        .await
    {
        tracing::debug!(error = %e, "device disconnect bookkeeping skipped (session likely ended)");
    }
}

/// Closes a socket that failed the handshake gate, without ever reaching
/// room registration or `sync:full`.
async fn reject(mut socket: WebSocket, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_POLICY_VIOLATION,
            reason: reason.into(),
        })))
        .await;
}

fn spawn_room_forwarder(
    rooms: Arc<crate::broadcast::Rooms>,
    room: String,
    out_tx: mpsc::Sender<Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut receiver = rooms.subscribe(&room);
        loop {
            match receiver.recv().await {
                Ok(payload) => {
                    if out_tx.send(text_message(&payload)).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn send_sync_full(state: &AppState, out_tx: &mpsc::Sender<Message>, reconnection: bool, device_id: &str) {
    let session = state.sessions.current().await;
    let video_queue = state.video.snapshot().await;
    let vlc_connected = state.vlc.health().await;
    let game_state = crate::projector::StateProjector::project(session.as_ref(), video_queue, vlc_connected);

    let device_scanned_tokens = session
        .as_ref()
        .map(|s| s.device_scanned_tokens(device_id))
        .unwrap_or_default();

    let payload = serde_json::json!({
        "event": "sync:full",
        "data": {
            "state": game_state,
            "deviceScannedTokens": device_scanned_tokens,
            "reconnection": reconnection,
        },
        "timestamp": chrono::Utc::now(),
    });
    let _ = out_tx.send(text_message(&payload)).await;
}

async fn handle_inbound(state: &AppState, q: &WsQuery, is_gm: bool, text: &str, out_tx: &mpsc::Sender<Message>) {
    #[derive(Deserialize)]
    struct Envelope {
        event: String,
        #[serde(default)]
        data: Value,
    }

    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(e) => {
            send_error(out_tx, &crate::error::AppError::Validation(e.to_string())).await;
            return;
        }
    };

    match envelope.event.as_str() {
        "transaction:submit" => handle_transaction_submit(state, q, envelope.data, out_tx).await,
        "gm:command" => handle_gm_command(state, is_gm, envelope.data, out_tx).await,
        "sync:request" => {
            let reconnection = false;
            send_sync_full(state, out_tx, reconnection, &q.device_id).await;
        }
        "heartbeat" => {
            if let Some(session) = state.sessions.current().await {
                let _ = state.sessions.touch_heartbeat(&session.id, &q.device_id).await;
            }
        }
        // Legacy clients send this during handshake; modern handshake happens
        // entirely via query params, so it's a deliberate no-op.
        "gm:identify" => {}
        other => {
            tracing::debug!(event = other, "unrecognized inbound event");
        }
    }
}

async fn handle_transaction_submit(state: &AppState, q: &WsQuery, data: Value, out_tx: &mpsc::Sender<Message>) {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Submit {
        token_id: String,
        team_id: String,
        #[serde(default)]
        mode: ScanMode,
    }

    let submit: Submit = match serde_json::from_value(data) {
        Ok(s) => s,
        Err(e) => {
            send_error(out_tx, &crate::error::AppError::Validation(e.to_string())).await;
            return;
        }
    };

    let result = state
        .engine
        .process_scan(ScanRequest {
            token_id: submit.token_id,
            team_id: submit.team_id,
            device_id: q.device_id.clone(),
            device_type: q.device_type,
            mode: submit.mode,
            timestamp: None,
        })
        .await;

    match result {
        Ok(transaction) => {
            let payload = serde_json::json!({
                "event": "transaction:result",
                "data": transaction,
                "timestamp": chrono::Utc::now(),
            });
            let _ = out_tx.send(text_message(&payload)).await;
        }
        Err(e) => send_error(out_tx, &e.into()).await,
    }
}

async fn handle_gm_command(state: &AppState, is_gm: bool, data: Value, out_tx: &mpsc::Sender<Message>) {
    if !is_gm {
        send_error(out_tx, &crate::error::AppError::Unauthorized).await;
        return;
    }
    let command: AdminCommand = match serde_json::from_value(data) {
        Ok(c) => c,
        Err(e) => {
            send_error(out_tx, &crate::error::AppError::Validation(e.to_string())).await;
            return;
        }
    };

    match state.admin.handle(command).await {
        Ok(ack) => {
            let payload = serde_json::json!({
                "event": "gm:command:ack",
                "data": ack,
                "timestamp": chrono::Utc::now(),
            });
            let _ = out_tx.send(text_message(&payload)).await;
        }
        Err(e) => send_error(out_tx, &e).await,
    }
}

async fn send_error(out_tx: &mpsc::Sender<Message>, error: &crate::error::AppError) {
    let payload = serde_json::json!({
        "event": "error",
        "data": error.as_ws_event(),
        "timestamp": chrono::Utc::now(),
    });
    let _ = out_tx.send(text_message(&payload)).await;
}

fn text_message(value: &Value) -> Message {
    Message::Text(value.to_string().into())
}
