//! HTTP end-to-end tests (§8 scenarios S1-S4) driven against the real
//! `Router` via `tower::ServiceExt::oneshot`, no mock HTTP server.

use aln_orchestrator::config::VlcConfig;
use aln_orchestrator::{build, http, ws, Config};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_config(data_dir: &std::path::Path) -> Config {
    Config {
        data_dir: data_dir.to_string_lossy().to_string(),
        jwt_secret: "test-secret".into(),
        ..Config::default()
    }
}

const CATALOG: &str = r#"{
    "kaa001": {"memoryType": "Personal", "valueRating": 3, "group": ""},
    "clueA": {"memoryType": "Business", "valueRating": 2, "group": "clue (x2)"},
    "clueB": {"memoryType": "Business", "valueRating": 1, "group": "clue (x2)"}
}"#;

async fn test_app() -> (Router, String) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("tokens.json"), CATALOG).unwrap();

    let config = test_config(dir.path());
    let admin_password = config.admin.password.clone();

    // The broadcast coordinator only matters to WebSocket-connected
    // clients; these tests drive the HTTP API directly and don't need it.
    let (state, _coordinator) = build(config).await.unwrap();

    let app = Router::new()
        .merge(http::routes())
        .merge(ws::ws_routes())
        .with_state(state);
    (app, admin_password)
}

async fn admin_token(app: &Router, password: &str) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/auth")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "password": password }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&body).unwrap();
    value["token"].as_str().unwrap().to_string()
}

async fn create_session(app: &Router, token: &str, name: &str, teams: &[&str]) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/session")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {token}"))
                .body(Body::from(json!({ "name": name, "teams": teams }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

async fn scan(app: &Router, token_id: &str, team_id: &str, device_id: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/scan")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "tokenId": token_id, "teamId": team_id, "deviceId": device_id }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn s1_happy_scan_single_gm() {
    let (app, password) = test_app().await;
    let token = admin_token(&app, &password).await;
    create_session(&app, &token, "S1", &["001"]).await;

    let (status, body) = scan(&app, "kaa001", "001", "PLAYER_1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["points"], 1000);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/state").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let state: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(state["scores"]["001"]["currentScore"], 1000);
    assert_eq!(state["scores"]["001"]["tokensScanned"], 1);
}

#[tokio::test]
async fn s2_duplicate_per_device() {
    let (app, password) = test_app().await;
    let token = admin_token(&app, &password).await;
    create_session(&app, &token, "S2", &["001"]).await;

    let (first_status, first) = scan(&app, "kaa001", "001", "PLAYER_1").await;
    assert_eq!(first_status, StatusCode::OK);

    let (second_status, second) = scan(&app, "kaa001", "001", "PLAYER_1").await;
    assert_eq!(second_status, StatusCode::CONFLICT);
    assert_eq!(second["status"], "duplicate");
    assert_eq!(second["points"], 0);
    assert_eq!(second["originalTransactionId"], first["id"]);
}

#[tokio::test]
async fn s3_group_completion_bonus() {
    let (app, password) = test_app().await;
    let token = admin_token(&app, &password).await;
    create_session(&app, &token, "S3", &["001"]).await;

    scan(&app, "clueA", "001", "P1").await;
    let (_, second) = scan(&app, "clueB", "001", "P2").await;
    assert_eq!(second["status"], "accepted");

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/state").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let state: Value = serde_json::from_slice(&body).unwrap();
    let score = &state["scores"]["001"];
    assert_eq!(score["baseScore"], 1800);
    assert_eq!(score["bonusPoints"], 1800);
    assert_eq!(score["currentScore"], 3600);
    assert_eq!(score["completedGroups"][0], "clue");
}

#[tokio::test]
async fn s4_offline_batch_idempotency() {
    let (app, password) = test_app().await;
    let token = admin_token(&app, &password).await;
    create_session(&app, &token, "S4", &["001"]).await;

    let batch_body = json!({
        "batchId": "B1",
        "deviceId": "P1",
        "items": [{
            "tokenId": "kaa001",
            "teamId": "001",
            "deviceId": "P1",
            "deviceType": "player",
            "mode": "blackmarket",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }],
    });

    let first = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/scan/batch")
                .header("content-type", "application/json")
                .body(Body::from(batch_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first_body = axum::body::to_bytes(first.into_body(), usize::MAX).await.unwrap();
    let first_value: Value = serde_json::from_slice(&first_body).unwrap();

    let second = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/scan/batch")
                .header("content-type", "application/json")
                .body(Body::from(batch_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second_body = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();
    let second_value: Value = serde_json::from_slice(&second_body).unwrap();

    assert_eq!(first_value, second_value);
}

#[tokio::test]
async fn invalid_team_id_is_rejected() {
    let (app, password) = test_app().await;
    let token = admin_token(&app, &password).await;
    create_session(&app, &token, "S5", &["001"]).await;

    let (status, _) = scan(&app, "kaa001", "1", "PLAYER_1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_mutation_requires_admin_token() {
    let (app, _password) = test_app().await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/session")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "name": "S6", "teams": ["001"] }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// A minimal VLC HTTP stand-in: always reports itself as playing, so the
/// Video Queue's `start_front` sees a successful `play` call and settles
/// without ever touching a real VLC instance.
async fn spawn_mock_vlc() -> u16 {
    async fn status() -> impl IntoResponse {
        Json(json!({ "state": "playing", "time": 0.0, "length": 120.0 }))
    }

    let router = Router::new().route("/requests/status.json", get(status));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    port
}

#[tokio::test]
async fn s5_video_queue_serializes_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("tokens.json"),
        r#"{"vid001": {"memoryType": "Personal", "valueRating": 1, "group": "", "mediaAssets": {"video": "clip.mp4"}}}"#,
    )
    .unwrap();

    let vlc_port = spawn_mock_vlc().await;
    let mut config = test_config(dir.path());
    config.vlc = VlcConfig {
        host: "127.0.0.1".into(),
        port: vlc_port,
        password: String::new(),
    };
    let admin_password = config.admin.password.clone();
    let (state, _coordinator) = build(config).await.unwrap();
    let app = Router::new()
        .merge(http::routes())
        .merge(ws::ws_routes())
        .with_state(state);

    let token = admin_token(&app, &admin_password).await;
    create_session(&app, &token, "S5", &["001"]).await;

    let (status, transaction) = scan(&app, "vid001", "001", "PLAYER_1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(transaction["status"], "accepted");

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/state").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let game_state: Value = serde_json::from_slice(&body).unwrap();

    let queued = &game_state["videoQueue"][0];
    assert_eq!(queued["tokenId"], "vid001");
    assert_eq!(queued["filename"], "clip.mp4");
    assert_eq!(queued["state"], "playing");
}

#[tokio::test]
async fn s6_state_restore_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("tokens.json"), CATALOG).unwrap();
    let config = test_config(dir.path());
    let admin_password = config.admin.password.clone();

    let (state, _coordinator) = build(config.clone()).await.unwrap();
    let app = Router::new()
        .merge(http::routes())
        .merge(ws::ws_routes())
        .with_state(state);

    let token = admin_token(&app, &admin_password).await;
    create_session(&app, &token, "S6", &["001"]).await;
    scan(&app, "kaa001", "001", "PLAYER_1").await;

    // Simulate a process restart: a fresh `build` against the same
    // `data_dir`, with nothing in memory carried over.
    let (restarted_state, _coordinator) = build(config).await.unwrap();
    let restarted_app = Router::new()
        .merge(http::routes())
        .merge(ws::ws_routes())
        .with_state(restarted_state);

    let response = restarted_app
        .clone()
        .oneshot(Request::builder().uri("/api/state").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let game_state: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(game_state["name"], "S6");
    assert_eq!(game_state["scores"]["001"]["currentScore"], 1000);
    assert_eq!(game_state["scores"]["001"]["tokensScanned"], 1);
}

#[tokio::test]
async fn health_reports_catalog_and_startup_phase() {
    let (app, _password) = test_app().await;
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["status"], "ok");
    assert_eq!(value["catalogTokens"], 3);
}
