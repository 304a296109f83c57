//! ALN Orchestrator — real-time coordination server for a live
//! scavenger-hunt session: scanner clients submit token scans over HTTP
//! or WebSocket, the Transaction Engine scores them, and the Broadcast
//! Coordinator fans the results out to GM dashboards and team displays.
//!
//! ## Usage
//!
//! ```bash
//! # Start with layered defaults (config/default.toml, then ALN_* env vars)
//! aln-orchestrator
//!
//! # Start from an explicit config file
//! aln-orchestrator --config ./config/production.toml
//!
//! # With debug logging
//! RUST_LOG=debug aln-orchestrator
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use aln_orchestrator::state::StartupPhase;
use aln_orchestrator::{build, http, ws, Config};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

fn explicit_config_path() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("aln_orchestrator=info".parse()?),
        )
        .init();

    let config = Config::load(explicit_config_path().as_deref())?;
    let port = config.port;
    let cors_origins = config.cors.origins.clone();

    let (state, mut coordinator) = build(config).await?;

    spawn_background_tasks(state.clone());

    state.startup.require_at_least(StartupPhase::HandlersReady);

    let cors = if cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<axum::http::HeaderValue> = cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let app = axum::Router::new()
        .merge(http::routes())
        .merge(ws::ws_routes())
        .with_state(state.clone())
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "ALN orchestrator listening");

    state.startup.advance_to(StartupPhase::Listening);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    coordinator.cleanup();
    info!("ALN orchestrator shut down cleanly");
    Ok(())
}

/// §5/§11: heartbeat sweep, session auto-timeout, and the video queue's
/// progress poll all run as periodic background ticks rather than being
/// driven by an inbound request.
fn spawn_background_tasks(state: aln_orchestrator::AppState) {
    let heartbeat_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            let Some(session) = heartbeat_state.sessions.current().await else {
                continue;
            };
            let stale = heartbeat_state
                .sessions
                .stale_devices(&session.id, chrono::Duration::seconds(30))
                .await;
            for device_id in stale {
                warn!(%device_id, "device heartbeat stale");
            }
        }
    });

    let timeout_state = state.clone();
    let timeout_ms = timeout_state.config.session.timeout_ms;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let Some(session) = timeout_state.sessions.current().await else {
                continue;
            };
            if !session.is_active_or_paused() {
                continue;
            }
            let age = chrono::Utc::now() - session.start_time;
            if age > chrono::Duration::milliseconds(timeout_ms as i64) {
                info!(session_id = %session.id, "session exceeded timeout, ending");
                if let Err(e) = timeout_state.sessions.end_session(&session.id, "timeout").await {
                    warn!(error = %e, "failed to auto-end timed-out session");
                }
            }
        }
    });

    let video_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(500));
        loop {
            interval.tick().await;
            video_state.video.poll_progress().await;
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
