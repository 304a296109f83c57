//! Shared application state (SPEC_FULL §9 startup state machine).
//!
//! `AppState` wires every component together behind a single `Arc` so
//! axum handlers clone it cheaply via the `State` extractor, the same
//! shape the teacher's `SharedState = Arc<GatewayState>` used — just with
//! the SX9 backend fields replaced by this system's own components.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::admin::AdminCommandHandler;
use crate::auth::AuthService;
use crate::broadcast::{BroadcastCoordinator, Rooms};
use crate::catalog::TokenCatalog;
use crate::config::Config;
use crate::events::EventBus;
use crate::offline::OfflineBatchHandler;
use crate::persistence::PersistenceStore;
use crate::session::{SessionManager, TransactionEngine};
use crate::video::VideoQueue;
use crate::vlc::VlcClient;

/// Startup proceeds in strict order; constructing handlers before
/// services are ready, or serving traffic before handlers are wired, is
/// a programming error, not a runtime condition callers should handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StartupPhase {
    Uninitialized = 0,
    ServicesReady = 1,
    HandlersReady = 2,
    Listening = 3,
}

pub struct StartupGate {
    phase: AtomicU8,
}

impl StartupGate {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(StartupPhase::Uninitialized as u8),
        }
    }

    pub fn advance_to(&self, phase: StartupPhase) {
        let current = self.phase.load(Ordering::SeqCst);
        assert!(
            phase as u8 == current + 1,
            "startup phases must advance in order: at {current}, requested {phase:?}"
        );
        self.phase.store(phase as u8, Ordering::SeqCst);
    }

    pub fn require_at_least(&self, phase: StartupPhase) {
        let current = self.phase.load(Ordering::SeqCst);
        assert!(
            current >= phase as u8,
            "operation requires startup phase {phase:?}, but gateway is at phase {current}"
        );
    }

    /// `/health`'s machine-readable phase name (§6.1).
    pub fn phase_name(&self) -> &'static str {
        match self.phase.load(Ordering::SeqCst) {
            0 => "uninitialized",
            1 => "services_ready",
            2 => "handlers_ready",
            _ => "listening",
        }
    }
}

impl Default for StartupGate {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AppStateInner {
    pub config: Config,
    pub catalog: Arc<TokenCatalog>,
    pub store: Arc<PersistenceStore>,
    pub events: Arc<EventBus>,
    pub sessions: Arc<SessionManager>,
    pub engine: Arc<TransactionEngine>,
    pub video: Arc<VideoQueue>,
    pub vlc: Arc<VlcClient>,
    pub auth: Arc<AuthService>,
    pub offline: Arc<OfflineBatchHandler>,
    pub admin: Arc<AdminCommandHandler>,
    pub rooms: Arc<Rooms>,
    pub startup: StartupGate,
}

pub type AppState = Arc<AppStateInner>;

/// Builds every component in dependency order (§9 `SERVICES_READY`), then
/// the handlers that close over them (`HANDLERS_READY`). The caller binds
/// the listener and transitions to `LISTENING` once `axum::serve` starts.
pub async fn build(config: Config) -> anyhow::Result<(AppState, BroadcastCoordinator)> {
    let startup = StartupGate::new();

    let catalog = Arc::new(TokenCatalog::load_from_file(&format!("{}/tokens.json", config.data_dir))?);
    let store = Arc::new(PersistenceStore::new(&config.data_dir)?);
    let events = Arc::new(EventBus::new());
    let sessions = Arc::new(SessionManager::new(store.clone(), events.clone()));
    sessions.restore().await?;

    let vlc = Arc::new(VlcClient::new(&config.vlc.host, config.vlc.port, config.vlc.password.clone()));
    let video = Arc::new(VideoQueue::with_vlc(events.clone(), vlc.clone()));
    let engine = Arc::new(TransactionEngine::new(
        catalog.clone(),
        sessions.clone(),
        video.clone(),
        events.clone(),
    ));
    let auth = Arc::new(AuthService::new(&config.jwt_secret, &config.admin.password)?);
    let offline = Arc::new(OfflineBatchHandler::new(engine.clone(), events.clone(), &config.offline_queue));
    let admin = Arc::new(AdminCommandHandler::new(sessions.clone(), engine.clone(), video.clone()));
    let rooms = Arc::new(Rooms::new());

    startup.advance_to(StartupPhase::ServicesReady);

    let coordinator = BroadcastCoordinator::spawn(events.clone(), rooms.clone())
        .map_err(|e| anyhow::anyhow!("broadcast coordinator failed to start: {e}"))?;

    startup.advance_to(StartupPhase::HandlersReady);

    let state = Arc::new(AppStateInner {
        config,
        catalog,
        store,
        events,
        sessions,
        engine,
        video,
        vlc,
        auth,
        offline,
        admin,
        rooms,
        startup,
    });

    Ok((state, coordinator))
}
