#![allow(clippy::items_after_statements)]
#![allow(clippy::format_push_string)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::redundant_pattern_matching)]
#![allow(clippy::needless_borrows_for_generic_args)]
#![allow(clippy::unused_async)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::similar_names)]
#![allow(clippy::unreadable_literal)]
#![allow(clippy::unused_self)]
#![allow(dead_code)]
#![allow(unused_imports)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
//! # Memory Hunt Gateway
//!
//! The real-time game server behind a live scavenger-hunt/ARG session:
//! scanner clients (phones, kiosks, RFID readers) submit token scans over
//! HTTP or WebSocket, a Transaction Engine scores them against a token
//! catalog and the active session's team standings, and a Broadcast
//! Coordinator fans the resulting events back out to connected GM
//! dashboards, team displays, and the scanning devices themselves.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │         Scanner clients / GM dashboard / team displays           │
//! └───────────────────────────┬─────────────────────────────────────┘
//!                             │ HTTP + WebSocket
//!                             ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  memory-hunt-gateway (THIS CRATE)                 │
//! │                                                                  │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐           │
//! │  │   HTTP   │ │    WS    │ │  Admin   │ │ Broadcast │           │
//! │  │  Routes  │ │  Router  │ │ Commands │ │Coordinator│           │
//! │  └────┬─────┘ └────┬─────┘ └────┬─────┘ └────┬─────┘           │
//! │       └────────────┴─────┬──────┴────────────┘                  │
//! │                           ▼                                     │
//! │          Transaction Engine ──── Session Manager                │
//! │                │                       │                        │
//! │                ▼                       ▼                        │
//! │          Video Queue ──── VLC        Persistence Store           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod admin;
pub mod auth;
pub mod broadcast;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod offline;
pub mod persistence;
pub mod projector;
pub mod session;
pub mod state;
pub mod video;
pub mod vlc;
pub mod ws;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::{build, AppState, AppStateInner, StartupGate, StartupPhase};
