//! State Projector (§4.6): builds the read-only `GameState` snapshot
//! (§3.7) used by `sync:full`, `/api/state`, and the admin dashboard. Pure
//! with respect to its inputs — it never mutates session, video, or VLC
//! state, only reads them.

use serde::Serialize;
use std::collections::HashMap;

use crate::session::{DeviceConnection, Session, TeamScore, Transaction};
use crate::video::VideoQueueItem;

const RECENT_TRANSACTIONS_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub vlc_connected: bool,
    pub session_active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub session_id: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub teams: Vec<String>,
    pub scores: HashMap<String, TeamScore>,
    pub recent_transactions: Vec<Transaction>,
    pub connected_devices: HashMap<String, DeviceConnection>,
    pub video_queue: Vec<VideoQueueItem>,
    pub system_status: SystemStatus,
}

pub struct StateProjector;

impl StateProjector {
    /// Builds a `GameState` from the current session (if any), the video
    /// queue, and a VLC health flag the caller has already checked — the
    /// projector itself makes no network calls.
    pub fn project(session: Option<&Session>, video_queue: Vec<VideoQueueItem>, vlc_connected: bool) -> GameState {
        match session {
            Some(session) => GameState {
                session_id: Some(session.id.clone()),
                name: Some(session.name.clone()),
                status: Some(format!("{:?}", session.status).to_lowercase()),
                teams: session.teams.clone(),
                scores: session.scores.clone(),
                recent_transactions: session.recent_transactions(RECENT_TRANSACTIONS_LIMIT),
                connected_devices: session.connected_devices.clone(),
                video_queue,
                system_status: SystemStatus {
                    vlc_connected,
                    session_active: session.is_active_or_paused(),
                },
            },
            None => GameState {
                session_id: None,
                name: None,
                status: None,
                teams: Vec::new(),
                scores: HashMap::new(),
                recent_transactions: Vec::new(),
                connected_devices: HashMap::new(),
                video_queue,
                system_status: SystemStatus {
                    vlc_connected,
                    session_active: false,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStatus;

    #[test]
    fn no_session_yields_empty_state() {
        let state = StateProjector::project(None, Vec::new(), false);
        assert!(state.session_id.is_none());
        assert!(!state.system_status.session_active);
    }

    #[test]
    fn active_session_reports_lowercase_status() {
        let session = Session::new("s1".into(), "Game Night".into(), vec!["001".into()]);
        assert_eq!(session.status, SessionStatus::Active);
        let state = StateProjector::project(Some(&session), Vec::new(), true);
        assert_eq!(state.status.as_deref(), Some("active"));
        assert!(state.system_status.session_active);
    }
}
