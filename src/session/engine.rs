//! Transaction Engine (§4.4): turns a raw scan into a scored, persisted
//! `Transaction`, applying the duplicate check, mode gating, scoring math,
//! and group-completion bonus in one atomic step.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::catalog::{MemoryType, TokenCatalog};
use crate::events::{DomainEvent, EventBus};
use crate::video::VideoQueue;

use super::manager::SessionManager;
use super::types::{DeviceType, ScanMode, Session, SessionStatus, TeamScore, Transaction, TransactionStatus};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no active session")]
    NoActiveSession,
    #[error(transparent)]
    Session(#[from] super::manager::SessionError),
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub token_id: String,
    pub team_id: String,
    pub device_id: String,
    pub device_type: DeviceType,
    pub mode: ScanMode,
    /// Overrides `Utc::now()` for offline-batch replay (§4.10), which must
    /// preserve the timestamp the client originally submitted with.
    pub timestamp: Option<DateTime<Utc>>,
}

enum TxOutcome {
    Duplicate(Transaction),
    Recorded {
        transaction: Transaction,
        score_update: Option<TeamScore>,
        group_bonus: Option<(String, i64)>,
        video_filename: Option<String>,
    },
}

pub struct TransactionEngine {
    catalog: Arc<TokenCatalog>,
    sessions: Arc<SessionManager>,
    video: Arc<VideoQueue>,
    events: Arc<EventBus>,
}

impl TransactionEngine {
    pub fn new(
        catalog: Arc<TokenCatalog>,
        sessions: Arc<SessionManager>,
        video: Arc<VideoQueue>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            catalog,
            sessions,
            video,
            events,
        }
    }

    /// §4.4 steps 1–9. Returns the persisted `Transaction`, or
    /// `EngineError::NoActiveSession` (mapped to HTTP 503 / WS error by the
    /// caller) if there is nothing to scan against.
    pub async fn process_scan(&self, req: ScanRequest) -> Result<Transaction, EngineError> {
        let session = self.sessions.current().await.ok_or(EngineError::NoActiveSession)?;
        if session.status != SessionStatus::Active {
            return Err(EngineError::NoActiveSession);
        }
        let session_id = session.id.clone();

        let catalog = self.catalog.clone();
        let outcome = self
            .sessions
            .with_session_mut(&session_id, move |session| build_transaction(session, &catalog, req))
            .await?;

        match outcome {
            TxOutcome::Duplicate(transaction) => {
                self.events.emit(DomainEvent::TransactionAdded {
                    transaction: transaction.clone(),
                });
                Ok(transaction)
            }
            TxOutcome::Recorded {
                transaction,
                score_update,
                group_bonus,
                video_filename,
            } => {
                self.events.emit(DomainEvent::TransactionAdded {
                    transaction: transaction.clone(),
                });
                if let Some(score) = score_update {
                    self.events.emit(DomainEvent::ScoreUpdated { score });
                }
                if let Some((group, bonus_points)) = group_bonus {
                    self.events.emit(DomainEvent::GroupCompleted {
                        team_id: transaction.team_id.clone(),
                        group,
                        bonus_points,
                    });
                }
                if let Some(filename) = video_filename {
                    self.video.enqueue(transaction.token_id.clone(), filename).await;
                }
                Ok(transaction)
            }
        }
    }
}

/// Steps 2–7, run under the Session Manager's write lock so the duplicate
/// check and the append are indivisible. Pure apart from mutating
/// `session` and allocating ids/timestamps.
fn build_transaction(session: &mut Session, catalog: &TokenCatalog, req: ScanRequest) -> TxOutcome {
    let timestamp = req.timestamp.unwrap_or_else(Utc::now);

    // Step 2: duplicate check — same device, same token, already accepted.
    // Per the resolved open question (SPEC_FULL §12), a detective-mode scan
    // still consumes the device's one-shot slot for that token.
    if let Some(first) = session.first_transaction_for(&req.device_id, &req.token_id) {
        let duplicate = Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            token_id: req.token_id,
            team_id: req.team_id,
            device_id: req.device_id,
            device_type: req.device_type,
            mode: req.mode,
            status: TransactionStatus::Duplicate,
            points: 0,
            timestamp,
            memory_type: first.memory_type,
            value_rating: first.value_rating,
            group: first.group.clone(),
            is_unknown: first.is_unknown,
            original_transaction_id: Some(first.id.clone()),
        };
        session.transactions.push(duplicate.clone());
        return TxOutcome::Duplicate(duplicate);
    }

    // Step 3: token lookup.
    let token = catalog.get(&req.token_id);
    let (memory_type, value_rating, group, is_unknown, token_value, video_asset) = match token {
        Some(t) => (
            t.memory_type,
            t.value_rating,
            t.group.clone(),
            false,
            t.token_value(),
            t.media_assets.video.clone(),
        ),
        None => (MemoryType::Unknown, None, String::new(), true, 0, None),
    };
    let status = if token.is_none() {
        TransactionStatus::Unknown
    } else {
        TransactionStatus::Accepted
    };

    // Step 4/5: mode gating and scoring. Detective mode records the scan
    // for group-completion purposes but never awards points.
    let points: i64 = match (status, req.mode) {
        (TransactionStatus::Accepted, ScanMode::Detective) => 0,
        (TransactionStatus::Accepted, ScanMode::Blackmarket) => token_value as i64,
        _ => 0,
    };

    let transaction = Transaction {
        id: uuid::Uuid::new_v4().to_string(),
        token_id: req.token_id.clone(),
        team_id: req.team_id.clone(),
        device_id: req.device_id.clone(),
        device_type: req.device_type,
        mode: req.mode,
        status,
        points,
        timestamp,
        memory_type,
        value_rating,
        group: group.clone(),
        is_unknown,
        original_transaction_id: None,
    };

    if status == TransactionStatus::Accepted {
        session
            .scanned_tokens_by_device
            .entry(req.device_id.clone())
            .or_default()
            .insert(req.token_id.clone());
    }
    session.transactions.push(transaction.clone());

    // Team scores are lazily created the first time a team is referenced
    // at all, accepted or not, so GM views can show a zero-score row for
    // an as-yet-unseen team (SPEC_FULL §12 open-question resolution).
    session
        .scores
        .entry(req.team_id.clone())
        .or_insert_with(|| TeamScore::new(req.team_id.clone()));
    if !session.teams.iter().any(|t| t == &req.team_id) {
        session.teams.push(req.team_id.clone());
    }

    if status != TransactionStatus::Accepted {
        return TxOutcome::Recorded {
            transaction,
            score_update: None,
            group_bonus: None,
            video_filename: None,
        };
    }

    // Step 7: group completion. Counted off the denormalized `group`
    // string on each accepted transaction, independent of scan mode — a
    // detective-mode team still completes the set, it just scores zero
    // base points for doing so.
    let group_spec = catalog.get(&req.token_id).and_then(|t| t.group_spec());
    let mut group_completed_now = false;
    let mut group_total_value: i64 = 0;

    if let Some(spec) = &group_spec {
        let scanned_in_group = session
            .transactions
            .iter()
            .filter(|t| {
                t.team_id == req.team_id
                    && t.status == TransactionStatus::Accepted
                    && catalog
                        .get(&t.token_id)
                        .and_then(|tok| tok.group_spec())
                        .map(|g| g.name == spec.name)
                        .unwrap_or(false)
            })
            .map(|t| t.token_id.clone())
            .collect::<std::collections::HashSet<_>>()
            .len() as u32;

        if scanned_in_group == spec.size {
            group_completed_now = true;
            group_total_value = catalog
                .all()
                .filter(|t| t.group_spec().map(|g| g.name == spec.name).unwrap_or(false))
                .map(|t| t.token_value() as i64)
                .sum();
        }
    }

    let score = session
        .scores
        .get_mut(&req.team_id)
        .expect("score entry created above");
    let group_bonus = score.apply_transaction(
        points,
        group_spec.as_ref().map(|g| g.name.as_str()),
        group_completed_now,
        group_spec.as_ref().map(|g| g.size).unwrap_or(0),
        group_total_value,
    );
    let score_snapshot = score.clone();

    TxOutcome::Recorded {
        transaction,
        score_update: Some(score_snapshot),
        group_bonus: group_bonus.map(|bonus| (group_spec.unwrap().name, bonus)),
        video_filename: video_asset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::PersistenceStore;

    async fn harness() -> (TransactionEngine, Arc<SessionManager>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PersistenceStore::new(dir.path()).unwrap());
        let events = Arc::new(EventBus::new());
        let sessions = Arc::new(SessionManager::new(store, events.clone()));
        let catalog = Arc::new(
            TokenCatalog::load_from_str(
                r#"{
                    "a": {"memoryType": "Personal", "valueRating": 3, "group": "clue (x2)"},
                    "b": {"memoryType": "Business", "valueRating": 1, "group": "clue (x2)"}
                }"#,
            )
            .unwrap(),
        );
        let video = Arc::new(VideoQueue::new(events.clone()));
        let engine = TransactionEngine::new(catalog, sessions.clone(), video, events);
        (engine, sessions)
    }

    fn scan(token: &str, team: &str, device: &str) -> ScanRequest {
        ScanRequest {
            token_id: token.into(),
            team_id: team.into(),
            device_id: device.into(),
            device_type: DeviceType::Player,
            mode: ScanMode::Blackmarket,
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn no_active_session_is_rejected() {
        let (engine, _sessions) = harness().await;
        let err = engine.process_scan(scan("a", "001", "d1")).await.unwrap_err();
        assert!(matches!(err, EngineError::NoActiveSession));
    }

    #[tokio::test]
    async fn first_scan_accepted_second_scan_duplicate() {
        let (engine, sessions) = harness().await;
        sessions.create_session("S1".into(), vec!["001".into()]).await.unwrap();

        let first = engine.process_scan(scan("a", "001", "d1")).await.unwrap();
        assert_eq!(first.status, TransactionStatus::Accepted);
        assert_eq!(first.points, 1000);

        let second = engine.process_scan(scan("a", "001", "d1")).await.unwrap();
        assert_eq!(second.status, TransactionStatus::Duplicate);
        assert_eq!(second.points, 0);
    }

    #[tokio::test]
    async fn unknown_token_scores_zero_but_is_recorded() {
        let (engine, sessions) = harness().await;
        sessions.create_session("S1".into(), vec!["001".into()]).await.unwrap();

        let tx = engine.process_scan(scan("ghost", "001", "d1")).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Unknown);
        assert_eq!(tx.points, 0);
    }

    #[tokio::test]
    async fn group_completion_awards_bonus_exactly_once() {
        let (engine, sessions) = harness().await;
        sessions.create_session("S1".into(), vec!["001".into()]).await.unwrap();

        engine.process_scan(scan("a", "001", "d1")).await.unwrap();
        let session = sessions.current().await.unwrap();
        assert!(session.scores["001"].completed_groups.is_empty());

        engine.process_scan(scan("b", "001", "d2")).await.unwrap();
        let session = sessions.current().await.unwrap();
        let score = &session.scores["001"];
        assert_eq!(score.completed_groups, vec!["clue".to_string()]);
        // (multiplier 2 - 1) * (1000 + 300) = 1300
        assert_eq!(score.bonus_points, 1300);
    }

    #[tokio::test]
    async fn detective_mode_scores_zero_points() {
        let (engine, sessions) = harness().await;
        sessions.create_session("S1".into(), vec!["001".into()]).await.unwrap();

        let mut req = scan("a", "001", "d1");
        req.mode = ScanMode::Detective;
        let tx = engine.process_scan(req).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Accepted);
        assert_eq!(tx.points, 0);
    }
}
