//! Session Manager (§4.3): owns the single active `Session`, persists
//! every mutation, and emits domain events. No other component may
//! mutate a persisted `Session` directly.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::events::{DomainEvent, EventBus};
use crate::persistence::PersistenceStore;

use super::types::{DeviceConnection, DeviceType, Session, SessionStatus, Transaction, TransactionStatus};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("a session is already active or paused")]
    ConcurrentSession,
    #[error("no active session")]
    NotFound,
    #[error(transparent)]
    Store(#[from] crate::persistence::StoreError),
}

pub struct SessionManager {
    store: Arc<PersistenceStore>,
    events: Arc<EventBus>,
    current: RwLock<Option<Session>>,
}

impl SessionManager {
    pub fn new(store: Arc<PersistenceStore>, events: Arc<EventBus>) -> Self {
        Self {
            store,
            events,
            current: RwLock::new(None),
        }
    }

    /// Loads the pointer at `session:current` (if any) and rebuilds its
    /// derived state. Called once at startup.
    pub async fn restore(&self) -> Result<(), SessionError> {
        let Some(id): Option<String> = self.store.load("session:current").await? else {
            return Ok(());
        };
        let Some(mut session): Option<Session> = self.store.load(&format!("session:{id}")).await? else {
            return Ok(());
        };
        session.rebuild_scanned_tokens();
        *self.current.write().await = Some(session);
        Ok(())
    }

    pub async fn current(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    pub async fn create_session(
        &self,
        name: String,
        teams: Vec<String>,
    ) -> Result<Session, SessionError> {
        {
            let guard = self.current.read().await;
            if let Some(existing) = guard.as_ref() {
                if existing.is_active_or_paused() {
                    return Err(SessionError::ConcurrentSession);
                }
            }
        }

        let session = Session::new(uuid::Uuid::new_v4().to_string(), name, teams);
        self.persist(&session).await?;
        self.store.save("session:current", &session.id).await?;

        *self.current.write().await = Some(session.clone());
        self.events.emit(DomainEvent::SessionCreated {
            session_id: session.id.clone(),
        });
        Ok(session)
    }

    async fn persist(&self, session: &Session) -> Result<(), SessionError> {
        self.store
            .save(&format!("session:{}", session.id), session)
            .await?;
        Ok(())
    }

    async fn mutate<F>(&self, session_id: &str, f: F) -> Result<Session, SessionError>
    where
        F: FnOnce(&mut Session),
    {
        self.with_session_mut(session_id, f).await?;
        Ok(self
            .current
            .read()
            .await
            .clone()
            .expect("session present immediately after mutate"))
    }

    /// Runs `f` against the active session under a single write-lock
    /// acquisition and persists the result. If persistence fails, the
    /// in-memory session is rolled back to its pre-`f` snapshot so the
    /// mutation is all-or-nothing (§4.4 step 6 failure semantics).
    ///
    /// This is the primitive the Transaction Engine uses to make its
    /// duplicate-check-then-append sequence atomic: both happen inside
    /// `f`, under the same lock, so two simultaneous scans of the same
    /// token can never both observe "not yet scanned".
    pub(crate) async fn with_session_mut<F, R>(&self, session_id: &str, f: F) -> Result<R, SessionError>
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut guard = self.current.write().await;
        let session = guard.as_mut().filter(|s| s.id == session_id).ok_or(SessionError::NotFound)?;
        let snapshot = session.clone();
        let result = f(session);
        if let Err(e) = self.persist(session).await {
            *session = snapshot;
            return Err(e);
        }
        Ok(result)
    }

    pub async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<Session, SessionError> {
        let session = self
            .mutate(session_id, |session| {
                session.status = status;
            })
            .await?;
        self.events.emit(DomainEvent::SessionUpdated {
            session_id: session.id.clone(),
        });
        Ok(session)
    }

    pub async fn end_session(
        &self,
        session_id: &str,
        reason: &str,
    ) -> Result<Session, SessionError> {
        let session = self
            .mutate(session_id, |session| {
                session.status = SessionStatus::Ended;
                session.end_time = Some(Utc::now());
            })
            .await?;

        self.events.emit(DomainEvent::SessionEnded {
            session_id: session.id.clone(),
            reason: reason.to_string(),
        });
        Ok(session)
    }

    /// §4.11 `system:reset`: ends the session and resets every score to
    /// zero while leaving the ended session's transaction history intact
    /// on disk (§9 open-question resolution).
    pub async fn reset_scores(&self, session_id: &str) -> Result<Session, SessionError> {
        let session = self
            .mutate(session_id, |session| {
                for score in session.scores.values_mut() {
                    *score = super::types::TeamScore::new(score.team_id.clone());
                }
            })
            .await?;
        self.events.emit(DomainEvent::ScoresReset {
            session_id: session.id.clone(),
        });
        Ok(session)
    }

    /// §4.11 `score:adjust`: applies a signed delta with a reason,
    /// lazily creating the team's score row if this is its first mention.
    pub async fn adjust_score(
        &self,
        session_id: &str,
        team_id: &str,
        delta: i64,
        reason: &str,
    ) -> Result<Session, SessionError> {
        let session = self
            .mutate(session_id, |session| {
                let score = session
                    .scores
                    .entry(team_id.to_string())
                    .or_insert_with(|| super::types::TeamScore::new(team_id.to_string()));
                score.apply_adjustment(delta, reason);
            })
            .await?;
        self.events.emit(DomainEvent::ScoreUpdated {
            score: session.scores[team_id].clone(),
        });
        Ok(session)
    }

    pub async fn delete_transaction(
        &self,
        session_id: &str,
        transaction_id: &str,
    ) -> Result<Session, SessionError> {
        let session = self
            .mutate(session_id, |session| {
                session.transactions.retain(|t| t.id != transaction_id);
                session.rebuild_scanned_tokens();
            })
            .await?;
        self.events.emit(DomainEvent::SessionUpdated {
            session_id: session.id.clone(),
        });
        Ok(session)
    }

    /// §4.7 post-connection sequence step 1: register or refresh a device.
    pub async fn upsert_device(
        &self,
        session_id: &str,
        device: DeviceConnection,
    ) -> Result<(Session, bool), SessionError> {
        let mut is_new = false;
        let session = self
            .mutate(session_id, |session| {
                is_new = !session.connected_devices.contains_key(&device.id);
                session.connected_devices.insert(device.id.clone(), device.clone());
            })
            .await?;

        self.events.emit(DomainEvent::DeviceUpdated {
            device: session.connected_devices.values().last().cloned().unwrap(),
            is_new,
        });
        Ok((session, is_new))
    }

    /// §4.7 disconnect handling: clears `socketId`, keeps the device
    /// record for reconnection.
    pub async fn mark_device_disconnected(
        &self,
        session_id: &str,
        device_id: &str,
        reason: &str,
    ) -> Result<Session, SessionError> {
        let session = self
            .mutate(session_id, |session| {
                if let Some(device) = session.connected_devices.get_mut(device_id) {
                    device.socket_id = None;
                    device.disconnection_time = Some(Utc::now());
                }
            })
            .await?;

        self.events.emit(DomainEvent::DeviceDisconnected {
            device_id: device_id.to_string(),
            reason: reason.to_string(),
        });
        Ok(session)
    }

    pub async fn touch_heartbeat(&self, session_id: &str, device_id: &str) -> Result<(), SessionError> {
        self.mutate(session_id, |session| {
            if let Some(device) = session.connected_devices.get_mut(device_id) {
                device.last_heartbeat = Utc::now();
            }
        })
        .await?;
        Ok(())
    }

    /// §5 heartbeat sweep: devices with no heartbeat for `stale_after`
    /// are logged as stale. Returns their ids; callers decide what (if
    /// anything) to broadcast.
    pub async fn stale_devices(&self, session_id: &str, stale_after: chrono::Duration) -> Vec<String> {
        let guard = self.current.read().await;
        let Some(session) = guard.as_ref().filter(|s| s.id == session_id) else {
            return Vec::new();
        };
        let now = Utc::now();
        session
            .connected_devices
            .values()
            .filter(|d| d.socket_id.is_some() && now - d.last_heartbeat > stale_after)
            .map(|d| d.id.clone())
            .collect()
    }

    pub fn device_type_of(device: &DeviceConnection) -> DeviceType {
        device.device_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn manager() -> SessionManager {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PersistenceStore::new(dir.path()).unwrap());
        let events = Arc::new(EventBus::new());
        SessionManager::new(store, events)
    }

    #[tokio::test]
    async fn create_session_rejects_concurrent_active_session() {
        let mgr = manager().await;
        mgr.create_session("S1".into(), vec!["001".into()]).await.unwrap();
        let err = mgr
            .create_session("S2".into(), vec!["001".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::ConcurrentSession));
    }

    #[tokio::test]
    async fn ending_a_session_allows_a_new_one() {
        let mgr = manager().await;
        let s1 = mgr.create_session("S1".into(), vec!["001".into()]).await.unwrap();
        mgr.end_session(&s1.id, "manual").await.unwrap();
        let s2 = mgr.create_session("S2".into(), vec!["001".into()]).await.unwrap();
        assert_ne!(s1.id, s2.id);
    }

    #[tokio::test]
    async fn restore_rebuilds_scanned_tokens_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PersistenceStore::new(dir.path()).unwrap());
        let events = Arc::new(EventBus::new());
        let mgr = SessionManager::new(store.clone(), events.clone());

        let session = mgr.create_session("S1".into(), vec!["001".into()]).await.unwrap();
        let transaction = Transaction {
            id: "t1".into(),
            token_id: "a".into(),
            team_id: "001".into(),
            device_id: "d1".into(),
            device_type: DeviceType::Player,
            mode: super::super::types::ScanMode::Blackmarket,
            status: TransactionStatus::Accepted,
            points: 100,
            timestamp: Utc::now(),
            memory_type: crate::catalog::MemoryType::Personal,
            value_rating: Some(1),
            group: String::new(),
            is_unknown: false,
            original_transaction_id: None,
        };
        // Exercises the same with_session_mut path the Transaction Engine
        // uses (engine.rs's `build_transaction`), without pulling in the
        // whole engine for a persistence/restore test.
        mgr.with_session_mut(&session.id, move |session| {
            session
                .scanned_tokens_by_device
                .entry(transaction.device_id.clone())
                .or_default()
                .insert(transaction.token_id.clone());
            session.transactions.push(transaction);
        })
        .await
        .unwrap();

        let mgr2 = SessionManager::new(store, events);
        mgr2.restore().await.unwrap();
        let restored = mgr2.current().await.unwrap();
        assert!(restored.is_token_scanned_by_device("d1", "a"));
    }
}
