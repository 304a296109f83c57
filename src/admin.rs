//! Admin Command Handler (§4.11): the GM dashboard's single entry point,
//! dispatching each named action to the Session Manager, Transaction
//! Engine, or Video Queue and acking with `gm:command:ack`.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::error::AppResult;
use crate::session::{DeviceType, ScanMode, ScanRequest, SessionManager, SessionStatus, TransactionEngine};
use crate::video::VideoQueue;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", content = "payload")]
pub enum AdminCommand {
    #[serde(rename = "session:create")]
    SessionCreate { name: String, teams: Vec<String> },
    #[serde(rename = "session:pause")]
    SessionPause,
    #[serde(rename = "session:resume")]
    SessionResume,
    #[serde(rename = "session:end")]
    SessionEnd,
    #[serde(rename = "score:adjust", rename_all = "camelCase")]
    ScoreAdjust {
        team_id: String,
        delta: i64,
        reason: String,
    },
    #[serde(rename = "transaction:delete", rename_all = "camelCase")]
    TransactionDelete { transaction_id: String },
    #[serde(rename = "transaction:create", rename_all = "camelCase")]
    TransactionCreate {
        token_id: String,
        team_id: String,
        device_id: String,
        #[serde(default)]
        mode: ScanMode,
    },
    #[serde(rename = "video:play")]
    VideoPlay,
    #[serde(rename = "video:pause")]
    VideoPause,
    #[serde(rename = "video:skip")]
    VideoSkip,
    #[serde(rename = "video:queue:clear")]
    VideoQueueClear,
    #[serde(rename = "system:reset")]
    SystemReset,
}

pub struct AdminCommandHandler {
    sessions: Arc<SessionManager>,
    engine: Arc<TransactionEngine>,
    video: Arc<VideoQueue>,
}

impl AdminCommandHandler {
    pub fn new(sessions: Arc<SessionManager>, engine: Arc<TransactionEngine>, video: Arc<VideoQueue>) -> Self {
        Self {
            sessions,
            engine,
            video,
        }
    }

    /// Dispatches one command and returns the `gm:command:ack` payload
    /// (§4.11: `{action, success, result?}`).
    pub async fn handle(&self, command: AdminCommand) -> AppResult<Value> {
        let action = action_name(&command);
        let result = self.dispatch(command).await?;
        Ok(serde_json::json!({
            "action": action,
            "success": true,
            "result": result,
        }))
    }

    async fn dispatch(&self, command: AdminCommand) -> AppResult<Value> {
        match command {
            AdminCommand::SessionCreate { name, teams } => {
                let session = self.sessions.create_session(name, teams).await?;
                Ok(serde_json::json!({ "sessionId": session.id }))
            }
            AdminCommand::SessionPause => {
                let session = self.current_session_id().await?;
                self.sessions.update_status(&session, SessionStatus::Paused).await?;
                Ok(Value::Null)
            }
            AdminCommand::SessionResume => {
                let session = self.current_session_id().await?;
                self.sessions.update_status(&session, SessionStatus::Active).await?;
                Ok(Value::Null)
            }
            AdminCommand::SessionEnd => {
                let session = self.current_session_id().await?;
                self.sessions.end_session(&session, "admin").await?;
                Ok(Value::Null)
            }
            AdminCommand::ScoreAdjust {
                team_id,
                delta,
                reason,
            } => {
                let session_id = self.current_session_id().await?;
                self.sessions
                    .adjust_score(&session_id, &team_id, delta, &reason)
                    .await?;
                Ok(Value::Null)
            }
            AdminCommand::TransactionDelete { transaction_id } => {
                let session_id = self.current_session_id().await?;
                self.sessions.delete_transaction(&session_id, &transaction_id).await?;
                Ok(Value::Null)
            }
            AdminCommand::TransactionCreate {
                token_id,
                team_id,
                device_id,
                mode,
            } => {
                let transaction = self
                    .engine
                    .process_scan(ScanRequest {
                        token_id,
                        team_id,
                        device_id,
                        device_type: DeviceType::Gm,
                        mode,
                        timestamp: None,
                    })
                    .await?;
                Ok(serde_json::json!(transaction))
            }
            AdminCommand::VideoPlay => {
                self.video.resume().await;
                Ok(Value::Null)
            }
            AdminCommand::VideoPause => {
                self.video.pause().await;
                Ok(Value::Null)
            }
            AdminCommand::VideoSkip => {
                self.video.skip().await;
                Ok(Value::Null)
            }
            AdminCommand::VideoQueueClear => {
                self.video.clear().await;
                Ok(Value::Null)
            }
            AdminCommand::SystemReset => {
                let session_id = self.current_session_id().await?;
                self.sessions.reset_scores(&session_id).await?;
                self.sessions.end_session(&session_id, "system:reset").await?;
                self.video.clear().await;
                Ok(Value::Null)
            }
        }
    }

    async fn current_session_id(&self) -> AppResult<String> {
        self.sessions
            .current()
            .await
            .map(|s| s.id)
            .ok_or(crate::error::AppError::SessionNotFound)
    }
}

fn action_name(command: &AdminCommand) -> &'static str {
    match command {
        AdminCommand::SessionCreate { .. } => "session:create",
        AdminCommand::SessionPause => "session:pause",
        AdminCommand::SessionResume => "session:resume",
        AdminCommand::SessionEnd => "session:end",
        AdminCommand::ScoreAdjust { .. } => "score:adjust",
        AdminCommand::TransactionDelete { .. } => "transaction:delete",
        AdminCommand::TransactionCreate { .. } => "transaction:create",
        AdminCommand::VideoPlay => "video:play",
        AdminCommand::VideoPause => "video:pause",
        AdminCommand::VideoSkip => "video:skip",
        AdminCommand::VideoQueueClear => "video:queue:clear",
        AdminCommand::SystemReset => "system:reset",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TokenCatalog;
    use crate::events::EventBus;
    use crate::persistence::PersistenceStore;

    async fn harness() -> AdminCommandHandler {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PersistenceStore::new(dir.path()).unwrap());
        let events = Arc::new(EventBus::new());
        let sessions = Arc::new(SessionManager::new(store, events.clone()));
        let catalog = Arc::new(TokenCatalog::load_from_str("{}").unwrap());
        let video = Arc::new(VideoQueue::new(events.clone()));
        let engine = Arc::new(TransactionEngine::new(catalog, sessions.clone(), video.clone(), events));
        AdminCommandHandler::new(sessions, engine, video)
    }

    #[tokio::test]
    async fn session_create_then_pause_resume_end() {
        let handler = harness().await;
        let ack = handler
            .handle(AdminCommand::SessionCreate {
                name: "Night 1".into(),
                teams: vec!["001".into()],
            })
            .await
            .unwrap();
        assert_eq!(ack["success"], true);

        handler.handle(AdminCommand::SessionPause).await.unwrap();
        handler.handle(AdminCommand::SessionResume).await.unwrap();
        handler.handle(AdminCommand::SessionEnd).await.unwrap();
    }

    #[tokio::test]
    async fn score_adjust_without_session_errors() {
        let handler = harness().await;
        let err = handler
            .handle(AdminCommand::ScoreAdjust {
                team_id: "001".into(),
                delta: 100,
                reason: "bonus".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::AppError::SessionNotFound));
    }
}
