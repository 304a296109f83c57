//! Offline Batch Handler (§4.10): replays a device's offline scan queue
//! through the Transaction Engine once it reconnects. Idempotent per
//! `batchId` — replaying the same batch twice (e.g. a retried HTTP
//! request) returns the cached result instead of double-scoring.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::OfflineQueueConfig;
use crate::events::{DomainEvent, EventBus};
use crate::session::{DeviceType, ScanMode, Transaction, TransactionEngine};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub token_id: String,
    pub team_id: String,
    pub device_id: String,
    pub device_type: DeviceType,
    pub mode: ScanMode,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub batch_id: String,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, thiserror::Error)]
pub enum OfflineError {
    #[error(transparent)]
    Engine(#[from] crate::session::EngineError),
}

pub struct OfflineBatchHandler {
    engine: Arc<TransactionEngine>,
    events: Arc<EventBus>,
    cache: Cache<String, Arc<BatchResult>>,
    /// Only one active session exists at a time, so one lock is enough to
    /// keep a whole batch's replay contiguous against concurrently
    /// arriving live scans.
    batch_lock: Mutex<()>,
}

impl OfflineBatchHandler {
    pub fn new(engine: Arc<TransactionEngine>, events: Arc<EventBus>, config: &OfflineQueueConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.cache_size)
            .time_to_live(Duration::from_millis(config.max_batch_age_ms))
            .build();
        Self {
            engine,
            events,
            cache,
            batch_lock: Mutex::new(()),
        }
    }

    /// §4.10: processes every item in submission order, preserving each
    /// item's original timestamp, then caches the result under `batch_id`
    /// so a retried submission is a no-op.
    pub async fn process_batch(
        &self,
        batch_id: &str,
        device_id: &str,
        items: Vec<BatchItem>,
    ) -> Result<Arc<BatchResult>, OfflineError> {
        if let Some(cached) = self.cache.get(batch_id).await {
            return Ok(cached);
        }

        let _guard = self.batch_lock.lock().await;
        if let Some(cached) = self.cache.get(batch_id).await {
            return Ok(cached);
        }

        let mut transactions = Vec::with_capacity(items.len());
        for item in items {
            let transaction = self
                .engine
                .process_scan(crate::session::ScanRequest {
                    token_id: item.token_id,
                    team_id: item.team_id,
                    device_id: item.device_id,
                    device_type: item.device_type,
                    mode: item.mode,
                    timestamp: Some(item.timestamp),
                })
                .await?;
            transactions.push(transaction);
        }

        let result = Arc::new(BatchResult {
            batch_id: batch_id.to_string(),
            transactions,
        });
        self.cache.insert(batch_id.to_string(), result.clone()).await;

        self.events.emit(DomainEvent::BatchAck {
            batch_id: batch_id.to_string(),
            device_id: device_id.to_string(),
            count: result.transactions.len(),
        });
        self.events.emit(DomainEvent::OfflineQueueProcessed {
            batch_id: batch_id.to_string(),
            device_id: device_id.to_string(),
            count: result.transactions.len(),
        });

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TokenCatalog;
    use crate::persistence::PersistenceStore;
    use crate::session::SessionManager;
    use crate::video::VideoQueue;

    async fn harness() -> (OfflineBatchHandler, Arc<SessionManager>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PersistenceStore::new(dir.path()).unwrap());
        let events = Arc::new(EventBus::new());
        let sessions = Arc::new(SessionManager::new(store, events.clone()));
        let catalog = Arc::new(
            TokenCatalog::load_from_str(r#"{"a": {"memoryType": "Personal", "valueRating": 1, "group": ""}}"#)
                .unwrap(),
        );
        let video = Arc::new(VideoQueue::new(events.clone()));
        let engine = Arc::new(TransactionEngine::new(catalog, sessions.clone(), video, events.clone()));
        let config = OfflineQueueConfig {
            max_batch_age_ms: 3_600_000,
            cache_size: 100,
        };
        let handler = OfflineBatchHandler::new(engine, events, &config);
        (handler, sessions)
    }

    fn item(token: &str, team: &str, device: &str) -> BatchItem {
        BatchItem {
            token_id: token.into(),
            team_id: team.into(),
            device_id: device.into(),
            device_type: DeviceType::Player,
            mode: ScanMode::Blackmarket,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn replaying_same_batch_id_is_idempotent() {
        let (handler, sessions) = harness().await;
        sessions.create_session("S1".into(), vec!["001".into()]).await.unwrap();

        let items = vec![item("a", "001", "d1")];
        let first = handler.process_batch("batch-1", "d1", items.clone()).await.unwrap();
        assert_eq!(first.transactions.len(), 1);

        let second = handler.process_batch("batch-1", "d1", items).await.unwrap();
        assert_eq!(second.transactions[0].id, first.transactions[0].id);
    }

    #[tokio::test]
    async fn batch_preserves_submitted_timestamps() {
        let (handler, sessions) = harness().await;
        sessions.create_session("S1".into(), vec!["001".into()]).await.unwrap();

        let mut scan = item("a", "001", "d1");
        let ts = Utc::now() - chrono::Duration::hours(2);
        scan.timestamp = ts;
        let result = handler.process_batch("batch-2", "d1", vec![scan]).await.unwrap();
        assert_eq!(result.transactions[0].timestamp, ts);
    }
}
