//! Broadcast Coordinator (§4.8): the sole subscriber to the `EventBus` in
//! practice. Translates each `DomainEvent` into the `{event, data,
//! timestamp}` wire envelope (§6.2) and fans it out to the room(s) that
//! care, via the shared `Rooms` registry the WebSocket Router reads from.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::events::{DomainEvent, EventBus};

const ROOM_CAPACITY: usize = 256;
const COORDINATOR_NAME: &str = "broadcast-coordinator";

/// Named fan-out channels a WebSocket connection subscribes to after
/// joining (§4.7): `gm`, `team:<id>`, and `device:<id>`. There is no
/// global "everyone" room — the WebSocket Router only ever admits `gm`/
/// `admin` devices, so every socket already sits in `gm`.
pub struct Rooms {
    channels: DashMap<String, broadcast::Sender<Value>>,
}

impl Rooms {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    fn sender(&self, room: &str) -> broadcast::Sender<Value> {
        self.channels
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .clone()
    }

    pub fn subscribe(&self, room: &str) -> broadcast::Receiver<Value> {
        self.sender(room).subscribe()
    }

    pub fn publish(&self, room: &str, payload: Value) {
        // Fails only when nobody is listening to this room right now,
        // which is routine (e.g. no GM connected yet) and not an error.
        let _ = self.sender(room).send(payload);
    }
}

impl Default for Rooms {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BroadcastCoordinator {
    events: Arc<EventBus>,
    handle: Option<JoinHandle<()>>,
}

impl BroadcastCoordinator {
    /// Subscribes to the `EventBus` under a fixed name and spawns the
    /// fan-out task. Call `cleanup` to unwind both on shutdown.
    pub fn spawn(events: Arc<EventBus>, rooms: Arc<Rooms>) -> Result<Self, crate::events::AlreadyRegistered> {
        let mut receiver = events.subscribe(COORDINATOR_NAME)?;
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => dispatch(&rooms, event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "broadcast coordinator lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(Self {
            events,
            handle: Some(handle),
        })
    }

    /// Idempotent: unsubscribes from the event bus and aborts the fan-out
    /// task. Safe to call more than once (§8 property 5 — listener count
    /// must return to zero across N startup/shutdown cycles).
    pub fn cleanup(&mut self) {
        self.events.unsubscribe(COORDINATOR_NAME);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for BroadcastCoordinator {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn dispatch(rooms: &Rooms, event: DomainEvent) {
    let timestamp = Utc::now();
    let (name, data, target_rooms) = envelope(&event);
    let payload = serde_json::json!({
        "event": name,
        "data": data,
        "timestamp": timestamp,
    });
    for room in target_rooms {
        rooms.publish(&room, payload.clone());
    }
}

/// Maps a domain event to its wire event name, JSON payload, and target
/// rooms. `gm` sees every session/video/device event; teams additionally
/// see events about themselves via `team:<id>`; a device's own batch
/// acks go to `device:<id>` alone.
fn envelope(event: &DomainEvent) -> (&'static str, Value, Vec<String>) {
    match event {
        DomainEvent::SessionCreated { session_id } => (
            "session:new",
            serde_json::json!({ "sessionId": session_id }),
            vec!["gm".into()],
        ),
        DomainEvent::SessionUpdated { session_id } => (
            "session:update",
            serde_json::json!({ "sessionId": session_id }),
            vec!["gm".into()],
        ),
        DomainEvent::SessionEnded { session_id, reason } => (
            "session:update",
            serde_json::json!({ "sessionId": session_id, "reason": reason, "status": "ended" }),
            vec!["gm".into()],
        ),
        DomainEvent::ScoresReset { session_id } => (
            "score:updated",
            serde_json::json!({ "sessionId": session_id, "reset": true }),
            vec!["gm".into()],
        ),

        DomainEvent::TransactionAdded { transaction } => (
            "transaction:new",
            serde_json::json!(transaction),
            vec!["gm".into(), format!("team:{}", transaction.team_id)],
        ),
        DomainEvent::ScoreUpdated { score } => (
            "score:updated",
            serde_json::json!(score),
            vec!["gm".into(), format!("team:{}", score.team_id)],
        ),
        DomainEvent::GroupCompleted {
            team_id,
            group,
            bonus_points,
        } => (
            "group:completed",
            serde_json::json!({ "teamId": team_id, "group": group, "bonusPoints": bonus_points }),
            vec!["gm".into(), format!("team:{team_id}")],
        ),

        DomainEvent::DeviceUpdated { device, is_new } => (
            "device:updated",
            serde_json::json!({ "device": device, "isNew": is_new }),
            vec!["gm".into()],
        ),
        DomainEvent::DeviceDisconnected { device_id, reason } => (
            "device:disconnected",
            serde_json::json!({ "deviceId": device_id, "reason": reason }),
            vec!["gm".into()],
        ),

        DomainEvent::VideoQueued { item, position } => (
            "video:queued",
            serde_json::json!({ "item": item, "position": position }),
            vec!["gm".into()],
        ),
        DomainEvent::VideoLoading { item } => ("video:loading", serde_json::json!(item), vec!["gm".into()]),
        DomainEvent::VideoPlaying { item } => ("video:playing", serde_json::json!(item), vec!["gm".into()]),
        DomainEvent::VideoPaused { item } => ("video:paused", serde_json::json!(item), vec!["gm".into()]),
        DomainEvent::VideoCompleted { item } => ("video:completed", serde_json::json!(item), vec!["gm".into()]),
        DomainEvent::VideoError { item, message } => (
            "video:error",
            serde_json::json!({ "item": item, "message": message }),
            vec!["gm".into()],
        ),
        DomainEvent::VideoProgress {
            token_id,
            progress_pct,
            position_secs,
            duration_secs,
        } => (
            "video:progress",
            serde_json::json!({
                "tokenId": token_id,
                "progressPct": progress_pct,
                "positionSecs": position_secs,
                "durationSecs": duration_secs,
            }),
            vec!["gm".into()],
        ),
        DomainEvent::VideoQueueUpdated { length } => (
            "video:queue:updated",
            serde_json::json!({ "length": length }),
            vec!["gm".into()],
        ),

        DomainEvent::OfflineQueueProcessed {
            batch_id,
            device_id,
            count,
        } => (
            "offline:queue:processed",
            serde_json::json!({ "batchId": batch_id, "deviceId": device_id, "count": count }),
            vec!["gm".into(), format!("device:{device_id}")],
        ),
        DomainEvent::BatchAck {
            batch_id,
            device_id,
            count,
        } => (
            "batch:ack",
            serde_json::json!({ "batchId": batch_id, "deviceId": device_id, "count": count }),
            vec![format!("device:{device_id}")],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transaction_added_reaches_gm_and_team_room() {
        let events = Arc::new(EventBus::new());
        let rooms = Arc::new(Rooms::new());
        let mut gm_rx = rooms.subscribe("gm");
        let mut team_rx = rooms.subscribe("team:001");
        let mut coordinator = BroadcastCoordinator::spawn(events.clone(), rooms).unwrap();

        events.emit(DomainEvent::TransactionAdded {
            transaction: sample_transaction(),
        });

        let gm_msg = gm_rx.recv().await.unwrap();
        assert_eq!(gm_msg["event"], "transaction:new");
        let team_msg = team_rx.recv().await.unwrap();
        assert_eq!(team_msg["event"], "transaction:new");

        coordinator.cleanup();
        assert_eq!(events.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let events = Arc::new(EventBus::new());
        let rooms = Arc::new(Rooms::new());
        let mut coordinator = BroadcastCoordinator::spawn(events.clone(), rooms).unwrap();
        coordinator.cleanup();
        coordinator.cleanup();
        assert_eq!(events.subscriber_count(), 0);
    }

    fn sample_transaction() -> crate::session::Transaction {
        crate::session::Transaction {
            id: "t1".into(),
            token_id: "a".into(),
            team_id: "001".into(),
            device_id: "d1".into(),
            device_type: crate::session::DeviceType::Player,
            mode: crate::session::ScanMode::Blackmarket,
            status: crate::session::TransactionStatus::Accepted,
            points: 100,
            timestamp: Utc::now(),
            memory_type: crate::catalog::MemoryType::Personal,
            value_rating: Some(1),
            group: String::new(),
            is_unknown: false,
            original_transaction_id: None,
        }
    }
}
