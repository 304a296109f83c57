//! Domain event bus (§4.3/§4.4/§4.5/§4.10 "emits ...", §9 listener registry).
//!
//! Session Manager, Transaction Engine, Video Queue, and Offline Batch
//! Handler all emit `DomainEvent`s onto one `EventBus`. The Broadcast
//! Coordinator is the bus's only subscriber in practice, but the registry
//! here is deliberately explicit and name-keyed so that a restart/shutdown
//! cycle can prove — rather than hope — that it unsubscribed exactly what
//! it subscribed (§8 property 5: listener count is stable across N
//! startup/shutdown cycles).

use std::collections::HashSet;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::catalog::MemoryType;
use crate::session::{DeviceConnection, TeamScore, Transaction};
use crate::video::VideoQueueItem;

#[derive(Debug, Clone)]
pub enum DomainEvent {
    SessionCreated { session_id: String },
    SessionUpdated { session_id: String },
    SessionEnded { session_id: String, reason: String },
    ScoresReset { session_id: String },

    TransactionAdded { transaction: Transaction },
    ScoreUpdated { score: TeamScore },
    GroupCompleted {
        team_id: String,
        group: String,
        bonus_points: i64,
    },

    DeviceUpdated { device: DeviceConnection, is_new: bool },
    DeviceDisconnected { device_id: String, reason: String },

    VideoQueued { item: VideoQueueItem, position: usize },
    VideoLoading { item: VideoQueueItem },
    VideoPlaying { item: VideoQueueItem },
    VideoPaused { item: VideoQueueItem },
    VideoCompleted { item: VideoQueueItem },
    VideoError { item: VideoQueueItem, message: String },
    VideoProgress {
        token_id: String,
        progress_pct: f64,
        position_secs: f64,
        duration_secs: f64,
    },
    VideoQueueUpdated { length: usize },

    OfflineQueueProcessed {
        batch_id: String,
        device_id: String,
        count: usize,
    },
    BatchAck {
        batch_id: String,
        device_id: String,
        count: usize,
    },
}

/// Only used for denormalization convenience in call sites that build
/// `Transaction`s from a `Token`; kept here to avoid a dependency cycle
/// between `catalog` and `session`.
pub fn default_memory_type() -> MemoryType {
    MemoryType::Unknown
}

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, thiserror::Error)]
#[error("subscriber '{0}' is already registered")]
pub struct AlreadyRegistered(pub &'static str);

pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
    subscribers: Mutex<HashSet<&'static str>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            subscribers: Mutex::new(HashSet::new()),
        }
    }

    pub fn emit(&self, event: DomainEvent) {
        // A broadcast send fails only when there are zero receivers; that's
        // a legitimate state (no Broadcast Coordinator running yet, e.g.
        // in unit tests) and not an error.
        let _ = self.sender.send(event);
    }

    /// Registers a named subscriber and returns its receiver. Rejects a
    /// second registration under the same name until `unsubscribe` is
    /// called — this is what makes the listener-registry invariant
    /// testable (§8 property 5).
    pub fn subscribe(
        &self,
        name: &'static str,
    ) -> Result<broadcast::Receiver<DomainEvent>, AlreadyRegistered> {
        let mut subs = self.subscribers.lock().unwrap();
        if !subs.insert(name) {
            return Err(AlreadyRegistered(name));
        }
        Ok(self.sender.subscribe())
    }

    pub fn unsubscribe(&self, name: &'static str) {
        self.subscribers.lock().unwrap().remove(name);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
