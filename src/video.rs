//! Video Queue (§4.5): a strictly-ordered FIFO of video playback requests,
//! with at most one item ever `loading`/`playing`/`paused` at a time — the
//! item at the front of the queue.
//!
//! Owns the VLC client the way the Session Manager owns the Persistence
//! Store: orchestration and IO live here, callers just enqueue/skip/pause.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::events::{DomainEvent, EventBus};
use crate::session::VideoQueueItemStateMirror as VideoState;
use crate::vlc::VlcClient;

const VLC_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoQueueItem {
    pub id: String,
    pub token_id: String,
    pub filename: String,
    pub state: VideoState,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub expected_end_time: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
    pub position_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VideoQueueItem {
    fn new(token_id: String, filename: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            token_id,
            filename,
            state: VideoState::Queued,
            queued_at: Utc::now(),
            started_at: None,
            expected_end_time: None,
            duration_secs: None,
            position_secs: 0.0,
            error: None,
        }
    }
}

pub struct VideoQueue {
    events: Arc<EventBus>,
    vlc: Option<Arc<VlcClient>>,
    items: Mutex<VecDeque<VideoQueueItem>>,
}

impl VideoQueue {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            events,
            vlc: None,
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_vlc(events: Arc<EventBus>, vlc: Arc<VlcClient>) -> Self {
        Self {
            events,
            vlc: Some(vlc),
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// §4.4 step 8 / §4.5: adds a video to the back of the queue. Starts
    /// it immediately if the queue was otherwise idle.
    pub async fn enqueue(&self, token_id: String, filename: String) -> VideoQueueItem {
        let item = VideoQueueItem::new(token_id, filename);
        let position;
        {
            let mut items = self.items.lock().await;
            items.push_back(item.clone());
            position = items.len() - 1;
        }
        self.events.emit(DomainEvent::VideoQueued {
            item: item.clone(),
            position,
        });
        self.emit_length().await;
        if position == 0 {
            self.start_front().await;
        }
        item
    }

    async fn emit_length(&self) {
        let length = self.items.lock().await.len();
        self.events.emit(DomainEvent::VideoQueueUpdated { length });
    }

    /// Issues `play` for the item at the front of the queue, with a 5s
    /// timeout on the VLC call. A failed or timed-out start marks the
    /// item `error` and advances to the next item rather than wedging the
    /// queue.
    async fn start_front(&self) {
        let Some(vlc) = &self.vlc else {
            tracing::warn!("video queue has no VLC client configured; playback skipped");
            return;
        };

        let filename = {
            let items = self.items.lock().await;
            match items.front() {
                Some(item) if item.state == VideoState::Queued => item.filename.clone(),
                _ => return,
            }
        };

        {
            let mut items = self.items.lock().await;
            if let Some(item) = items.front_mut() {
                item.state = VideoState::Loading;
            }
        }
        self.emit_front(DomainEvent::VideoLoading).await;

        match tokio::time::timeout(VLC_TIMEOUT, vlc.play(&filename)).await {
            Ok(Ok(())) => {
                let mut items = self.items.lock().await;
                if let Some(item) = items.front_mut() {
                    item.state = VideoState::Playing;
                    item.started_at = Some(Utc::now());
                }
                drop(items);
                self.emit_front(DomainEvent::VideoPlaying).await;
            }
            Ok(Err(e)) => self.fail_front(&e.to_string()).await,
            Err(_) => self.fail_front("vlc play timed out after 5s").await,
        }
    }

    async fn fail_front(&self, message: &str) {
        let failed = {
            let mut items = self.items.lock().await;
            let Some(item) = items.front_mut() else { return };
            item.state = VideoState::Error;
            item.error = Some(message.to_string());
            item.clone()
        };
        self.events.emit(DomainEvent::VideoError {
            item: failed,
            message: message.to_string(),
        });
        self.advance().await;
    }

    async fn emit_front(&self, wrap: impl FnOnce(VideoQueueItem) -> DomainEvent) {
        let front = self.items.lock().await.front().cloned();
        if let Some(item) = front {
            self.events.emit(wrap(item));
        }
    }

    /// Pops the completed/errored front item and starts the next one, if
    /// any. Called after completion, skip, or a failed start.
    async fn advance(&self) {
        {
            let mut items = self.items.lock().await;
            items.pop_front();
        }
        self.emit_length().await;
        self.start_front().await;
    }

    /// Periodic poll of VLC status (§4.5), driving progress events and
    /// detecting end-of-playback. Called by a background tick task.
    pub async fn poll_progress(&self) {
        let Some(vlc) = &self.vlc else { return };
        let token_id = {
            let items = self.items.lock().await;
            match items.front() {
                Some(item) if item.state == VideoState::Playing => item.token_id.clone(),
                _ => return,
            }
        };

        let status = match vlc.status().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "vlc status poll failed");
                return;
            }
        };

        {
            let mut items = self.items.lock().await;
            if let Some(item) = items.front_mut() {
                item.duration_secs = Some(status.duration_secs);
                item.position_secs = status.position_secs;
            }
        }

        let progress_pct = if status.duration_secs > 0.0 {
            (status.position_secs / status.duration_secs * 100.0).min(100.0)
        } else {
            0.0
        };
        self.events.emit(DomainEvent::VideoProgress {
            token_id,
            progress_pct,
            position_secs: status.position_secs,
            duration_secs: status.duration_secs,
        });

        if !status.playing && status.duration_secs > 0.0 && status.position_secs >= status.duration_secs - 0.5 {
            self.complete_front().await;
        }
    }

    async fn complete_front(&self) {
        let completed = {
            let mut items = self.items.lock().await;
            let Some(item) = items.front_mut() else { return };
            item.state = VideoState::Completed;
            item.clone()
        };
        self.events.emit(DomainEvent::VideoCompleted { item: completed });
        self.advance().await;
    }

    /// GM `video:pause` (§4.11).
    pub async fn pause(&self) {
        let Some(vlc) = &self.vlc else { return };
        if vlc.pause().await.is_err() {
            return;
        }
        let mut items = self.items.lock().await;
        if let Some(item) = items.front_mut() {
            if item.state == VideoState::Playing {
                item.state = VideoState::Paused;
            }
        }
        drop(items);
        self.emit_front(DomainEvent::VideoPaused).await;
    }

    /// GM `video:play` resume (§4.11): resumes a paused item.
    pub async fn resume(&self) {
        let Some(vlc) = &self.vlc else { return };
        if vlc.resume().await.is_err() {
            return;
        }
        let mut items = self.items.lock().await;
        if let Some(item) = items.front_mut() {
            if item.state == VideoState::Paused {
                item.state = VideoState::Playing;
            }
        }
        drop(items);
        self.emit_front(DomainEvent::VideoPlaying).await;
    }

    /// GM `video:skip` (§4.11): force-completes the active item.
    pub async fn skip(&self) {
        if let Some(vlc) = &self.vlc {
            let _ = vlc.stop().await;
        }
        self.complete_front().await;
    }

    /// GM `video:queue:clear` (§4.11): drops every queued item and stops
    /// playback.
    pub async fn clear(&self) {
        if let Some(vlc) = &self.vlc {
            let _ = vlc.stop().await;
        }
        self.items.lock().await.clear();
        self.emit_length().await;
    }

    pub async fn snapshot(&self) -> Vec<VideoQueueItem> {
        self.items.lock().await.iter().cloned().collect()
    }

    pub async fn current(&self) -> Option<VideoQueueItem> {
        self.items.lock().await.front().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_without_vlc_client_stays_queued_but_does_not_panic() {
        let events = Arc::new(EventBus::new());
        let queue = VideoQueue::new(events);
        let item = queue.enqueue("tok1".into(), "clip.mp4".into()).await;
        assert_eq!(item.state, VideoState::Queued);
        assert_eq!(queue.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn clear_empties_queue() {
        let events = Arc::new(EventBus::new());
        let queue = VideoQueue::new(events);
        queue.enqueue("tok1".into(), "clip.mp4".into()).await;
        queue.clear().await;
        assert!(queue.snapshot().await.is_empty());
    }
}
