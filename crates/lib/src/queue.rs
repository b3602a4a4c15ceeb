//! In-memory FIFO queue of pending outbound messages.
//!
//! Entries are immutable once enqueued; only their queue position changes.
//! The queue is volatile by design — contents are lost on restart.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Where a queued message came from. Event and task entries carry the source
/// id for traceability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "category", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MessageCategory {
    Adhoc,
    Event {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
    },
    Task {
        #[serde(skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
    },
}

/// A pending outbound message. The recipient is kept as supplied by the
/// caller; normalization happens at send time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    pub id: String,
    pub recipient_raw: String,
    pub body: String,
    pub enqueued_at: DateTime<Utc>,
    #[serde(flatten)]
    pub category: MessageCategory,
}

impl QueuedMessage {
    pub fn new(
        recipient_raw: impl Into<String>,
        body: impl Into<String>,
        category: MessageCategory,
    ) -> Self {
        Self {
            id: format!("msg-{}", uuid::Uuid::new_v4()),
            recipient_raw: recipient_raw.into(),
            body: body.into(),
            enqueued_at: Utc::now(),
            category,
        }
    }
}

/// Unbounded FIFO queue. Entries leave only through `pop_front` (the drain
/// loop) or `clear`; a popped entry is owned by its caller and is unaffected
/// by a later `clear`.
pub struct DispatchQueue {
    inner: Mutex<VecDeque<QueuedMessage>>,
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Append a message at the tail. Never blocks on capacity.
    pub async fn enqueue(&self, message: QueuedMessage) {
        self.inner.lock().await.push_back(message);
    }

    /// Remove and return the head entry, if any.
    pub async fn pop_front(&self) -> Option<QueuedMessage> {
        self.inner.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Drop all pending entries; returns how many were removed.
    pub async fn clear(&self) -> usize {
        let mut g = self.inner.lock().await;
        let n = g.len();
        g.clear();
        n
    }

    /// Clone of the pending entries in queue order.
    pub async fn snapshot(&self) -> Vec<QueuedMessage> {
        self.inner.lock().await.iter().cloned().collect()
    }
}
