//! Outbound dispatch: the serialized queue drain loop and its scheduler.
//!
//! All mutable dispatch state (the queue, the drain guard, the outcome log)
//! lives on one `DispatcherService` instance shared via Arc. The drain loop
//! is the only place sends happen, one at a time with a fixed pacing wait
//! between messages; the guard admits at most one loop per process.

use crate::phone;
use crate::queue::{DispatchQueue, QueuedMessage};
use crate::session::SessionManager;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// How many finished-send outcomes are kept for the status endpoint.
const OUTCOME_LOG_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Sent,
    Failed,
}

/// Result of one send attempt. Failed entries are dropped, not retried.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub message_id: String,
    /// Normalized recipient the send was attempted against.
    pub recipient: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// Owns the queue, the drain guard, and the pacing policy.
pub struct DispatcherService {
    queue: DispatchQueue,
    session: Arc<SessionManager>,
    draining: AtomicBool,
    pacing: Duration,
    outcomes: Mutex<VecDeque<SendOutcome>>,
}

/// Clears the drain guard on every exit path, panics included.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl DispatcherService {
    pub fn new(session: Arc<SessionManager>, pacing: Duration) -> Arc<Self> {
        Arc::new(Self {
            queue: DispatchQueue::new(),
            session,
            draining: AtomicBool::new(false),
            pacing,
            outcomes: Mutex::new(VecDeque::new()),
        })
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.len().await
    }

    pub async fn queue_snapshot(&self) -> Vec<QueuedMessage> {
        self.queue.snapshot().await
    }

    /// Drop all pending entries. An entry already popped by the drain loop
    /// finishes its iteration; only not-yet-popped entries are affected.
    pub async fn clear_queue(&self) -> usize {
        self.queue.clear().await
    }

    /// Outcomes of recent send attempts, oldest first.
    pub async fn recent_outcomes(&self) -> Vec<SendOutcome> {
        self.outcomes.lock().await.iter().cloned().collect()
    }

    /// Append a message and opportunistically start a drain.
    pub async fn enqueue(self: &Arc<Self>, message: QueuedMessage) {
        log::debug!(
            "queued message {} for {}",
            message.id,
            message.recipient_raw
        );
        self.queue.enqueue(message).await;
        self.try_drain();
    }

    /// Start a drain in the background unless one is already running.
    pub fn try_drain(self: &Arc<Self>) {
        if self.draining.load(Ordering::SeqCst) {
            return;
        }
        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.drain().await;
        });
    }

    /// Drain the queue one message at a time while the session stays ready.
    ///
    /// No-op when a drain is already active, the queue is empty, or the
    /// session is not ready. A send failure is reported and the entry
    /// dropped; the loop carries on with the next entry. Losing readiness
    /// mid-loop leaves the remaining entries queued for a later drain.
    pub async fn drain(self: Arc<Self>) {
        if self.is_draining() || !self.session.is_ready() || self.queue.is_empty().await {
            return;
        }
        if self.draining.swap(true, Ordering::SeqCst) {
            // Another trigger won the guard between the check and the swap.
            return;
        }
        let _guard = DrainGuard(&self.draining);

        loop {
            if !self.session.is_ready() {
                log::info!(
                    "drain paused: session not ready, {} message(s) left queued",
                    self.queue.len().await
                );
                return;
            }
            let Some(message) = self.queue.pop_front().await else {
                return;
            };

            let recipient = phone::normalize(&message.recipient_raw);
            let outcome = match self.session.send(&recipient, &message.body).await {
                Ok(()) => {
                    log::info!("sent message {} to {}", message.id, recipient);
                    SendOutcome {
                        message_id: message.id.clone(),
                        recipient,
                        status: OutcomeStatus::Sent,
                        error: None,
                        finished_at: Utc::now(),
                    }
                }
                Err(e) => {
                    log::warn!("send of message {} to {} failed: {}", message.id, recipient, e);
                    SendOutcome {
                        message_id: message.id.clone(),
                        recipient,
                        status: OutcomeStatus::Failed,
                        error: Some(e.to_string()),
                        finished_at: Utc::now(),
                    }
                }
            };
            self.record_outcome(outcome).await;

            // Fixed pacing between sends. The queue is unlocked here, so
            // enqueues can land during the wait without starting a second loop.
            tokio::time::sleep(self.pacing).await;
        }
    }

    async fn record_outcome(&self, outcome: SendOutcome) {
        let mut g = self.outcomes.lock().await;
        g.push_back(outcome);
        while g.len() > OUTCOME_LOG_CAP {
            g.pop_front();
        }
    }
}

/// Periodic liveness backstop: re-attempts a drain in case an
/// enqueue-triggered attempt was skipped or the session became ready after
/// messages were already queued.
pub fn spawn_scheduler(service: Arc<DispatcherService>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            service.try_drain();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MessageCategory;
    use crate::session::SessionState;
    use crate::transport::{SessionEvent, SessionTransport};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    /// Transport that records sends and reports each one on a channel.
    struct FakeTransport {
        sent: Mutex<Vec<String>>,
        sent_tx: mpsc::UnboundedSender<String>,
        fail_recipients: Vec<String>,
    }

    impl FakeTransport {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
            Self::failing(Vec::new())
        }

        fn failing(
            fail_recipients: Vec<String>,
        ) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
            let (sent_tx, sent_rx) = mpsc::unbounded_channel();
            (
                Arc::new(Self {
                    sent: Mutex::new(Vec::new()),
                    sent_tx,
                    fail_recipients,
                }),
                sent_rx,
            )
        }
    }

    #[async_trait]
    impl SessionTransport for FakeTransport {
        async fn initialize(&self) -> Result<(), String> {
            Ok(())
        }

        async fn send(&self, recipient: &str, _body: &str) -> Result<(), String> {
            let _ = self.sent_tx.send(recipient.to_string());
            if self.fail_recipients.iter().any(|r| r == recipient) {
                return Err("number not registered".to_string());
            }
            self.sent.lock().await.push(recipient.to_string());
            Ok(())
        }

        async fn destroy(&self) -> Result<(), String> {
            Ok(())
        }

        fn start(
            self: Arc<Self>,
            _events_tx: mpsc::Sender<SessionEvent>,
        ) -> JoinHandle<()> {
            tokio::spawn(async {})
        }

        fn stop(&self) {}
    }

    async fn ready_service(
        transport: Arc<FakeTransport>,
    ) -> (Arc<DispatcherService>, Arc<SessionManager>) {
        let session = SessionManager::new(
            transport,
            Duration::from_secs(5),
            Duration::from_secs(2),
        );
        session.apply_event(SessionEvent::Ready).await;
        let service = DispatcherService::new(session.clone(), Duration::from_secs(2));
        (service, session)
    }

    fn adhoc(number: &str) -> QueuedMessage {
        QueuedMessage::new(number, "hello", MessageCategory::Adhoc)
    }

    #[tokio::test(start_paused = true)]
    async fn sends_in_fifo_order_with_normalized_recipients() {
        let (transport, _sent_rx) = FakeTransport::new();
        let (service, _session) = ready_service(transport.clone()).await;

        service.queue.enqueue(adhoc("9876543210")).await;
        service.queue.enqueue(adhoc("919876543211")).await;
        service.queue.enqueue(adhoc("12345")).await;

        service.clone().drain().await;

        let sent = transport.sent.lock().await.clone();
        assert_eq!(sent, vec!["919876543210", "919876543211", "12345"]);
        assert_eq!(service.queue_len().await, 0);
        assert!(!service.is_draining());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_drains_send_each_message_exactly_once() {
        let (transport, _sent_rx) = FakeTransport::new();
        let (service, _session) = ready_service(transport.clone()).await;

        for i in 0..5 {
            service.queue.enqueue(adhoc(&format!("987654321{}", i))).await;
        }

        tokio::join!(
            service.clone().drain(),
            service.clone().drain(),
            service.clone().drain()
        );

        let sent = transport.sent.lock().await.clone();
        assert_eq!(sent.len(), 5);
        let mut deduped = sent.clone();
        deduped.dedup();
        assert_eq!(deduped, sent);
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_during_drain_does_not_start_second_loop() {
        let (transport, mut sent_rx) = FakeTransport::new();
        let (service, _session) = ready_service(transport.clone()).await;

        service.enqueue(adhoc("9876543210")).await;
        // First send happens, then the loop is inside its pacing wait.
        sent_rx.recv().await.expect("first send");
        assert!(service.is_draining());

        service.enqueue(adhoc("9876543211")).await;
        sent_rx.recv().await.expect("second send");

        let sent = transport.sent.lock().await.clone();
        assert_eq!(sent, vec!["919876543210", "919876543211"]);
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_loss_mid_drain_leaves_remainder_queued() {
        let (transport, mut sent_rx) = FakeTransport::new();
        let (service, session) = ready_service(transport.clone()).await;

        service.queue.enqueue(adhoc("9876543210")).await;
        service.queue.enqueue(adhoc("9876543211")).await;
        service.queue.enqueue(adhoc("9876543212")).await;

        let handle = tokio::spawn(service.clone().drain());
        sent_rx.recv().await.expect("first send");
        // Revoke readiness while the loop is in its pacing wait.
        session
            .apply_event(SessionEvent::Disconnected("connection lost".to_string()))
            .await;
        handle.await.expect("drain task");

        assert_eq!(service.queue_len().await, 2);
        assert!(!service.is_draining());
        assert_eq!(transport.sent.lock().await.len(), 1);

        // Once readiness returns, the remainder drains in order, no loss or
        // duplication.
        session.apply_event(SessionEvent::Ready).await;
        service.clone().drain().await;
        let sent = transport.sent.lock().await.clone();
        assert_eq!(sent, vec!["919876543210", "919876543211", "919876543212"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_is_reported_and_dropped() {
        let (transport, _sent_rx) =
            FakeTransport::failing(vec!["12345".to_string()]);
        let (service, _session) = ready_service(transport.clone()).await;

        service.queue.enqueue(adhoc("12345")).await;
        service.queue.enqueue(adhoc("9876543210")).await;

        service.clone().drain().await;

        // The failure did not abort the sibling entry and nothing was
        // re-enqueued.
        assert_eq!(service.queue_len().await, 0);
        let outcomes = service.recent_outcomes().await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].status, OutcomeStatus::Failed);
        assert!(outcomes[0].error.as_deref().unwrap().contains("not registered"));
        assert_eq!(outcomes[1].status, OutcomeStatus::Sent);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_is_noop_when_session_not_ready() {
        let (transport, _sent_rx) = FakeTransport::new();
        let session = SessionManager::new(
            transport.clone(),
            Duration::from_secs(5),
            Duration::from_secs(2),
        );
        let service = DispatcherService::new(session, Duration::from_secs(2));

        service.enqueue(adhoc("9876543210")).await;
        service.clone().drain().await;

        assert_eq!(service.queue_len().await, 1);
        assert!(transport.sent.lock().await.is_empty());
        assert!(!service.is_draining());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_during_drain_exits_cleanly_after_current_entry() {
        let (transport, mut sent_rx) = FakeTransport::new();
        let (service, _session) = ready_service(transport.clone()).await;

        service.queue.enqueue(adhoc("9876543210")).await;
        service.queue.enqueue(adhoc("9876543211")).await;
        service.queue.enqueue(adhoc("9876543212")).await;

        let handle = tokio::spawn(service.clone().drain());
        sent_rx.recv().await.expect("first send");
        // The popped entry is owned by the loop; clear removes only the two
        // still queued.
        assert_eq!(service.clear_queue().await, 2);
        handle.await.expect("drain task");

        assert_eq!(transport.sent.lock().await.len(), 1);
        assert_eq!(service.queue_len().await, 0);
        assert!(!service.is_draining());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_tick_drains_backlog_once_ready() {
        let (transport, mut sent_rx) = FakeTransport::new();
        let session = SessionManager::new(
            transport.clone(),
            Duration::from_secs(5),
            Duration::from_secs(2),
        );
        let service = DispatcherService::new(session.clone(), Duration::from_secs(2));

        // Enqueued while not ready: the enqueue-triggered drain no-ops.
        service.enqueue(adhoc("9876543210")).await;
        assert_eq!(service.queue_len().await, 1);

        // Readiness arrives without any enqueue; only the scheduler is left
        // to notice the backlog.
        session.apply_event(SessionEvent::Ready).await;
        let scheduler = spawn_scheduler(service.clone(), Duration::from_secs(30));

        sent_rx.recv().await.expect("scheduled send");
        scheduler.abort();
        assert_eq!(transport.sent.lock().await.clone(), vec!["919876543210"]);
    }

    #[test]
    fn session_state_serializes_snake_case() {
        // Pin the wire spelling the status endpoint exposes.
        let v = serde_json::to_value(SessionState::QrReady).unwrap();
        assert_eq!(v, "qr_ready");
    }
}
