//! Messaging session lifecycle: state machine, reconnection, and reset.
//!
//! One session exists per process. Transitions are driven by transport
//! events; a disconnect schedules reinitialization after a fixed delay and
//! a reset tears the session down before reinitializing. Sends are only
//! accepted while the session is ready.

use crate::transport::{SessionEvent, SessionTransport};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

/// Connectivity lifecycle of the external messaging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initializing,
    QrReady,
    Authenticated,
    Ready,
    AuthFailed,
    Disconnected,
    Resetting,
}

/// Error from a send attempt.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The session is not in the ready state; the send was not attempted.
    #[error("session is not ready")]
    NotReady,
    #[error("transport send failed: {0}")]
    Transport(String),
}

/// Owns the transport handle and the current session state. Shared via Arc
/// across the gateway, the dispatcher, and the event pump.
pub struct SessionManager {
    transport: Arc<dyn SessionTransport>,
    state_tx: watch::Sender<SessionState>,
    qr_challenge: Mutex<Option<String>>,
    reconnect_delay: Duration,
    reset_delay: Duration,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn SessionTransport>,
        reconnect_delay: Duration,
        reset_delay: Duration,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(SessionState::Initializing);
        Arc::new(Self {
            transport,
            state_tx,
            qr_challenge: Mutex::new(None),
            reconnect_delay,
            reset_delay,
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Observe state transitions (e.g. for tests or the drain loop).
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Current login challenge, if one is pending.
    pub async fn qr_challenge(&self) -> Option<String> {
        self.qr_challenge.lock().await.clone()
    }

    fn set_state(&self, next: SessionState) {
        let prev = self.state();
        if prev != next {
            log::info!("session state: {:?} -> {:?}", prev, next);
        }
        self.state_tx.send_replace(next);
    }

    /// Spawn the pump that applies transport events to the state machine.
    pub fn run_events(
        self: &Arc<Self>,
        mut events_rx: mpsc::Receiver<SessionEvent>,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                manager.apply_event(event).await;
            }
            log::debug!("session event channel closed");
        })
    }

    /// Apply one transport event. Disconnects schedule a reconnection
    /// attempt after the configured delay.
    pub async fn apply_event(self: &Arc<Self>, event: SessionEvent) {
        match event {
            SessionEvent::QrChallenge(challenge) => {
                *self.qr_challenge.lock().await = Some(challenge);
                self.set_state(SessionState::QrReady);
            }
            SessionEvent::Authenticated => {
                self.set_state(SessionState::Authenticated);
            }
            SessionEvent::Ready => {
                // The challenge is consumed once the session is live.
                *self.qr_challenge.lock().await = None;
                self.set_state(SessionState::Ready);
            }
            SessionEvent::AuthFailed(reason) => {
                log::warn!("session authentication failed: {}", reason);
                self.set_state(SessionState::AuthFailed);
            }
            SessionEvent::Disconnected(reason) => {
                log::warn!("session disconnected: {}", reason);
                self.set_state(SessionState::Disconnected);
                self.schedule_reinitialize(self.reconnect_delay, SessionState::Disconnected);
            }
        }
    }

    /// Send a message through the transport. Fails fast when the session is
    /// not ready; the caller decides what to do with the entry.
    pub async fn send(&self, recipient: &str, body: &str) -> Result<(), SendError> {
        if !self.is_ready() {
            return Err(SendError::NotReady);
        }
        self.transport
            .send(recipient, body)
            .await
            .map_err(SendError::Transport)
    }

    /// Start the underlying session. An initialization failure is treated
    /// like a disconnect: logged, then retried after the reconnect delay.
    pub async fn initialize(self: &Arc<Self>) {
        self.set_state(SessionState::Initializing);
        if let Err(e) = self.transport.initialize().await {
            log::warn!("session initialize failed: {}", e);
            self.set_state(SessionState::Disconnected);
            self.schedule_reinitialize(self.reconnect_delay, SessionState::Disconnected);
        }
    }

    /// Force a reset: tear down the current session instance (best-effort)
    /// and reinitialize after the reset delay.
    pub async fn reset(self: &Arc<Self>) {
        self.set_state(SessionState::Resetting);
        *self.qr_challenge.lock().await = None;
        if let Err(e) = self.transport.destroy().await {
            log::warn!("session teardown failed (continuing reset): {}", e);
        }
        self.schedule_reinitialize(self.reset_delay, SessionState::Resetting);
    }

    /// Reinitialize after `delay`, unless the state moved on in the
    /// meantime (a stale timer must not clobber a live session).
    fn schedule_reinitialize(self: &Arc<Self>, delay: Duration, expected: SessionState) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if manager.state() == expected {
                manager.initialize().await;
            }
        });
    }
}
