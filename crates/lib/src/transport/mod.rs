//! Messaging session transport (e.g. a WhatsApp web-session bridge).
//!
//! Transport trait and lifecycle events so the session state machine can be
//! driven by any provider. Events are fed to the session manager over a
//! channel by the connector task.

mod bridge;

pub use bridge::BridgeTransport;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Lifecycle event emitted by a transport connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A login challenge is pending; the payload is the raw challenge string.
    QrChallenge(String),
    Authenticated,
    Ready,
    AuthFailed(String),
    Disconnected(String),
}

/// Handle to the external messaging session provider.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Start (or restart) the underlying session.
    async fn initialize(&self) -> Result<(), String>;

    /// Send a text message to a normalized recipient id.
    async fn send(&self, recipient: &str, body: &str) -> Result<(), String>;

    /// Tear the session down. Best-effort; callers log failures.
    async fn destroy(&self) -> Result<(), String>;

    /// Spawn the connector task that feeds session events into `events_tx`.
    /// Returns a handle to await on shutdown.
    fn start(self: Arc<Self>, events_tx: mpsc::Sender<SessionEvent>) -> JoinHandle<()>;

    /// Stop the connector task.
    fn stop(&self);
}
