//! Bridge transport: session control and sendMessage via a local
//! WhatsApp web-session bridge's HTTP API.
//!
//! The bridge owns the wire protocol and session persistence; this client
//! polls `GET /api/session/status` at a fixed interval and emits
//! [`SessionEvent`]s when the reported state changes.

use crate::transport::{SessionEvent, SessionTransport};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(2);

/// Status payload reported by the bridge.
#[derive(Debug, Deserialize)]
struct BridgeStatus {
    status: String,
    #[serde(default)]
    qr: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// HTTP client for the session bridge: polls status and sends messages.
pub struct BridgeTransport {
    base_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
    running: AtomicBool,
    client: reqwest::Client,
}

impl BridgeTransport {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, poll_interval: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            poll_interval,
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn with_key(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("X-Api-Key", key),
            None => req,
        }
    }

    /// POST a JSON body to a bridge endpoint; errors on non-success status.
    async fn post(&self, path: &str, body: serde_json::Value) -> Result<(), String> {
        let url = format!("{}{}", self.base_url, path);
        let res = self
            .with_key(self.client.post(&url).json(&body))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("{} failed: {} {}", path, status, body));
        }
        Ok(())
    }

    /// Fetch the bridge's current session status.
    async fn status(&self) -> Result<BridgeStatus, String> {
        let url = format!("{}/api/session/status", self.base_url);
        let res = self
            .with_key(self.client.get(&url))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("status failed: {} {}", status, body));
        }
        res.json().await.map_err(|e| e.to_string())
    }
}

/// Map one status report to the event it implies, if the state changed since
/// the last report. QR challenges are re-emitted when the challenge rotates.
fn status_event(status: &BridgeStatus, last: &mut Option<String>, last_qr: &mut Option<String>) -> Option<SessionEvent> {
    let changed = last.as_deref() != Some(status.status.as_str());
    let event = match status.status.as_str() {
        "qr" => {
            let qr = status.qr.clone()?;
            if !changed && last_qr.as_deref() == Some(qr.as_str()) {
                return None;
            }
            *last_qr = Some(qr.clone());
            Some(SessionEvent::QrChallenge(qr))
        }
        "authenticated" if changed => Some(SessionEvent::Authenticated),
        "ready" if changed => Some(SessionEvent::Ready),
        "auth_failure" if changed => Some(SessionEvent::AuthFailed(
            status.reason.clone().unwrap_or_else(|| "authentication failed".to_string()),
        )),
        "disconnected" if changed => Some(SessionEvent::Disconnected(
            status.reason.clone().unwrap_or_else(|| "connection lost".to_string()),
        )),
        _ => None,
    };
    *last = Some(status.status.clone());
    event
}

async fn run_status_poll_loop(transport: Arc<BridgeTransport>, events_tx: mpsc::Sender<SessionEvent>) {
    let mut last_status: Option<String> = None;
    let mut last_qr: Option<String> = None;
    while transport.running() {
        match transport.status().await {
            Ok(status) => {
                if let Some(event) = status_event(&status, &mut last_status, &mut last_qr) {
                    if events_tx.send(event).await.is_err() {
                        log::debug!("bridge: event channel closed, stopping poll loop");
                        return;
                    }
                }
                tokio::time::sleep(transport.poll_interval).await;
            }
            Err(e) => {
                log::debug!("bridge status poll error: {}", e);
                tokio::time::sleep(POLL_ERROR_BACKOFF).await;
            }
        }
    }
    log::info!("bridge: status poll loop stopped");
}

#[async_trait]
impl SessionTransport for BridgeTransport {
    async fn initialize(&self) -> Result<(), String> {
        self.post("/api/session/start", serde_json::json!({})).await
    }

    async fn send(&self, recipient: &str, body: &str) -> Result<(), String> {
        self.post(
            "/api/send",
            serde_json::json!({ "number": recipient, "message": body }),
        )
        .await
    }

    async fn destroy(&self) -> Result<(), String> {
        self.post("/api/session/logout", serde_json::json!({})).await
    }

    fn start(self: Arc<Self>, events_tx: mpsc::Sender<SessionEvent>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("bridge: starting status poll loop against {}", self.base_url);
        tokio::spawn(async move {
            run_status_poll_loop(self, events_tx).await;
        })
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
