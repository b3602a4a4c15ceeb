//! Gateway HTTP server: queueing endpoints, session status, QR, and reset.

use crate::config::{self, Config, GatewayAuthMode};
use crate::dispatch::{spawn_scheduler, DispatcherService};
use crate::gateway::protocol::{
    BulkItem, EnqueueAck, SendBulkRequest, SendEventRequest, SendTaskRequest,
};
use crate::qr;
use crate::queue::{MessageCategory, QueuedMessage};
use crate::session::SessionManager;
use crate::template::{self, StaffMember};
use crate::transport::{BridgeTransport, SessionTransport};
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Shared state for the gateway (config, dispatcher, session).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub dispatcher: Arc<DispatcherService>,
    pub session: Arc<SessionManager>,
    /// When Some, mutating endpoints must provide this bearer token.
    pub required_token: Option<String>,
}

/// True when no token is required or the Authorization header matches.
fn authorized(state: &GatewayState, headers: &HeaderMap) -> bool {
    let Some(required) = state.required_token.as_deref() else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .is_some_and(|t| t == required)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "missing or invalid gateway token" })),
    )
        .into_response()
}

/// Queueing endpoints reject the whole request when the session cannot send.
fn session_not_ready(state: &GatewayState) -> Response {
    (
        StatusCode::CONFLICT,
        Json(json!({
            "error": "session not ready",
            "sessionState": state.session.state(),
        })),
    )
        .into_response()
}

fn bad_request(error: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": error }))).into_response()
}

/// Common tail of the queueing endpoints: per-item acks plus queue length.
async fn queued_response(state: &GatewayState, acks: Vec<EnqueueAck>) -> Response {
    Json(json!({
        "queued": acks,
        "queueLength": state.dispatcher.queue_len().await,
    }))
    .into_response()
}

/// GET /health returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
    }))
}

/// GET /api/status — session state, queue length, and recent outcomes.
async fn api_status(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "sessionState": state.session.state(),
        "queueLength": state.dispatcher.queue_len().await,
        "draining": state.dispatcher.is_draining(),
        "qrPending": state.session.qr_challenge().await.is_some(),
        "recentOutcomes": state.dispatcher.recent_outcomes().await,
    }))
}

/// GET /api/qr — the pending login challenge rendered as SVG.
async fn api_qr(State(state): State<GatewayState>) -> Response {
    let Some(challenge) = state.session.qr_challenge().await else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no qr challenge pending" })),
        )
            .into_response();
    };
    match qr::render_svg(&challenge) {
        Some(svg) => ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "qr challenge could not be rendered" })),
        )
            .into_response(),
    }
}

/// POST /api/reset — tear down and reinitialize the session.
async fn api_reset(State(state): State<GatewayState>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    state.session.reset().await;
    Json(json!({ "resetting": true })).into_response()
}

async fn enqueue_adhoc(state: &GatewayState, item: &BulkItem) -> EnqueueAck {
    let number = item.number.as_deref().map(str::trim).unwrap_or("");
    if number.is_empty() {
        return EnqueueAck::rejected(number, "missing number");
    }
    let Some(text) = item
        .message
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    else {
        return EnqueueAck::rejected(number, "missing message");
    };
    let message = QueuedMessage::new(number, text, MessageCategory::Adhoc);
    let id = message.id.clone();
    state.dispatcher.enqueue(message).await;
    EnqueueAck::queued(number, id)
}

/// POST /api/send-bulk-messages — queue prerendered ad-hoc messages.
async fn api_send_bulk(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(req): Json<SendBulkRequest>,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    if !state.session.is_ready() {
        return session_not_ready(&state);
    }
    if req.messages.is_empty() {
        return bad_request("messages must not be empty");
    }
    let mut acks = Vec::with_capacity(req.messages.len());
    for item in &req.messages {
        acks.push(enqueue_adhoc(&state, item).await);
    }
    queued_response(&state, acks).await
}

/// Queue one rendered notification per staff member. Staff without a phone
/// number are rejected individually; siblings still queue.
async fn enqueue_for_staff(
    state: &GatewayState,
    staff_list: &[StaffMember],
    category: &MessageCategory,
    render: impl Fn(&StaffMember) -> String,
) -> Vec<EnqueueAck> {
    let mut acks = Vec::with_capacity(staff_list.len());
    for staff in staff_list {
        let phone = staff.phone.as_deref().map(str::trim).unwrap_or("");
        if phone.is_empty() {
            acks.push(EnqueueAck::rejected(phone, "missing phone number"));
            continue;
        }
        let message = QueuedMessage::new(phone, render(staff), category.clone());
        let id = message.id.clone();
        state.dispatcher.enqueue(message).await;
        acks.push(EnqueueAck::queued(phone, id));
    }
    acks
}

/// POST /api/send-event-messages — render and queue event assignments.
async fn api_send_event(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(req): Json<SendEventRequest>,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    if !state.session.is_ready() {
        return session_not_ready(&state);
    }
    if req.staff_list.is_empty() {
        return bad_request("staffList must not be empty");
    }
    let category = MessageCategory::Event {
        event_id: req.event.id.clone(),
    };
    let acks = enqueue_for_staff(&state, &req.staff_list, &category, |staff| {
        template::render_event(&req.event, staff)
    })
    .await;
    queued_response(&state, acks).await
}

/// POST /api/send-task-messages — render and queue task assignments.
async fn api_send_task(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(req): Json<SendTaskRequest>,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    if !state.session.is_ready() {
        return session_not_ready(&state);
    }
    if req.staff_list.is_empty() {
        return bad_request("staffList must not be empty");
    }
    let category = MessageCategory::Task {
        task_id: req.task.id.clone(),
    };
    let acks = enqueue_for_staff(&state, &req.staff_list, &category, |staff| {
        template::render_task(&req.task, staff)
    })
    .await;
    queued_response(&state, acks).await
}

/// POST /api/clear-queue — drop all pending entries. An entry already
/// popped by a running drain finishes its iteration.
async fn api_clear_queue(State(state): State<GatewayState>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    let cleared = state.dispatcher.clear_queue().await;
    log::info!("cleared {} queued message(s)", cleared);
    Json(json!({
        "cleared": cleared,
        "queueLength": state.dispatcher.queue_len().await,
    }))
    .into_response()
}

/// Body text shortened for the queue listing.
fn preview(body: &str) -> String {
    const MAX_CHARS: usize = 120;
    if body.chars().count() <= MAX_CHARS {
        return body.to_string();
    }
    let mut p: String = body.chars().take(MAX_CHARS).collect();
    p.push('…');
    p
}

/// GET /api/queue — pending entries in queue order, bodies shortened.
async fn api_queue(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let snapshot = state.dispatcher.queue_snapshot().await;
    let messages: Vec<serde_json::Value> = snapshot
        .iter()
        .map(|m| {
            let mut v = serde_json::to_value(m).unwrap_or_else(|_| json!({}));
            if let Some(obj) = v.as_object_mut() {
                obj.insert("body".to_string(), json!(preview(&m.body)));
            }
            v
        })
        .collect();
    Json(json!({
        "queueLength": messages.len(),
        "messages": messages,
    }))
}

/// Build the gateway router over the shared state.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health_http))
        .route("/api/status", get(api_status))
        .route("/api/qr", get(api_qr))
        .route("/api/reset", post(api_reset))
        .route("/api/send-bulk-messages", post(api_send_bulk))
        .route("/api/send-event-messages", post(api_send_event))
        .route("/api/send-task-messages", post(api_send_task))
        .route("/api/clear-queue", post(api_clear_queue))
        .route("/api/queue", get(api_queue))
        .with_state(state)
}

/// Serve the gateway until shutdown; binds to the configured address. The
/// transport connector, when given, is stopped on shutdown.
pub async fn serve(
    state: GatewayState,
    transport: Option<Arc<dyn SessionTransport>>,
) -> Result<()> {
    let bind_addr = format!(
        "{}:{}",
        state.config.gateway.bind.trim(),
        state.config.gateway.port
    );
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(transport))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Run the gateway against the configured session bridge.
/// When bind is not loopback, a gateway token must be configured or startup
/// fails. Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.gateway.bind.trim();
    if !config::is_loopback_bind(bind) {
        let token = config::resolve_gateway_token(&config);
        if token.is_none() || config.gateway.auth.mode != GatewayAuthMode::Token {
            anyhow::bail!(
                "refusing to bind gateway to {} without auth (set gateway.auth.mode to \"token\" and gateway.auth.token or COURIER_GATEWAY_TOKEN)",
                bind
            );
        }
    }
    let required_token = if config.gateway.auth.mode == GatewayAuthMode::Token {
        config::resolve_gateway_token(&config)
    } else {
        None
    };

    let transport = Arc::new(BridgeTransport::new(
        config.bridge.base_url.clone(),
        config::resolve_bridge_api_key(&config),
        config.bridge.poll_interval(),
    ));
    let session = SessionManager::new(
        transport.clone(),
        config.dispatch.reconnect_delay(),
        config.dispatch.reset_delay(),
    );
    let (events_tx, events_rx) = mpsc::channel(64);
    transport.clone().start(events_tx);
    session.run_events(events_rx);
    session.initialize().await;

    let dispatcher = DispatcherService::new(session.clone(), config.dispatch.pacing());
    spawn_scheduler(dispatcher.clone(), config.dispatch.scheduler_interval());

    let state = GatewayState {
        config: Arc::new(config),
        dispatcher,
        session,
        required_token,
    };
    serve(state, Some(transport)).await
}

/// Future that completes when the process should shut down (SIGINT or
/// SIGTERM). Stops the transport connector before the server drains.
async fn shutdown_signal(transport: Option<Arc<dyn SessionTransport>>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");

    if let Some(t) = transport {
        t.stop();
    }
}
