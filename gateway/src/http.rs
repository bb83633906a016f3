//! Control-plane HTTP surface: health, capability lookup, call snapshots,
//! stats, and admin termination. Plain request/response, JSON,
//! `{success, ...|error}` envelope.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use gateway_core::{CallId, CallSession, PeerManager};
use gateway_media::{MediaRegistry, WorkerPool};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<PeerManager>,
    pub media: Arc<MediaRegistry>,
    pub worker_pool: Arc<WorkerPool>,
    pub started_at: DateTime<Utc>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/capabilities/:tenant", get(capabilities))
        .route("/sessions", get(list_sessions))
        .route("/sessions/:call_id", get(get_session))
        .route("/sessions/:call_id/terminate", post(terminate_session))
        .route("/stats", get(stats))
        .route("/stats/agent/:agent", get(agent_stats))
        .route("/info", get(info))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn ok(value: Value) -> Json<Value> {
    let mut body = json!({ "success": true });
    if let Value::Object(map) = value {
        body.as_object_mut().unwrap().extend(map);
    }
    Json(body)
}

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> impl IntoResponse {
    (
        status,
        Json(json!({
            "success": false,
            "error": { "code": code, "message": message.into() },
        })),
    )
}

#[derive(Serialize)]
struct CallSnapshot {
    call_id: CallId,
    tenant: String,
    agent: String,
    direction: &'static str,
    phone_number: String,
    state: String,
    on_hold: bool,
    muted: bool,
    started_at: DateTime<Utc>,
    answered_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl From<CallSession> for CallSnapshot {
    fn from(call: CallSession) -> Self {
        Self {
            call_id: call.id,
            tenant: call.tenant,
            agent: call.agent,
            direction: match call.direction {
                gateway_sip::Direction::Inbound => "inbound",
                gateway_sip::Direction::Outbound => "outbound",
            },
            phone_number: call.phone_number,
            state: format!("{:?}", call.state).to_lowercase(),
            on_hold: call.on_hold,
            muted: call.muted,
            started_at: call.started_at,
            answered_at: call.answered_at,
            ended_at: call.ended_at,
        }
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    ok(json!({
        "status": "ok",
        "workers": state.worker_pool.worker_count(),
        "peers": state.manager.peers().count(),
        "transports": state.media.transport_count(),
    }))
}

async fn capabilities(State(state): State<AppState>, Path(tenant): Path<String>) -> impl IntoResponse {
    let capabilities = state.media.get_or_create_router_capabilities(&tenant).await;
    ok(json!({ "capabilities": capabilities }))
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let mut sessions: Vec<CallSnapshot> = state.manager.calls().all().into_iter().map(Into::into).collect();
    if let Some(agent) = params.get("agent") {
        sessions.retain(|s| &s.agent == agent);
    }
    if let Some(tenant) = params.get("tenant") {
        sessions.retain(|s| &s.tenant == tenant);
    }
    ok(json!({ "sessions": sessions }))
}

async fn get_session(State(state): State<AppState>, Path(call_id): Path<uuid::Uuid>) -> impl IntoResponse {
    match state.manager.calls().get(CallId::from(call_id)) {
        Some(call) => ok(json!({ "session": CallSnapshot::from(call) })).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "call-not-found", "no such call session").into_response(),
    }
}

/// Admin-initiated hangup; emits the same cascade as a client hangup.
async fn terminate_session(
    State(state): State<AppState>,
    Path(call_id): Path<uuid::Uuid>,
) -> impl IntoResponse {
    let call_id = CallId::from(call_id);
    if state.manager.calls().get(call_id).is_none() {
        return error_response(StatusCode::NOT_FOUND, "call-not-found", "no such call session")
            .into_response();
    }
    state.manager.shutdown_call(call_id).await;
    ok(json!({ "terminated": true })).into_response()
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    ok(json!({
        "peers": state.manager.peers().count(),
        "active_calls": state.manager.calls().len(),
        "transports": state.media.transport_count(),
        "producers": state.media.producer_count(),
        "consumers": state.media.consumer_count(),
        "workers": state.worker_pool.worker_count(),
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
    }))
}

async fn agent_stats(State(state): State<AppState>, Path(agent): Path<String>) -> impl IntoResponse {
    let calls = state.manager.calls().calls_for_agent(&agent);
    let active = calls.iter().filter(|c| !c.state.is_terminal()).count();
    ok(json!({
        "agent": agent,
        "active_calls": active,
        "total_calls_seen": calls.len(),
    }))
}

async fn info(State(state): State<AppState>) -> impl IntoResponse {
    ok(json!({
        "name": "rtc-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "started_at": state.started_at,
    }))
}
