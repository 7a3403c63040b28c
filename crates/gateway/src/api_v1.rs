//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `GET  /v1/quota`             — Caller's remaining quota
//! - `POST /v1/questions/stream`  — Generate a question set, SSE stream
//! - `GET  /v1/questions/ws`      — Same over WebSocket
//! - `POST /v1/records/stream`    — Judge answers and update the profile, SSE stream
//! - `GET  /v1/records/ws`        — Same over WebSocket
//!
//! Every route is authenticated through [`Caller`]. Streaming routes run the
//! pre-flight quota check before anything is streamed, so an exhausted quota
//! is a plain 429 response.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::State;
use axum::http::HeaderValue;
use axum::http::header::HeaderName;
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{BoxError, Router};
use futures::StreamExt;
use lingoclaw_agent::{Agent, EventStream, QuestionAgent, RecordAgent, run_stream};
use lingoclaw_core::Session;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::SharedServices;
use crate::error::ApiError;
use crate::scope::Caller;

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router() -> Router<SharedServices> {
    Router::new()
        .route("/quota", get(quota_handler))
        .route("/questions/stream", post(questions_stream_handler))
        .route("/questions/ws", get(questions_ws_handler))
        .route("/records/stream", post(records_stream_handler))
        .route("/records/ws", get(records_ws_handler))
}

// ── Quota ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct QuotaResponse {
    remaining: i64,
    limit: i64,
    window_secs: u64,
}

/// `GET /v1/quota` — reading does not materialize the balance.
async fn quota_handler(caller: Caller) -> Result<Json<QuotaResponse>, ApiError> {
    let remaining = caller.bucket.get_remaining(false).await?;
    Ok(Json(QuotaResponse {
        remaining,
        limit: caller.bucket.limit(),
        window_secs: caller.bucket.window().as_secs(),
    }))
}

// ── SSE Streaming ─────────────────────────────────────────────────────────

/// One `data: <json>` frame per event. A failed run ends the body with an
/// error, which aborts the connection instead of closing it cleanly.
fn sse_response<R: Serialize + Send + 'static>(events: EventStream<R>) -> Response {
    let stream = events.map(|item| match item {
        Ok(event) => SseEvent::default().json_data(&event).map_err(BoxError::from),
        Err(e) => {
            error!(error_type = e.error_type(), error = %e, "Agent run failed mid-stream");
            Err(BoxError::from(e))
        }
    });
    (
        [(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        )],
        Sse::new(stream),
    )
        .into_response()
}

async fn start_sse<A: Agent>(
    services: &SharedServices,
    caller: &Caller,
    agent: A,
    payload: Result<Json<A::Input>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(input) = payload?;
    let session = caller.session(services).await?;
    info!(
        agent = agent.name(),
        user_id = caller.user.id,
        language = %caller.language,
        "SSE run started"
    );
    Ok(sse_response(run_stream(Arc::new(agent), session, input)))
}

/// `POST /v1/questions/stream`
async fn questions_stream_handler(
    State(services): State<SharedServices>,
    caller: Caller,
    payload: Result<Json<lingoclaw_agent::QuestionInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let agent = QuestionAgent::new(services.settings);
    start_sse(&services, &caller, agent, payload).await
}

/// `POST /v1/records/stream`
async fn records_stream_handler(
    State(services): State<SharedServices>,
    caller: Caller,
    payload: Result<Json<lingoclaw_agent::RecordInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let agent = RecordAgent::new(services.settings);
    start_sse(&services, &caller, agent, payload).await
}

// ── WebSocket ─────────────────────────────────────────────────────────────

/// Protocol:
/// - Client → Server: one text message with the agent input JSON
/// - Server → Client: one text message per event, then a close frame
///   (1000 after the result, 1011 if the run failed, 1007 for bad input)
async fn start_ws<A: Agent>(
    services: &SharedServices,
    caller: &Caller,
    agent: A,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let session = caller.session(services).await?;
    let ws = ws.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let agent = Arc::new(agent);
    info!(agent = agent.name(), user_id = caller.user.id, "WebSocket run accepted");
    Ok(ws.on_upgrade(move |socket| drive_ws(socket, agent, session)))
}

async fn questions_ws_handler(
    State(services): State<SharedServices>,
    caller: Caller,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let agent = QuestionAgent::new(services.settings);
    start_ws(&services, &caller, agent, ws).await
}

async fn records_ws_handler(
    State(services): State<SharedServices>,
    caller: Caller,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let agent = RecordAgent::new(services.settings);
    start_ws(&services, &caller, agent, ws).await
}

/// The first text message, parsed. `None` if the client left first.
async fn read_input<T: DeserializeOwned>(socket: &mut WebSocket) -> Option<Result<T, String>> {
    while let Some(msg) = socket.recv().await {
        match msg {
            Ok(WsMessage::Text(text)) => {
                return Some(serde_json::from_str(text.as_str()).map_err(|e| e.to_string()));
            }
            Ok(WsMessage::Close(_)) | Err(_) => return None,
            Ok(_) => continue, // ignore binary, ping, pong
        }
    }
    None
}

async fn close(socket: &mut WebSocket, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.to_string().into(),
    };
    let _ = socket.send(WsMessage::Close(Some(frame))).await;
}

async fn drive_ws<A: Agent>(mut socket: WebSocket, agent: Arc<A>, session: Session) {
    let input = match read_input::<A::Input>(&mut socket).await {
        Some(Ok(input)) => input,
        Some(Err(reason)) => {
            debug!(reason = %reason, "Invalid WebSocket input");
            close(&mut socket, close_code::INVALID, "invalid input").await;
            return;
        }
        None => return,
    };

    let mut events = run_stream(agent, session, input);
    while let Some(item) = events.next().await {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                error!(error_type = e.error_type(), error = %e, "Agent run failed");
                close(&mut socket, close_code::ERROR, e.error_type()).await;
                return;
            }
        };
        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Event serialization failed");
                close(&mut socket, close_code::ERROR, "internal_error").await;
                return;
            }
        };
        if socket.send(WsMessage::Text(text.into())).await.is_err() {
            // Dropping `events` aborts the run.
            debug!("WebSocket client disconnected");
            return;
        }
    }
    close(&mut socket, close_code::NORMAL, "done").await;
}
