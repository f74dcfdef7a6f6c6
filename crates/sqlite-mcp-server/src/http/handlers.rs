use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::Stream;
use serde_json::{json, Value};
use sqlite_mcp_protocol::JsonRpcResponse;
use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::AppState;

pub const LANDING_MESSAGE: &str = "MCP Server is running. Connect to the /sse endpoint.";

pub(crate) fn make_request_id(state: &AppState) -> String {
    let id = state.request_id_seed.fetch_add(1, Ordering::Relaxed);
    format!("req-{id:016x}")
}

pub(crate) fn propagated_request_id(headers: &HeaderMap, state: &AppState) -> String {
    if let Some(raw) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    make_request_id(state)
}

pub(crate) fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(v) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", v);
    }
    response
}

pub(crate) fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({"error": {"code": code, "message": message}})),
    )
        .into_response()
}

pub(crate) async fn landing_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = Json(json!({"message": LANDING_MESSAGE})).into_response();
    state
        .metrics
        .observe_request("/", StatusCode::OK, started.elapsed())
        .await;
    with_request_id(resp, &request_id)
}

pub(crate) async fn healthz_handler(State(state): State<AppState>) -> impl IntoResponse {
    let request_id = make_request_id(&state);
    let started = Instant::now();
    let resp = (StatusCode::OK, "ok").into_response();
    state
        .metrics
        .observe_request("/healthz", StatusCode::OK, started.elapsed())
        .await;
    with_request_id(resp, &request_id)
}

pub(crate) async fn readyz_handler(State(state): State<AppState>) -> impl IntoResponse {
    let request_id = make_request_id(&state);
    let started = Instant::now();
    let ready = state.ready.load(Ordering::Relaxed)
        && state.accepting_requests.load(Ordering::Relaxed);
    let (status, body) = if ready {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not-ready")
    };
    let resp = (status, body).into_response();
    state
        .metrics
        .observe_request("/readyz", status, started.elapsed())
        .await;
    with_request_id(resp, &request_id)
}

pub(crate) async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let request_id = make_request_id(&state);
    let started = Instant::now();
    let open_sessions = state.sessions.len().await;
    let body = state.metrics.render(open_sessions).await;
    let mut resp = (StatusCode::OK, body).into_response();
    resp.headers_mut().insert(
        "content-type",
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    state
        .metrics
        .observe_request("/metrics", StatusCode::OK, started.elapsed())
        .await;
    with_request_id(resp, &request_id)
}

/// SSE stream for one MCP session. The first event names the endpoint the
/// client must post to; every queued JSON-RPC response follows as a
/// `message` event. Dropping the stream deregisters the session.
struct SessionStream {
    id: Uuid,
    rx: mpsc::Receiver<JsonRpcResponse>,
    endpoint: Option<Event>,
    state: AppState,
}

impl Stream for SessionStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(event) = this.endpoint.take() {
            return Poll::Ready(Some(Ok(event)));
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(response)) => match serde_json::to_string(&response) {
                Ok(data) => Poll::Ready(Some(Ok(Event::default().event("message").data(data)))),
                Err(err) => {
                    tracing::error!(session = %this.id, "response serialization failed: {err}");
                    Poll::Ready(None)
                }
            },
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        let sessions = Arc::clone(&self.state.sessions);
        let metrics = Arc::clone(&self.state.metrics);
        let id = self.id;
        tokio::spawn(async move {
            sessions.remove(&id).await;
            metrics.sessions_closed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(session = %id, "session closed");
        });
    }
}

pub(crate) async fn sse_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let (id, rx) = state.sessions.register().await;
    state.metrics.sessions_opened.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(session = %id, "session opened");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/messages/?session_id={id}"));
    let keepalive = KeepAlive::new()
        .interval(state.config.keepalive_interval)
        .text("keep-alive");
    let stream = SessionStream {
        id,
        rx,
        endpoint: Some(endpoint),
        state: state.clone(),
    };
    state
        .metrics
        .observe_request("/sse", StatusCode::OK, started.elapsed())
        .await;
    with_request_id(
        Sse::new(stream).keep_alive(keepalive).into_response(),
        &request_id,
    )
}

pub(crate) async fn messages_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);

    let session_id = match params.get("session_id").map(|raw| Uuid::parse_str(raw)) {
        Some(Ok(id)) => id,
        Some(Err(_)) | None => {
            let resp = error_response(
                StatusCode::NOT_FOUND,
                "UnknownSession",
                "missing or malformed session_id",
            );
            state
                .metrics
                .observe_request("/messages/", StatusCode::NOT_FOUND, started.elapsed())
                .await;
            return with_request_id(resp, &request_id);
        }
    };
    if !state.sessions.contains(&session_id).await {
        let resp = error_response(
            StatusCode::NOT_FOUND,
            "UnknownSession",
            &format!("no active session {session_id}"),
        );
        state
            .metrics
            .observe_request("/messages/", StatusCode::NOT_FOUND, started.elapsed())
            .await;
        return with_request_id(resp, &request_id);
    }

    let message: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            let resp = error_response(
                StatusCode::BAD_REQUEST,
                "InvalidBody",
                &format!("body is not valid JSON: {err}"),
            );
            state
                .metrics
                .observe_request("/messages/", StatusCode::BAD_REQUEST, started.elapsed())
                .await;
            return with_request_id(resp, &request_id);
        }
    };

    // Respond before the tool runs; the result reaches the client over the
    // session's SSE stream.
    let service = Arc::clone(&state.mcp);
    let sessions = Arc::clone(&state.sessions);
    tokio::spawn(async move {
        if let Some(response) = service.handle_value(message).await {
            if let Err(err) = sessions.deliver(&session_id, response).await {
                tracing::warn!(session = %session_id, "dropping response: {err}");
            }
        }
    });

    let resp = Json(json!({"status": "message received"})).into_response();
    state
        .metrics
        .observe_request("/messages/", StatusCode::OK, started.elapsed())
        .await;
    with_request_id(resp, &request_id)
}
