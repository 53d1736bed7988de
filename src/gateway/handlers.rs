use super::AppState;
use super::sse::build_sse_response;
use crate::session::ChatRequest;
use crate::stream::EventWriter;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Response, header};
use axum::response::{IntoResponse, Json};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// GET /health — always public (no secrets leaked)
pub(super) async fn handle_health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// POST /api/chat — run one session and stream its events
pub(super) async fn handle_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response<Body> {
    let forwarded = forwarded_headers(&headers);
    let cancel = CancellationToken::new();
    let (writer, frames) = EventWriter::channel(state.event_buffer, cancel.clone());

    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        orchestrator.run(request, forwarded, writer).await;
    });

    build_sse_response(frames, cancel)
}

/// Only the caller's credentials travel on to the backend service.
fn forwarded_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| BTreeMap::from([("Authorization".to_string(), value.to_string())]))
        .unwrap_or_default()
}
