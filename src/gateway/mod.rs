//! HTTP surface: `POST /api/chat` streams one session's events as SSE,
//! `GET /health` answers liveness probes.

mod handlers;
mod server;
mod sse;

pub use server::{build_app, run_gateway, run_gateway_with_listener};

use crate::session::SessionOrchestrator;
use std::sync::Arc;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SessionOrchestrator>,
    /// Per-session event channel capacity
    pub event_buffer: usize,
}
