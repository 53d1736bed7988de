use super::AppState;
use super::handlers::{handle_chat, handle_health};

use crate::config::{Config, GatewayConfig};
use crate::session::SessionOrchestrator;
use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

/// Bind the configured address and serve until Ctrl-C.
pub async fn run_gateway(config: Arc<Config>) -> Result<()> {
    let host = config.gateway.host.clone();
    let port = config.gateway.port;
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("bind gateway socket {host}:{port}"))?;

    run_gateway_with_listener(listener, config).await
}

/// Run the HTTP gateway from a pre-bound listener.
pub async fn run_gateway_with_listener(
    listener: tokio::net::TcpListener,
    config: Arc<Config>,
) -> Result<()> {
    let local_addr = listener
        .local_addr()
        .context("get gateway listener local address")?;

    let state = AppState {
        orchestrator: Arc::new(SessionOrchestrator::from_config(&config)),
        event_buffer: config.gateway.event_buffer,
    };

    print_gateway_banner(&local_addr.to_string(), &config);
    tracing::info!(addr = %local_addr, backend = %config.backend.base_url, "Gateway started");

    let app = build_app(state, &config.gateway);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve HTTP gateway")?;

    tracing::info!("Gateway stopped");
    Ok(())
}

fn print_gateway_banner(display_addr: &str, config: &Config) {
    println!("Gateway listening on {display_addr}");
    println!("  POST /api/chat -> text/event-stream");
    println!("  GET  /health");
    println!("  Backend: {}", config.backend.base_url);
    if config.planner.is_usable() {
        println!("  Planner: {} (rules fallback)", config.planner.model);
    } else {
        println!("  Planner: rules only");
    }
}

pub fn build_app(state: AppState, gateway: &GatewayConfig) -> Router {
    let mut app = Router::new()
        .route("/health", get(handle_health))
        .route("/api/chat", post(handle_chat))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(gateway.max_body_bytes));

    if !gateway.cors_origins.is_empty() {
        let origins: Vec<_> = gateway
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::AUTHORIZATION,
                ]),
        );
    }

    app
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Could not install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}
