//! # HTTP Server
//!
//! Liveness/readiness probes and the Prometheus metrics endpoint.

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{Registry, TextEncoder};
use tracing::info;

/// Serve `/healthz`, `/readyz` and `/metrics` on `bind`
pub async fn start_server(bind: &str, registry: Registry) -> Result<()> {
    let app = Router::new()
        .route("/healthz", get(probe))
        .route("/readyz", get(probe))
        .route("/metrics", get(metrics))
        .with_state(registry);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind http server to {bind}"))?;
    info!("starting http server on {}", bind);
    axum::serve(listener, app)
        .await
        .context("http server failed")?;
    Ok(())
}

async fn probe() -> &'static str {
    "Ok"
}

async fn metrics(State(registry): State<Registry>) -> Result<String, StatusCode> {
    TextEncoder::new()
        .encode_to_string(&registry.gather())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
