//! Stand-in service for demos and end-to-end tests
//!
//! Answers `200 OK` on the health path and `404` elsewhere. Runs until
//! terminated.

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Json;
use serde_json::{json, Value};

pub async fn stub_service_command(port: u16, path: &str) -> Result<()> {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    let router = axum::Router::new().route(&path, get(health));

    let address = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    tracing::info!("Stub service listening on http://{}{}", address, path);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server error")?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "pid": std::process::id(),
    }))
}
