use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use common::{
    check_dependencies, DependencyCheck, DependencyStatus, HealthRegistry, StreamHealthSnapshot,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on each dependency check made by `/health`
    pub dependency_timeout: Duration,
}

#[derive(Clone)]
struct HealthState {
    streams: HealthRegistry,
    dependencies: Arc<[Arc<dyn DependencyCheck>]>,
    dependency_timeout: Duration,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    streams: Vec<StreamHealthSnapshot>,
    dependencies: Vec<DependencyStatus>,
}

/// Readiness and liveness probes over the stage health registry.
///
/// `/ready` answers 200 only while every stage is running. `/health` answers
/// 503 once any stage has been failed or stopped for longer than its grace
/// window, which is the signal for the orchestrator to restart the process.
/// Dependency checks are listed in the `/health` body but do not affect its
/// status code.
pub fn router(
    health: HealthRegistry,
    dependencies: Vec<Arc<dyn DependencyCheck>>,
    dependency_timeout: Duration,
) -> Router {
    Router::new()
        .route("/ready", get(ready))
        .route("/health", get(health_check))
        .with_state(HealthState {
            streams: health,
            dependencies: dependencies.into(),
            dependency_timeout,
        })
}

async fn ready(State(state): State<HealthState>) -> impl IntoResponse {
    if state.streams.is_ready() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    let healthy = state.streams.is_healthy();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "UP" } else { "DOWN" },
            streams: state.streams.snapshot(),
            dependencies: check_dependencies(&state.dependencies, state.dependency_timeout).await,
        }),
    )
}

/// Serve the probes until the token is cancelled.
pub async fn serve(
    config: HealthServerConfig,
    health: HealthRegistry,
    dependencies: Vec<Arc<dyn DependencyCheck>>,
    ctx: CancellationToken,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind health server to {addr}"))?;
    info!(address = %addr, "health server listening");

    let app = router(health, dependencies, config.dependency_timeout);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { ctx.cancelled().await })
        .await
        .context("health server failed")?;

    info!("health server stopped");
    Ok(())
}
