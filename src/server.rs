//! HTTP Server
//!
//! Optional scrape endpoint for daemon mode.
//!
//! # Endpoints
//!
//! - `GET /` - HTML landing page with links to metrics and health
//! - `GET /metrics` - Exporter self-metrics followed by the device exposition
//!   of the last completed cycle
//! - `GET /health` - 200 when the last cycle had at least one live device,
//!   503 otherwise (including before the first cycle finishes)
//!
//! The daemon owns the polling loop and publishes each finished cycle into the
//! shared [`ServerState`]; handlers only read from it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::metrics::ExporterMetrics;
use crate::push::EXPOSITION_CONTENT_TYPE;
use crate::shutdown::ShutdownSignal;

/// State shared between the daemon loop and the HTTP handlers
#[derive(Clone)]
pub struct ServerState {
    metrics: ExporterMetrics,
    latest: Arc<RwLock<String>>,
    healthy: Arc<AtomicBool>,
}

impl ServerState {
    pub fn new(metrics: ExporterMetrics) -> Self {
        Self {
            metrics,
            latest: Arc::new(RwLock::new(String::new())),
            healthy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replaces the served exposition with a finished cycle's output
    pub async fn publish_cycle(&self, exposition: String, any_live: bool) {
        *self.latest.write().await = exposition;
        self.healthy.store(any_live, Ordering::Relaxed);
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub async fn latest_exposition(&self) -> String {
        self.latest.read().await.clone()
    }
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Binds the configured address
pub async fn bind(config: &ServerConfig) -> anyhow::Result<TcpListener> {
    let addr = format!("{}:{}", config.addr, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind metrics server to {}", addr))?;

    info!("Metrics server listening on {}", addr);
    info!("Metrics available at http://{}/metrics", addr);
    Ok(listener)
}

/// Serves until shutdown is requested
pub async fn serve(
    listener: TcpListener,
    state: ServerState,
    mut shutdown: ShutdownSignal,
) -> anyhow::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;
    info!("Metrics server stopped");
    Ok(())
}

async fn root_handler() -> impl IntoResponse {
    axum::response::Html(
        r#"<html>
<head><title>Meshtastic Exporter</title></head>
<body>
<h1>Meshtastic Telemetry Exporter</h1>
<p><a href="/metrics">Metrics</a></p>
<p><a href="/health">Health</a></p>
</body>
</html>"#,
    )
}

async fn metrics_handler(State(state): State<ServerState>) -> Response {
    match state.metrics.render() {
        Ok(mut body) => {
            body.push_str(&state.latest_exposition().await);
            ([(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], body).into_response()
        }
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error rendering metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    if state.is_healthy() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "No live devices in last cycle")
    }
}
