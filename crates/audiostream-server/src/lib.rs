//! Audiostream HTTP control surface.
//!
//! A thin axum server reporting pipeline status and dispatching the
//! start/stop lifecycle verbs. The streaming pipeline itself is driven
//! exclusively through the `Transport` API; this crate only composes it.

pub mod api;

use audiostream_core::{Config, StreamConfig, Transport};
use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    /// The streaming endpoint
    pub transport: Arc<dyn Transport>,
    /// Launch configuration (mode, target, ports)
    pub config: Arc<Config>,
    /// Effective stream parameters after device negotiation
    pub stream: StreamConfig,
    /// Human-readable audio source/sink label
    pub device: String,
}

impl AppState {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: Arc<Config>,
        stream: StreamConfig,
        device: String,
    ) -> Self {
        Self {
            transport,
            config,
            stream,
            device,
        }
    }
}

/// Build the axum router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(api::get_status))
        .route("/devices", get(api::list_devices))
        .route("/stream/start", post(api::start_stream))
        .route("/stream/stop", post(api::stop_stream))
        .route("/transports", get(api::list_transports))
        .route("/transport", put(api::switch_transport))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the control server on `0.0.0.0:port`
pub async fn start_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let app = build_router(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "API server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
