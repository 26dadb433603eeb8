//! Axum-based WebSocket server.

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::connection::handle_ws_connection;
use crate::state::GatewayState;

/// Build the router: `/ws`, `/health`, `/snapshot.png`.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/snapshot.png", get(snapshot_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind to the configured address and serve until Ctrl-C.
pub async fn start_gateway(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let addr = format!("{}:{port}", state.config.bind_addr());
    let listener = TcpListener::bind(&addr).await?;
    info!("Gateway listening on {addr}");

    serve(listener, state).await
}

/// Serve on an already-bound listener until Ctrl-C.
pub async fn serve(listener: TcpListener, state: Arc<GatewayState>) -> anyhow::Result<()> {
    #[allow(unused_mut)]
    let mut app = router(state);

    #[cfg(feature = "metrics")]
    {
        let handle = crate::metrics::install_prometheus_recorder()?;
        app = app.route("/metrics", get(move || std::future::ready(handle.render())));
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(state, socket))
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");
    let (width, height) = state.sync.canvas_size();

    axum::Json(json!({
        "status": "ok",
        "version": version,
        "sessions": state.sync.session_count(),
        "canvas": [width, height],
    }))
}

async fn snapshot_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    match state.sync.snapshot() {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Err(e) => {
            error!(error = %e, "Snapshot request failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
