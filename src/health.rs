//! Liveness endpoint for hosting platforms that expect the process to answer
//! HTTP on `$PORT`.
//!
//! - `GET /` → `200 Bot is running!` while the session is connected.
//! - `GET /health` → JSON [`Status`].
//!
//! Anything other than a connected session answers `503`.

use std::net::SocketAddr;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use tokio::{net::TcpListener, sync::watch};

use crate::{
    session::{SessionState, Status},
    shutdown::ShutdownListener,
};

fn router(status: watch::Receiver<Status>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(status)
}

fn status_code(status: &Status) -> StatusCode {
    match status.state {
        SessionState::Connected => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn root(State(status): State<watch::Receiver<Status>>) -> impl IntoResponse {
    let status = status.borrow().clone();
    match status.state {
        SessionState::Connected => (StatusCode::OK, "Bot is running!".to_string()),
        state => (status_code(&status), format!("Bot is {}", state)),
    }
}

async fn health(State(status): State<watch::Receiver<Status>>) -> impl IntoResponse {
    let status = status.borrow().clone();
    (status_code(&status), Json(status))
}

/// Serves until `shutdown` fires. A port that cannot be bound is logged and
/// the bot keeps running without the endpoint.
pub(crate) async fn serve(
    port: u16,
    status: watch::Receiver<Status>,
    mut shutdown: ShutdownListener,
) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%addr, "Could not start health check server: {}", err);
            return;
        }
    };

    tracing::info!(%addr, "Health check server started");

    if let Err(err) = axum::serve(listener, router(status))
        .with_graceful_shutdown(async move { shutdown.recv().await })
        .await
    {
        tracing::error!("Health check server failed: {}", err);
    }

    tracing::info!("Health check server stopped");
}
