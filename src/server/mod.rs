//! HTTP API built on axum.
//!
//! Every handler shares one [`MedSafe`] behind an `Arc`; the history buffer inside it is the
//! only mutable state.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::MedSafeError;
use crate::service::MedSafe;

pub mod handlers;

/// Shared state for axum request handlers.
pub type AppState = Arc<MedSafe>;

/// Builds the full route table.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/interactions", post(handlers::post_interactions))
        .route("/alternatives", get(handlers::get_alternatives))
        .route(
            "/alternatives/explain",
            post(handlers::post_explain_alternatives),
        )
        .route("/extract", post(handlers::post_extract))
        .route("/chat", post(handlers::post_chat))
        .route("/summarize", post(handlers::post_summarize))
        .route("/history", get(handlers::get_history))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

/// Binds `host:port` and serves until ctrl-c.
pub async fn start_server(host: &str, port: u16, service: MedSafe) -> Result<(), MedSafeError> {
    let app = router(Arc::new(service));

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|err| {
        MedSafeError::Io(std::io::Error::new(
            err.kind(),
            format!("failed to bind {addr}: {err}"),
        ))
    })?;

    tracing::info!("MedSafe API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
