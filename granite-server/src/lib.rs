//! HTTP front end for the granite video generator.
//!
//! Accepts generation requests, reports job state and serves the finished
//! videos. All real work happens in the `granite` crate's job manager.

pub mod routes;
pub mod state;

use std::future::Future;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use routes::ApiResponse;
pub use state::AppState;

/// Build the API router with all endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/api/generate",
            post(routes::generate::generate)
                .layer(DefaultBodyLimit::max(routes::generate::MAX_UPLOAD_BYTES)),
        )
        .route("/api/jobs", get(routes::jobs::list_jobs))
        .route("/api/jobs/{id}", get(routes::jobs::get_job))
        .route("/api/jobs/{id}/video", get(routes::jobs::get_video))
        .route("/api/jobs/{id}/cancel", post(routes::jobs::cancel_job))
        .route("/api/jobs/{id}/events", get(routes::jobs::job_events))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Listening on http://{}", addr);
    }
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
