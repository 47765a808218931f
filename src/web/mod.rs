//! HTTP surface: axum routes over the analysis and retrieval pipelines.

pub mod error;
pub mod export;
pub mod routes;
pub mod state;

use std::time::Duration;

use axum::Router;
use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Default per-request timeout, generous enough for the sync analysis route
/// to run the full map-reduce pipeline against a slow upstream model.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Builds the full application router: document routes plus tracing, CORS,
/// and timeout middleware.
#[must_use]
pub fn router(state: AppState) -> Router {
    routes::create_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any),
        )
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
}
