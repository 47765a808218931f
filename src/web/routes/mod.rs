//! Route table: mounts the document lifecycle handlers onto their paths.

pub mod documents;

use axum::routing::{get, post};
use axum::Router;

use crate::web::state::AppState;

/// Builds the `/documents/*` router. Mounted at the application root by
/// [`crate::web::router`].
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/documents/upload", post(documents::upload))
        .route("/documents/analyze-sync/{id}", post(documents::analyze_sync))
        .route("/documents/analyze/{id}", post(documents::analyze_stream))
        .route("/documents/query", post(documents::query))
        .route("/documents/reindex/{id}", post(documents::reindex))
        .route("/documents/index-stats/{id}", get(documents::index_stats))
        .route("/documents/export-docx", post(documents::export_docx))
        .route("/documents/assist", post(documents::assist))
}
