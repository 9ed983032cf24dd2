pub mod handlers;

use crate::AppState;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Full HTTP surface. Every route is a GET; axum answers HEAD on the same
/// routes with the body stripped.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root::handle))
        .route("/health", get(handlers::health::handle))
        .route("/search-api", get(handlers::search::handle))
        .route("/fetch", get(handlers::fetch::handle))
        .route("/search-and-fetch", get(handlers::search_and_fetch::handle))
        .route("/deep-research", get(handlers::deep_research::handle))
        .route("/crawl-site", get(handlers::crawl_site::handle))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
