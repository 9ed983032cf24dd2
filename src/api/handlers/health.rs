use crate::core::types::HealthResponse;
use crate::AppState;
use axum::extract::State;
use axum::response::Json;
use std::sync::Arc;

/// Always 200; the backend probe only changes `backend_status`.
pub async fn handle(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let up = state.search_service.health().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        backend_status: if up { "up" } else { "down" }.to_string(),
        backend_url: state.search_service.base_url().to_string(),
    })
}
