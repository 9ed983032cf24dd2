use super::common::{bad_request, search_failure, search_params, ApiError, Params};
use crate::core::types::SearchResponse;
use crate::{search, AppState};
use axum::extract::{Query, State};
use axum::response::Json;
use std::sync::Arc;

pub async fn handle(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = search_params(&params).map_err(bad_request)?;
    search::search_web(&state, &query)
        .await
        .map(Json)
        .map_err(search_failure)
}
