use super::common::{bad_request, page_options, param, search_failure, search_params, ApiError, Params};
use crate::core::types::SearchAndFetchResponse;
use crate::core::validation::parse_bounded;
use crate::search_fetch::{search_and_fetch, MAX_SEARCH_FETCH_RESULTS};
use crate::AppState;
use axum::extract::{Query, State};
use axum::response::Json;
use std::sync::Arc;

pub async fn handle(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Json<SearchAndFetchResponse>, ApiError> {
    let search = search_params(&params).map_err(bad_request)?;
    let num_results = parse_bounded(
        "num_results",
        param(&params, "num_results"),
        3,
        1,
        MAX_SEARCH_FETCH_RESULTS,
    )
    .map_err(bad_request)?;
    let page = page_options(&params).map_err(bad_request)?;

    search_and_fetch(&state, &search, num_results, &page)
        .await
        .map(Json)
        .map_err(search_failure)
}
