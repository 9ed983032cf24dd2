use super::common::{bad_request, fetch_failure, page_options, param, ApiError, Params};
use crate::core::types::PageResult;
use crate::core::validation::{parse_http_url, require};
use crate::{scrape, AppState};
use axum::extract::{Query, State};
use axum::response::Json;
use std::sync::Arc;

pub async fn handle(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Json<PageResult>, ApiError> {
    let url = require("url", param(&params, "url"))
        .and_then(|raw| parse_http_url("url", raw))
        .map_err(bad_request)?;
    let page = page_options(&params).map_err(bad_request)?;

    scrape::fetch_page_cached(&state, &page.target(url.as_str()), &page.extract)
        .await
        .map(Json)
        .map_err(fetch_failure)
}
