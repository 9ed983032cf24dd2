use super::common::{bad_request, param, ApiError, Params};
use crate::core::types::CrawlReport;
use crate::core::validation::{parse_bool, parse_bounded, parse_http_url, parse_stealth_level, require};
use crate::crawl::{crawl_site, CrawlOptions, MAX_CRAWL_DEPTH, MAX_CRAWL_PAGES};
use crate::AppState;
use axum::extract::{Query, State};
use axum::response::Json;
use std::sync::Arc;

pub async fn handle(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Json<CrawlReport>, ApiError> {
    let start = require("start_url", param(&params, "start_url"))
        .and_then(|raw| parse_http_url("start_url", raw))
        .map_err(bad_request)?;
    let defaults = CrawlOptions::default();
    let options = CrawlOptions {
        max_pages: parse_bounded(
            "max_pages",
            param(&params, "max_pages"),
            defaults.max_pages,
            1,
            MAX_CRAWL_PAGES,
        )
        .map_err(bad_request)?,
        max_depth: parse_bounded(
            "max_depth",
            param(&params, "max_depth"),
            defaults.max_depth,
            0,
            MAX_CRAWL_DEPTH,
        )
        .map_err(bad_request)?,
        same_domain_only: parse_bool(
            "same_domain_only",
            param(&params, "same_domain_only"),
            defaults.same_domain_only,
        )
        .map_err(bad_request)?,
        stealth_level: parse_stealth_level(param(&params, "stealth_mode")).map_err(bad_request)?,
    };

    Ok(Json(crawl_site(&state, start, &options).await))
}
