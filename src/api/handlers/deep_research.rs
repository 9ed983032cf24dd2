use super::common::{bad_request, non_empty, page_options, param, ApiError, Params};
use crate::core::types::{ResearchJob, ResearchReport, MAX_RESEARCH_BREADTH};
use crate::core::validation::{parse_bounded, parse_queries};
use crate::research::deep_research;
use crate::AppState;
use axum::extract::{Query, State};
use axum::response::Json;
use std::sync::Arc;

pub async fn handle(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Json<ResearchReport>, ApiError> {
    let queries = parse_queries(param(&params, "queries")).map_err(bad_request)?;
    let breadth = parse_bounded(
        "breadth",
        param(&params, "breadth"),
        3,
        1,
        MAX_RESEARCH_BREADTH,
    )
    .map_err(bad_request)?;
    let job = ResearchJob::new(queries, breadth).map_err(bad_request)?;
    let page = page_options(&params).map_err(bad_request)?;
    let language = non_empty(param(&params, "language")).unwrap_or_else(|| "en".to_string());

    Ok(Json(deep_research(&state, &job, &language, &page).await))
}
