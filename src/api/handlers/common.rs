use crate::core::error::{FetchError, SearchError, ValidationError};
use crate::core::types::{ErrorResponse, ExtractOptions, PageOptions, SearchParams};
use crate::core::validation::*;
use axum::http::StatusCode;
use axum::response::Json;
use std::collections::HashMap;
use tracing::{error, warn};

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type Params = HashMap<String, String>;

pub const MAX_CONTENT_LENGTH: usize = 1_000_000;

pub fn error_response(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

pub fn bad_request(e: ValidationError) -> ApiError {
    warn!("rejected request: {}", e);
    error_response(StatusCode::BAD_REQUEST, e.to_string())
}

/// Upstream status passes through; timeouts are 504, connect failures 503.
pub fn fetch_failure(e: FetchError) -> ApiError {
    error!("Fetch error: {}", e);
    let status = match &e {
        FetchError::HttpStatus(code) => {
            StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        FetchError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        FetchError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
        FetchError::InvalidUrl { .. } => StatusCode::BAD_REQUEST,
        FetchError::Body(_) => StatusCode::BAD_GATEWAY,
    };
    error_response(status, format!("Failed to fetch URL: {}", e))
}

pub fn search_failure(e: SearchError) -> ApiError {
    error!("Search error: {}", e);
    let status = match &e {
        SearchError::Status { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        SearchError::Unreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
        SearchError::Decode(_) => StatusCode::BAD_GATEWAY,
    };
    error_response(status, format!("SearXNG error: {}", e))
}

pub fn param<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params.get(name).map(String::as_str)
}

/// Reads `stealth_mode`, `auto_bypass`, `format`, `extraction_mode`,
/// `include_html`, `include_links` and `max_content_length`.
pub fn page_options(params: &Params) -> Result<PageOptions, ValidationError> {
    let defaults = ExtractOptions::default();
    Ok(PageOptions {
        stealth_level: parse_stealth_level(param(params, "stealth_mode"))?,
        auto_bypass: parse_bool("auto_bypass", param(params, "auto_bypass"), false)?,
        extract: ExtractOptions {
            format: parse_format(param(params, "format"))?,
            mode: parse_extraction_mode(param(params, "extraction_mode"))?,
            include_html: parse_bool("include_html", param(params, "include_html"), false)?,
            include_links: parse_bool("include_links", param(params, "include_links"), true)?,
            max_content_length: parse_bounded(
                "max_content_length",
                param(params, "max_content_length"),
                defaults.max_content_length,
                1,
                MAX_CONTENT_LENGTH,
            )?,
            ..defaults
        },
    })
}

/// Search parameters shared by `/search-api` and `/search-and-fetch`.
pub fn search_params(params: &Params) -> Result<SearchParams, ValidationError> {
    let query = require("query", param(params, "query"))?;
    let mut search = SearchParams::new(query);
    search.categories = non_empty(param(params, "categories"));
    search.engines = non_empty(param(params, "engines"));
    if let Some(language) = non_empty(param(params, "language")) {
        search.language = language;
    }
    if let Some(page) = non_empty(param(params, "page")) {
        search.page = page;
    }
    search.time_range = parse_time_range(param(params, "time_range"))?;
    // Unrecognised values mean off.
    search.rerank = parse_bool("rerank", param(params, "rerank"), false).unwrap_or(false);
    Ok(search)
}

pub fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{OutputFormat, StealthLevel, TimeRange};

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_page_options_defaults_and_overrides() {
        let defaults = page_options(&Params::new()).unwrap();
        assert_eq!(defaults, PageOptions::default());

        let custom = page_options(&params(&[
            ("stealth_mode", "medium"),
            ("auto_bypass", "true"),
            ("format", "markdown"),
            ("include_links", "false"),
            ("max_content_length", "100"),
        ]))
        .unwrap();
        assert_eq!(custom.stealth_level, StealthLevel::Medium);
        assert!(custom.auto_bypass);
        assert_eq!(custom.extract.format, OutputFormat::Markdown);
        assert!(!custom.extract.include_links);
        assert_eq!(custom.extract.max_content_length, 100);

        assert!(page_options(&params(&[("stealth_mode", "max")])).is_err());
        assert!(page_options(&params(&[("extraction_mode", "summary")])).is_err());
    }

    #[test]
    fn test_search_params() {
        let p = search_params(&params(&[
            ("query", " weather "),
            ("engines", ""),
            ("page", "3"),
            ("time_range", "month"),
        ]))
        .unwrap();
        assert_eq!(p.query, "weather");
        assert_eq!(p.engines, None);
        assert_eq!(p.language, "en");
        assert_eq!(p.page, "3");
        assert_eq!(p.time_range, Some(TimeRange::Month));

        assert!(search_params(&params(&[("query", "  ")])).is_err());
        let odd = search_params(&params(&[("query", "x"), ("page", "two"), ("rerank", "maybe")]))
            .unwrap();
        assert_eq!(odd.page, "two");
        assert!(!odd.rerank);
        assert!(search_params(&params(&[("query", "x"), ("time_range", "decade")])).is_err());
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(fetch_failure(FetchError::HttpStatus(404)).0, StatusCode::NOT_FOUND);
        assert_eq!(
            fetch_failure(FetchError::Timeout("t".into())).0,
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            fetch_failure(FetchError::Connection("refused".into())).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            search_failure(SearchError::Status {
                status: 502,
                detail: String::new()
            })
            .0,
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            search_failure(SearchError::Unreachable("down".into())).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
