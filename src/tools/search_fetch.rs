use crate::core::error::SearchError;
use crate::core::types::*;
use crate::tools::cache::{CacheKey, CacheOp};
use crate::tools::scrape::fetch_page;
use crate::tools::search::search_web;
use crate::AppState;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

pub const MAX_SEARCH_FETCH_RESULTS: usize = 5;

/// Appends every page-shaping parameter in a fixed order. Shared by the
/// search-and-fetch and research keys.
pub(crate) fn page_key_params(key: CacheKey, page: &PageOptions) -> CacheKey {
    key.param("format", page.extract.format.as_str())
        .param("extraction_mode", page.extract.mode.as_str())
        .param("stealth_mode", page.stealth_level)
        .param("auto_bypass", page.auto_bypass)
        .param("include_links", page.extract.include_links)
        .param("include_html", page.extract.include_html)
        .param("max_content_length", page.extract.max_content_length)
}

/// Cache key: q, num_results, every other search parameter, then the page
/// parameters.
pub fn search_fetch_cache_key(
    params: &SearchParams,
    num_results: usize,
    page: &PageOptions,
) -> CacheKey {
    let key = CacheKey::new(CacheOp::SearchAndFetch)
        .param("q", &params.query)
        .param("num_results", num_results)
        .opt_param("categories", params.categories.as_deref())
        .opt_param("engines", params.engines.as_deref())
        .param("language", &params.language)
        .param("page", &params.page)
        .opt_param("time_range", params.time_range.map(|t| t.as_str()))
        .param("rerank", params.rerank);
    page_key_params(key, page)
}

/// First `limit` distinct non-empty result URLs, in backend order.
pub(crate) fn top_urls(results: &[SearchResult], limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    results
        .iter()
        .map(|r| r.url.trim())
        .filter(|u| !u.is_empty())
        .filter(|u| seen.insert(u.to_string()))
        .take(limit)
        .map(|u| u.to_string())
        .collect()
}

/// Fetches every URL through the orchestrator and extractor with the shared
/// page fan-out.
pub async fn fetch_pages(
    state: &Arc<AppState>,
    urls: Vec<String>,
    page: &PageOptions,
) -> FanOutResult<String, PageResult> {
    let shared = Arc::clone(state);
    let page = page.clone();
    state
        .fanout
        .run(urls, move |url| {
            let state = Arc::clone(&shared);
            let target = page.target(url);
            let extract = page.extract.clone();
            async move {
                fetch_page(&state, &target, &extract)
                    .await
                    .map_err(anyhow::Error::from)
            }
        })
        .await
}

/// Search, then fetch and extract the top `num_results` hits concurrently.
/// A search failure aborts the job; page failures become entries.
pub async fn search_and_fetch(
    state: &Arc<AppState>,
    params: &SearchParams,
    num_results: usize,
    page: &PageOptions,
) -> Result<SearchAndFetchResponse, SearchError> {
    let key = search_fetch_cache_key(params, num_results, page);
    if let Some(hit) = state.cache.get::<SearchAndFetchResponse>(&key).await {
        return Ok(hit);
    }

    let search = search_web(state, params).await?;
    let urls = top_urls(&search.results, num_results);
    info!(
        "search-and-fetch '{}': fetching {} of {} results",
        params.query,
        urls.len(),
        search.results.len()
    );

    let pages = fetch_pages(state, urls, page).await;
    let response = SearchAndFetchResponse {
        query: search.query,
        number_of_results: search.number_of_results,
        suggestions: search.suggestions,
        pages,
    };

    if response.pages.successful > 0 {
        state.cache.set(&key, &response).await;
    }
    Ok(response)
}
