mod service;

use crate::core::error::SearchError;
use crate::core::types::{SearchParams, SearchResponse};
use crate::tools::cache::{CacheKey, CacheOp};
use crate::AppState;
use tracing::info;

pub use service::{SearchService, SearxngService};

/// Cache key for a search: q, categories, engines, language, page,
/// time_range, rerank.
pub fn search_cache_key(params: &SearchParams) -> CacheKey {
    CacheKey::new(CacheOp::Search)
        .param("q", &params.query)
        .opt_param("categories", params.categories.as_deref())
        .opt_param("engines", params.engines.as_deref())
        .param("language", &params.language)
        .param("page", &params.page)
        .opt_param("time_range", params.time_range.map(|t| t.as_str()))
        .param("rerank", params.rerank)
}

/// Backend search with caching and optional reranking.
pub async fn search_web(
    state: &AppState,
    params: &SearchParams,
) -> Result<SearchResponse, SearchError> {
    let key = search_cache_key(params);
    if let Some(hit) = state.cache.get::<SearchResponse>(&key).await {
        return Ok(hit);
    }

    info!("Searching for: {}", params.query);
    let mut response = state.search_service.search(params).await?;
    if params.rerank {
        let results = std::mem::take(&mut response.results);
        response.results = state.reranker.rerank(&params.query, results);
    }

    state.cache.set(&key, &response).await;
    Ok(response)
}
