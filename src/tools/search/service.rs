use crate::core::error::SearchError;
use crate::core::types::{SearchParams, SearchResponse, SearchResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(&self, params: &SearchParams) -> Result<SearchResponse, SearchError>;

    /// True when the backend answers its base URL with HTTP 200.
    async fn health(&self) -> bool;

    fn base_url(&self) -> &str;
}

/// SearXNG JSON API client.
#[derive(Debug, Clone)]
pub struct SearxngService {
    client: reqwest::Client,
    base_url: String,
}

impl SearxngService {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn search_url(&self, params: &SearchParams) -> Result<Url, SearchError> {
        let mut url = Url::parse(&format!("{}/search", self.base_url))
            .map_err(|e| SearchError::Unreachable(format!("bad backend url: {}", e)))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", &params.query);
            pairs.append_pair("format", "json");
            pairs.append_pair("language", &params.language);
            pairs.append_pair("pageno", &params.page);
            if let Some(categories) = params.categories.as_deref().filter(|c| !c.is_empty()) {
                pairs.append_pair("categories", categories);
            }
            if let Some(engines) = params.engines.as_deref().filter(|e| !e.is_empty()) {
                pairs.append_pair("engines", engines);
            }
            if let Some(range) = params.time_range {
                pairs.append_pair("time_range", range.as_str());
            }
        }
        Ok(url)
    }
}

// SearXNG omits or nulls fields depending on the engine, so everything is optional here.
#[derive(Debug, Default, Deserialize)]
struct RawResponse {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    number_of_results: serde_json::Value,
    #[serde(default)]
    results: Vec<RawResult>,
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(default)]
    infoboxes: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    engine: Option<String>,
    #[serde(default)]
    parsed_url: Option<Vec<String>>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    img_src: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(rename = "publishedDate", default)]
    published_date: Option<String>,
}

impl From<RawResult> for SearchResult {
    fn from(raw: RawResult) -> Self {
        SearchResult {
            title: raw.title.unwrap_or_default(),
            url: raw.url.unwrap_or_default(),
            content: raw.content.unwrap_or_default(),
            engine: raw.engine.unwrap_or_default(),
            parsed_url: raw.parsed_url.unwrap_or_default(),
            score: raw.score.unwrap_or(0.0),
            img_src: raw.img_src,
            thumbnail: raw.thumbnail,
            published_date: raw.published_date,
        }
    }
}

impl RawResponse {
    fn into_response(self, fallback_query: &str) -> SearchResponse {
        let number_of_results = self
            .number_of_results
            .as_u64()
            .or_else(|| self.number_of_results.as_f64().map(|n| n.max(0.0) as u64))
            .unwrap_or(0);
        SearchResponse {
            query: self.query.unwrap_or_else(|| fallback_query.to_string()),
            number_of_results,
            results: self.results.into_iter().map(SearchResult::from).collect(),
            suggestions: self.suggestions,
            infoboxes: self.infoboxes,
        }
    }
}

#[async_trait]
impl SearchService for SearxngService {
    async fn search(&self, params: &SearchParams) -> Result<SearchResponse, SearchError> {
        let url = self.search_url(params)?;
        debug!("searxng request: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(SearchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(200).collect();
            warn!("searxng returned {} for '{}'", status.as_u16(), params.query);
            return Err(SearchError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        let raw: RawResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;
        Ok(raw.into_response(&params.query))
    }

    async fn health(&self) -> bool {
        match self
            .client
            .get(&self.base_url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp.status() == reqwest::StatusCode::OK,
            Err(e) => {
                debug!("searxng health probe failed: {}", e);
                false
            }
        }
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
