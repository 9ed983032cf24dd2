use crate::core::config::GatewayConfig;
use crate::features::{ProfilePool, ProtectionClassifier};
use crate::nlp::Reranker;
use crate::scraping::stealth::build_high_transport;
use crate::scraping::{FetchOrchestrator, PageFetcher, StealthClient};
use crate::tools::search::{SearchService, SearxngService};
use crate::tools::{FanOutExecutor, ResponseCache};
use std::sync::Arc;
use tracing::warn;

/// Everything a request needs, built once at startup and shared read-only.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub search_service: Arc<dyn SearchService>,
    pub classifier: Arc<ProtectionClassifier>,
    pub orchestrator: Arc<FetchOrchestrator>,
    pub reranker: Arc<Reranker>,
    pub cache: ResponseCache,
    /// Page-level fan-out (search-and-fetch, research pages, crawl levels).
    pub fanout: FanOutExecutor,
    /// Query-level fan-out for research; its deadline covers a query's page fan-out.
    pub query_fanout: FanOutExecutor,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("searxng_url", &self.search_service.base_url())
            .field("cache", &self.cache)
            .field("fanout", &self.fanout)
            .finish()
    }
}

impl AppState {
    pub fn new(http_client: reqwest::Client, config: GatewayConfig) -> Self {
        let classifier = Arc::new(ProtectionClassifier::new());
        let mut stealth = StealthClient::new(http_client.clone(), Arc::new(ProfilePool::new()));
        if let Some(proxy_url) = config.resolve_high_stealth_proxy() {
            match build_high_transport(
                config.resolve_http_timeout(),
                config.resolve_connect_timeout(),
                &proxy_url,
            ) {
                Ok(transport) => stealth = stealth.with_high_transport(transport),
                Err(e) => warn!("high stealth proxy {} unusable: {}", proxy_url, e),
            }
        }
        let fetcher: Arc<dyn PageFetcher> = Arc::new(stealth);
        let search_service: Arc<dyn SearchService> = Arc::new(SearxngService::new(
            http_client,
            config.resolve_searxng_url(),
        ));

        let cache = if config.resolve_cache_enabled() {
            ResponseCache::memory(config.resolve_cache_max_entries())
        } else {
            ResponseCache::disabled()
        };

        let concurrency = config.resolve_fanout_concurrency();
        Self {
            search_service,
            orchestrator: Arc::new(FetchOrchestrator::new(fetcher, classifier.clone())),
            classifier,
            reranker: Arc::new(Reranker::new()),
            cache,
            fanout: FanOutExecutor::new(concurrency, config.resolve_fanout_task_timeout()),
            query_fanout: FanOutExecutor::new(
                concurrency,
                config.resolve_research_query_timeout(),
            ),
            config: Arc::new(config),
        }
    }

    pub fn with_search_service(mut self, search_service: Arc<dyn SearchService>) -> Self {
        self.search_service = search_service;
        self
    }

    /// Swaps the transport under the orchestrator, keeping the shared classifier.
    pub fn with_page_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.orchestrator = Arc::new(FetchOrchestrator::new(fetcher, self.classifier.clone()));
        self
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = cache;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraping::stealth::build_http_client;
    use std::time::Duration;

    fn client() -> reqwest::Client {
        build_http_client(Duration::from_secs(5), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_new_wires_backend_and_cache_from_config() {
        let config = GatewayConfig {
            searxng_url: Some("http://search.local:9000/".into()),
            cache_enabled: Some(false),
            fanout_concurrency: Some(3),
            ..Default::default()
        };
        let state = AppState::new(client(), config);
        assert_eq!(state.search_service.base_url(), "http://search.local:9000");
        assert!(!state.cache.is_enabled());
        assert_eq!(state.fanout.concurrency(), 3);
        assert_eq!(state.query_fanout.concurrency(), 3);
    }

    #[test]
    fn test_unusable_high_stealth_proxy_falls_back() {
        let config = GatewayConfig {
            high_stealth_proxy: Some("http://[::1".into()),
            cache_enabled: Some(false),
            ..Default::default()
        };
        let state = AppState::new(client(), config);
        assert!(format!("{:?}", state).contains("AppState"));
    }
}
