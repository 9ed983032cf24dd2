use super::PageFetcher;
use crate::core::error::FetchError;
use crate::core::types::{FetchOutcome, StealthLevel};
use crate::features::antibot::ProfilePool;
use reqwest::{redirect::Policy, Client, Proxy};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Statuses that anti-bot vendors serve their interstitials with. The body is
/// handed to the classifier instead of being dropped as a transport failure.
const BLOCK_PAGE_STATUSES: &[u16] = &[403, 429, 503];

/// Builds the shared outbound client: redirects capped at 10, compressed
/// bodies decoded transparently.
pub fn build_http_client(timeout: Duration, connect_timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(connect_timeout)
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
}

/// Client for `high` that tunnels every request through `proxy_url`, e.g. a
/// browser-impersonating egress that rewrites the TLS and HTTP/2 fingerprint.
pub fn build_high_transport(
    timeout: Duration,
    connect_timeout: Duration,
    proxy_url: &str,
) -> reqwest::Result<Client> {
    Client::builder()
        .proxy(Proxy::all(proxy_url)?)
        .timeout(timeout)
        .connect_timeout(connect_timeout)
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
}

pub struct StealthClient {
    client: Client,
    /// Separate egress used at `high`.
    high_transport: Option<Client>,
    profiles: Arc<ProfilePool>,
}

impl StealthClient {
    pub fn new(client: Client, profiles: Arc<ProfilePool>) -> Self {
        Self {
            client,
            high_transport: None,
            profiles,
        }
    }

    pub fn with_high_transport(mut self, client: Client) -> Self {
        self.high_transport = Some(client);
        self
    }

    fn client_for(&self, level: StealthLevel) -> &Client {
        match (level, &self.high_transport) {
            (StealthLevel::High, Some(transport)) => transport,
            (StealthLevel::High, None) => {
                debug!("no high-stealth transport configured; high uses medium headers only");
                &self.client
            }
            _ => &self.client,
        }
    }
}

#[async_trait::async_trait]
impl PageFetcher for StealthClient {
    async fn fetch(&self, url: &str, level: StealthLevel) -> Result<FetchOutcome, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        debug!("GET {} at stealth level {}", parsed, level);
        let response = self
            .client_for(level)
            .get(parsed)
            .headers(self.profiles.headers_for(level))
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() && !BLOCK_PAGE_STATUSES.contains(&status.as_u16()) {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let html = response.text().await.map_err(FetchError::from_reqwest)?;

        Ok(FetchOutcome {
            html,
            status_code: status.as_u16(),
            final_url,
            content_type,
            method_used: level,
            protection: None,
            bypassed: None,
            attempts: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> StealthClient {
        let http = build_http_client(Duration::from_secs(5), Duration::from_secs(2)).unwrap();
        StealthClient::new(http, Arc::new(ProfilePool::new()))
    }

    #[tokio::test]
    async fn test_records_final_url_after_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("location", "/new"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html><body>moved</body></html>", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let outcome = client()
            .fetch(&format!("{}/old", server.uri()), StealthLevel::Off)
            .await
            .unwrap();
        assert_eq!(outcome.final_url, format!("{}/new", server.uri()));
        assert_eq!(outcome.status_code, 200);
        assert!(outcome.content_type.starts_with("text/html"));
        assert_eq!(outcome.method_used, StealthLevel::Off);
        assert!(outcome.html.contains("moved"));
    }

    #[tokio::test]
    async fn test_medium_sends_client_hints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header_exists("sec-ch-ua"))
            .and(header("referer", "https://www.google.com/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client()
            .fetch(&format!("{}/", server.uri()), StealthLevel::Medium)
            .await
            .unwrap();
        assert_eq!(outcome.html, "ok");
    }

    #[tokio::test]
    async fn test_high_goes_through_its_own_transport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("x-egress", "high"))
            .respond_with(ResponseTemplate::new(200).set_body_string("via high"))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("direct"))
            .with_priority(5)
            .mount(&server)
            .await;

        let mut marker = reqwest::header::HeaderMap::new();
        marker.insert("x-egress", reqwest::header::HeaderValue::from_static("high"));
        let transport = Client::builder().default_headers(marker).build().unwrap();
        let stealth = client().with_high_transport(transport);

        let high = stealth.fetch(&server.uri(), StealthLevel::High).await.unwrap();
        assert_eq!(high.html, "via high");
        assert_eq!(high.method_used, StealthLevel::High);

        let medium = stealth.fetch(&server.uri(), StealthLevel::Medium).await.unwrap();
        assert_eq!(medium.html, "direct");
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client()
            .fetch(&format!("{}/missing", server.uri()), StealthLevel::Low)
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::HttpStatus(404));
    }

    #[tokio::test]
    async fn test_block_status_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("<title>Just a moment...</title>"))
            .mount(&server)
            .await;

        let outcome = client()
            .fetch(&server.uri(), StealthLevel::Off)
            .await
            .unwrap();
        assert_eq!(outcome.status_code, 403);
        assert!(outcome.html.contains("Just a moment"));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let err = client()
            .fetch("http://127.0.0.1:9/", StealthLevel::Off)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::Connection(_) | FetchError::Timeout(_)
        ));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let err = client()
            .fetch("not a url", StealthLevel::Off)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_url");
    }
}
