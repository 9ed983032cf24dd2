use crate::core::error::FetchError;
use crate::core::types::*;
use crate::scraping::extract::extract;
use crate::tools::cache::{CacheKey, CacheOp};
use crate::AppState;
use tracing::{debug, info};

/// Orchestrated fetch followed by extraction. Uncached: fan-out pipelines
/// call this directly so one slow cache store never serializes a batch.
pub async fn fetch_page(
    state: &AppState,
    target: &FetchTarget,
    options: &ExtractOptions,
) -> Result<PageResult, FetchError> {
    let outcome = state.orchestrator.run(target).await?;
    Ok(page_from_outcome(target, outcome, options))
}

fn page_from_outcome(
    target: &FetchTarget,
    outcome: FetchOutcome,
    options: &ExtractOptions,
) -> PageResult {
    let mut extracted = extract(&outcome.html, &outcome.final_url, options);
    extracted.metadata.status_code = outcome.status_code;
    extracted.metadata.content_type = outcome.content_type.clone();
    debug!(
        "extracted {} words from {} ({})",
        extracted.word_count,
        outcome.final_url,
        outcome.method_used
    );

    PageResult {
        url: target.url.clone(),
        final_url: outcome.final_url,
        status_code: outcome.status_code,
        method_used: outcome.method_used,
        bypassed: outcome.bypassed,
        protection: outcome.protection,
        attempts: outcome.attempts,
        extracted,
    }
}

/// Cache key for a single page: url, stealth_mode, auto_bypass, format,
/// extraction_mode, include_html, include_links, max_content_length.
pub fn fetch_cache_key(target: &FetchTarget, options: &ExtractOptions) -> CacheKey {
    CacheKey::new(CacheOp::Fetch)
        .param("url", &target.url)
        .param("stealth_mode", target.stealth_level)
        .param("auto_bypass", target.auto_bypass)
        .param("format", options.format.as_str())
        .param("extraction_mode", options.mode.as_str())
        .param("include_html", options.include_html)
        .param("include_links", options.include_links)
        .param("max_content_length", options.max_content_length)
}

/// `/fetch` entry point. Pages still classified as blocked are not cached so
/// a later request gets a fresh chance.
pub async fn fetch_page_cached(
    state: &AppState,
    target: &FetchTarget,
    options: &ExtractOptions,
) -> Result<PageResult, FetchError> {
    let key = fetch_cache_key(target, options);
    if let Some(hit) = state.cache.get::<PageResult>(&key).await {
        return Ok(hit);
    }

    info!("Fetching URL: {} (stealth={})", target.url, target.stealth_level);
    let page = fetch_page(state, target, options).await?;

    let blocked = page
        .protection
        .as_ref()
        .map(|v| v.is_blocked)
        .unwrap_or(false);
    if !blocked {
        state.cache.set(&key, &page).await;
    }
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_from_outcome_fills_transport_metadata() {
        let target = FetchTarget::new("https://example.com/a").with_stealth(StealthLevel::Low);
        let outcome = FetchOutcome {
            html: "<html><head><title>Hello</title></head><body><p>Some body text here.</p></body></html>"
                .to_string(),
            status_code: 200,
            final_url: "https://example.com/b".to_string(),
            content_type: "text/html; charset=utf-8".to_string(),
            method_used: StealthLevel::Low,
            protection: Some(ProtectionVerdict::unprotected()),
            bypassed: None,
            attempts: vec![FetchAttempt {
                level: StealthLevel::Low,
                result: AttemptResult::Clear,
            }],
        };
        let options = ExtractOptions {
            mode: ExtractionMode::Full,
            ..Default::default()
        };

        let page = page_from_outcome(&target, outcome, &options);
        assert_eq!(page.url, "https://example.com/a");
        assert_eq!(page.final_url, "https://example.com/b");
        assert_eq!(page.extracted.metadata.status_code, 200);
        assert_eq!(
            page.extracted.metadata.content_type,
            "text/html; charset=utf-8"
        );
        assert_eq!(page.extracted.metadata.url, "https://example.com/b");
        assert!(page.extracted.content.contains("Some body text here."));
        assert_eq!(page.attempts.len(), 1);
    }

    #[test]
    fn test_fetch_key_distinguishes_options() {
        let target = FetchTarget::new("https://example.com/");
        let text = fetch_cache_key(&target, &ExtractOptions::default());
        let markdown = fetch_cache_key(
            &target,
            &ExtractOptions {
                format: OutputFormat::Markdown,
                ..Default::default()
            },
        );
        let stealthy = fetch_cache_key(
            &target.clone().with_stealth(StealthLevel::Medium),
            &ExtractOptions::default(),
        );
        assert_ne!(text.as_str(), markdown.as_str());
        assert_ne!(text.as_str(), stealthy.as_str());
        assert!(text.as_str().starts_with("fetch|url=https://example.com/|stealth_mode=off"));
    }
}
