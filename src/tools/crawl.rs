use crate::core::types::*;
use crate::scraping::extract::{extract, page_links};
use crate::tools::cache::{CacheKey, CacheOp};
use crate::AppState;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use url::Url;

pub const MAX_CRAWL_PAGES: usize = 200;
pub const MAX_CRAWL_DEPTH: usize = 5;
const PREVIEW_CHARS: usize = 300;

/// Paths and extensions that never hold readable pages.
const EXCLUDE_PATTERNS: &[&str] = &[
    "/login", "/logout", "/signup", "/register", "/cart", "/checkout", ".pdf", ".zip", ".exe",
    ".dmg", ".tar", ".gz", ".mp4", ".mp3", ".wav", ".avi", ".mov", ".jpg", ".jpeg", ".png",
    ".gif", ".svg", ".webp", ".css", ".js", ".xml", ".ico", ".woff", ".woff2",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOptions {
    pub max_pages: usize,
    pub max_depth: usize,
    pub same_domain_only: bool,
    pub stealth_level: StealthLevel,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_pages: 20,
            max_depth: 2,
            same_domain_only: true,
            stealth_level: StealthLevel::Off,
        }
    }
}

pub fn crawl_cache_key(start: &Url, options: &CrawlOptions) -> CacheKey {
    CacheKey::new(CacheOp::Crawl)
        .param("start_url", start)
        .param("max_pages", options.max_pages)
        .param("max_depth", options.max_depth)
        .param("same_domain_only", options.same_domain_only)
        .param("stealth_mode", options.stealth_level)
}

/// What one crawled page contributes: its summary and the links to follow.
#[derive(Debug)]
struct Visit {
    title: String,
    word_count: usize,
    preview: String,
    links: Vec<Url>,
}

/// Dedup key: fragment dropped, trailing slash trimmed.
fn normalize_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    let mut s = url.to_string();
    if s.ends_with('/') {
        s.pop();
    }
    s
}

fn base_domain(url: &Url) -> String {
    url.host_str()
        .unwrap_or_default()
        .trim_start_matches("www.")
        .to_ascii_lowercase()
}

/// Same host or a subdomain of it, when restricted; never an excluded asset.
fn should_crawl(url: &Url, base: &str, same_domain_only: bool) -> bool {
    if same_domain_only {
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let host = host.trim_start_matches("www.");
        if host != base && !host.ends_with(&format!(".{}", base)) {
            return false;
        }
    }
    let path = url.path().to_ascii_lowercase();
    !EXCLUDE_PATTERNS.iter().any(|p| path.contains(p))
}

async fn visit(state: Arc<AppState>, url: Url, level: StealthLevel) -> anyhow::Result<Visit> {
    let target = FetchTarget::new(url.as_str()).with_stealth(level);
    let outcome = state.orchestrator.run(&target).await?;

    let base = Url::parse(&outcome.final_url).unwrap_or(url);
    let options = ExtractOptions {
        mode: ExtractionMode::Full,
        include_links: false,
        ..Default::default()
    };
    let content = extract(&outcome.html, base.as_str(), &options);
    let preview: String = content.content.chars().take(PREVIEW_CHARS).collect();

    Ok(Visit {
        title: content.metadata.title,
        word_count: content.word_count,
        preview,
        links: page_links(&outcome.html, &base),
    })
}

/// Breadth-first crawl. Each depth level is one page fan-out; links found at
/// depth `d` are queued for `d + 1` until `max_depth` or `max_pages` is hit.
pub async fn crawl_site(state: &Arc<AppState>, start: Url, options: &CrawlOptions) -> CrawlReport {
    let key = crawl_cache_key(&start, options);
    if let Some(hit) = state.cache.get::<CrawlReport>(&key).await {
        return hit;
    }

    let started = Instant::now();
    let base = base_domain(&start);
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(normalize_url(&start));

    let mut frontier = vec![start.clone()];
    let mut pages: Vec<CrawlPage> = Vec::new();
    let mut max_depth_reached = 0;

    for depth in 0..=options.max_depth {
        let remaining = options.max_pages.saturating_sub(pages.len());
        if frontier.is_empty() || remaining == 0 {
            break;
        }
        frontier.truncate(remaining);
        max_depth_reached = depth;
        info!("crawl depth {}: {} pages", depth, frontier.len());

        let shared = Arc::clone(state);
        let level = options.stealth_level;
        let batch = state
            .fanout
            .run(std::mem::take(&mut frontier), move |url| {
                visit(Arc::clone(&shared), url, level)
            })
            .await;

        for entry in batch.results {
            let url = entry.target.to_string();
            match entry.payload {
                Some(found) => {
                    if depth < options.max_depth {
                        for link in &found.links {
                            if should_crawl(link, &base, options.same_domain_only)
                                && visited.insert(normalize_url(link))
                            {
                                frontier.push(link.clone());
                            }
                        }
                    }
                    pages.push(CrawlPage {
                        url,
                        depth,
                        status: EntryStatus::Success,
                        title: Some(found.title),
                        word_count: Some(found.word_count),
                        links_found: Some(found.links.len()),
                        content_preview: Some(found.preview),
                        error: None,
                        duration_ms: entry.duration_ms,
                    });
                }
                None => pages.push(CrawlPage {
                    url,
                    depth,
                    status: EntryStatus::Error,
                    title: None,
                    word_count: None,
                    links_found: None,
                    content_preview: None,
                    error: entry.error_detail,
                    duration_ms: entry.duration_ms,
                }),
            }
        }
    }

    let pages_failed = pages
        .iter()
        .filter(|p| p.status == EntryStatus::Error)
        .count();
    let report = CrawlReport {
        start_url: start.to_string(),
        pages_crawled: pages.len() - pages_failed,
        pages_failed,
        max_depth_reached,
        total_duration_ms: started.elapsed().as_millis() as u64,
        pages,
    };
    info!(
        "crawl of {} finished: {} ok, {} failed",
        report.start_url, report.pages_crawled, report.pages_failed
    );

    if report.pages_crawled > 0 {
        state.cache.set(&key, &report).await;
    }
    report
}
