//! Multi-query research: one search plus page fan-out per query, run
//! concurrently, then compiled into a single Markdown report.

use crate::core::types::*;
use crate::tools::cache::{CacheKey, CacheOp};
use crate::tools::search::search_web;
use crate::tools::search_fetch::{fetch_pages, page_key_params, top_urls};
use crate::AppState;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use url::Url;

pub fn research_cache_key(job: &ResearchJob, language: &str, page: &PageOptions) -> CacheKey {
    let key = CacheKey::new(CacheOp::Research)
        .list_param("queries", job.queries())
        .param("breadth", job.breadth())
        .param("language", language);
    page_key_params(key, page)
}

async fn research_query(
    state: Arc<AppState>,
    query: String,
    breadth: usize,
    language: String,
    page: PageOptions,
) -> anyhow::Result<QueryResearch> {
    let mut params = SearchParams::new(query.clone());
    params.language = language;
    let search = search_web(&state, &params).await?;

    let urls = top_urls(&search.results, breadth);
    let pages = fetch_pages(&state, urls, &page).await;
    Ok(QueryResearch {
        query,
        number_of_results: search.number_of_results,
        suggestions: search.suggestions,
        pages,
    })
}

/// Runs every query of `job` with the query-level fan-out. A query whose
/// search fails becomes an error entry; the others still complete.
pub async fn deep_research(
    state: &Arc<AppState>,
    job: &ResearchJob,
    language: &str,
    page: &PageOptions,
) -> ResearchReport {
    let key = research_cache_key(job, language, page);
    if let Some(hit) = state.cache.get::<ResearchReport>(&key).await {
        return hit;
    }

    let started = Instant::now();
    info!(
        "deep research: {} queries, breadth {}",
        job.queries().len(),
        job.breadth()
    );

    let shared = Arc::clone(state);
    let breadth = job.breadth();
    let language = language.to_string();
    let page_opts = page.clone();
    let per_query = state
        .query_fanout
        .run(job.queries().to_vec(), move |query| {
            research_query(
                Arc::clone(&shared),
                query,
                breadth,
                language.clone(),
                page_opts.clone(),
            )
        })
        .await;

    let generated_at = chrono::Utc::now().to_rfc3339();
    let report = build_report(
        job,
        per_query.results,
        state.config.resolve_research_entry_chars(),
        generated_at,
        started.elapsed().as_millis() as u64,
    );
    info!(
        "deep research finished: {}/{} queries, {} pages ok, {} failed",
        report.successful_queries,
        job.queries().len(),
        report.pages_successful,
        report.pages_failed
    );

    if report.pages_successful > 0 {
        state.cache.set(&key, &report).await;
    }
    report
}

fn build_report(
    job: &ResearchJob,
    per_query: Vec<FanOutEntry<String, QueryResearch>>,
    entry_chars: usize,
    generated_at: String,
    total_duration_ms: u64,
) -> ResearchReport {
    let successful_queries = per_query.iter().filter(|e| e.is_success()).count();
    let (pages_successful, pages_failed) = per_query
        .iter()
        .filter_map(|e| e.payload.as_ref())
        .fold((0, 0), |(ok, failed), q| {
            (ok + q.pages.successful, failed + q.pages.failed)
        });

    let suggestions = merge_suggestions(
        per_query
            .iter()
            .filter_map(|e| e.payload.as_ref())
            .flat_map(|q| q.suggestions.iter()),
    );
    let document = compile_document(&per_query, entry_chars, &generated_at);

    ResearchReport {
        queries: job.queries().to_vec(),
        breadth: job.breadth(),
        successful_queries,
        failed_queries: per_query.len() - successful_queries,
        pages_successful,
        pages_failed,
        suggestions,
        per_query,
        document,
        generated_at,
        total_duration_ms,
    }
}

/// Case-insensitive dedupe keeping first spelling and order, capped.
fn merge_suggestions<'a>(items: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .take(MAX_RESEARCH_SUGGESTIONS)
        .map(|s| s.to_string())
        .collect()
}

fn excerpt(content: &str, max_chars: usize) -> String {
    let content = content.trim();
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let cut: String = content.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

fn source_label(page: &PageResult) -> String {
    if let Some(site) = page.extracted.metadata.site_name.as_deref() {
        if !site.trim().is_empty() {
            return site.trim().to_string();
        }
    }
    Url::parse(&page.final_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| page.final_url.clone())
}

pub fn compile_document(
    per_query: &[FanOutEntry<String, QueryResearch>],
    entry_chars: usize,
    generated_at: &str,
) -> String {
    let mut doc = String::new();
    let queries: Vec<&str> = per_query.iter().map(|e| e.target.as_str()).collect();
    let _ = writeln!(doc, "# Research Report\n");
    let _ = writeln!(doc, "**Queries:** {}  ", queries.join(", "));
    let _ = writeln!(doc, "**Generated:** {}\n", generated_at);

    for entry in per_query {
        let _ = writeln!(doc, "## {}\n", entry.target);
        let Some(research) = entry.payload.as_ref() else {
            let _ = writeln!(
                doc,
                "_Search failed for this query: {}_\n",
                entry.error_detail.as_deref().unwrap_or("unknown error")
            );
            continue;
        };
        if research.pages.results.is_empty() {
            doc.push_str("_No results found for this query._\n\n");
            continue;
        }

        for (i, page_entry) in research.pages.results.iter().enumerate() {
            match page_entry.payload.as_ref() {
                Some(page) => {
                    let meta = &page.extracted.metadata;
                    let title = if meta.title.trim().is_empty() {
                        page.final_url.as_str()
                    } else {
                        meta.title.trim()
                    };
                    let _ = writeln!(doc, "### {}. {}\n", i + 1, title);
                    let _ = writeln!(doc, "- **Source:** {}", source_label(page));
                    if let Some(author) = meta.author.as_deref() {
                        let _ = writeln!(doc, "- **Author:** {}", author);
                    }
                    if let Some(date) = meta.published_date.as_deref() {
                        let _ = writeln!(doc, "- **Published:** {}", date);
                    }
                    let _ = writeln!(doc, "- **Link:** {}\n", page.final_url);
                    let _ = writeln!(doc, "{}\n", excerpt(&page.extracted.content, entry_chars));
                }
                None => {
                    let _ = writeln!(doc, "### {}. {}\n", i + 1, page_entry.target);
                    let _ = writeln!(
                        doc,
                        "_Failed to fetch this page: {}_\n",
                        page_entry.error_detail.as_deref().unwrap_or("unknown error")
                    );
                }
            }
        }
    }
    doc
}
