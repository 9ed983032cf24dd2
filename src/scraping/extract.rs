//! HTML → structured page content.
//!
//! `article` mode isolates the main content with readability and falls back
//! to the whole body when readability finds nothing; `full` mode always uses
//! the body. Headings, links and images are collected from the same content
//! scope that produced the text.

use crate::core::types::{
    ExtractOptions, ExtractedContent, ExtractionMode, Heading, Image, Link, OutputFormat,
    PageMetadata,
};
use readability::extractor;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, warn};
use url::Url;
use whatlang::{detect, Lang};

const MAX_IMAGES: usize = 20;
const TITLE_SEPARATORS: &[&str] = &[" | ", " - ", " – ", " — ", " :: ", " » ", " / "];

pub fn extract(html: &str, page_url: &str, options: &ExtractOptions) -> ExtractedContent {
    let base = Url::parse(page_url).ok();
    let document = Html::parse_document(html);
    let stripped = strip_non_content(html);

    let (title_hint, content_html) = match options.mode {
        ExtractionMode::Article => match readable_article(&stripped, base.as_ref()) {
            Some((title, content)) => (Some(title), content),
            None => (None, body_html(&stripped)),
        },
        ExtractionMode::Full => (None, body_html(&stripped)),
    };
    let scope = Html::parse_fragment(&content_html);

    let title = title_hint
        .filter(|t| !t.trim().is_empty())
        .map(|t| t.trim().to_string())
        .unwrap_or_else(|| extract_title(&document));

    let raw_content = match options.format {
        OutputFormat::Text => fragment_text(&scope),
        OutputFormat::Markdown => html2md::parse_html(&content_html).trim().to_string(),
        OutputFormat::Html => content_html.trim().to_string(),
    };
    let word_count = match options.format {
        OutputFormat::Text => count_words(&raw_content),
        _ => count_words(&fragment_text(&scope)),
    };
    let (content, truncated) = truncate_chars(raw_content, options.max_content_length);

    let links = options.include_links.then(|| {
        let mut links = collect_links(&scope, base.as_ref());
        links.truncate(options.max_links);
        links
    });

    let metadata = PageMetadata {
        title: title.clone(),
        url: page_url.to_string(),
        status_code: 0,
        content_type: String::new(),
        description: meta_content(&document, "meta[name=\"description\"]")
            .or_else(|| meta_content(&document, "meta[property=\"og:description\"]")),
        author: meta_content(&document, "meta[name=\"author\"]")
            .or_else(|| meta_content(&document, "meta[property=\"article:author\"]")),
        published_date: meta_content(&document, "meta[property=\"article:published_time\"]")
            .or_else(|| meta_content(&document, "meta[name=\"date\"]"))
            .or_else(|| time_datetime(&document)),
        site_name: meta_content(&document, "meta[property=\"og:site_name\"]"),
        language: detect_language(&document, &fragment_text(&scope)),
    };

    ExtractedContent {
        short_title: short_title(&title),
        metadata,
        format: options.format,
        content,
        word_count,
        truncated,
        headings: collect_headings(&scope),
        links,
        images: collect_images(&scope, base.as_ref()),
        html: options.include_html.then(|| content_html.clone()),
    }
}

/// Every distinct `http(s)` link on the whole page, resolved against `base`
/// with fragments removed. Used by the crawler.
pub fn page_links(html: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if skip_href(href) {
                continue;
            }
            let Ok(mut url) = base.join(href.trim()) else {
                continue;
            };
            if url.scheme() != "http" && url.scheme() != "https" {
                continue;
            }
            url.set_fragment(None);
            if seen.insert(url.to_string()) {
                out.push(url);
            }
        }
    }
    out
}

/// Drops the longest site-name decoration from a page title.
pub fn short_title(title: &str) -> String {
    let title = title.trim();
    for sep in TITLE_SEPARATORS {
        if title.contains(sep) {
            let best = title
                .split(sep)
                .map(str::trim)
                .max_by_key(|part| part.chars().count())
                .unwrap_or(title);
            if best.split_whitespace().count() >= 2 {
                return best.to_string();
            }
        }
    }
    title.to_string()
}

fn readable_article(html: &str, base: Option<&Url>) -> Option<(String, String)> {
    let base = base?;
    if html.trim().is_empty() {
        return None;
    }
    match extractor::extract(&mut html.as_bytes(), base) {
        Ok(product) if !product.text.trim().is_empty() => Some((product.title, product.content)),
        Ok(_) => {
            debug!("readability found no article content for {}", base);
            None
        }
        Err(e) => {
            warn!("readability extraction failed for {}: {}", base, e);
            None
        }
    }
}

static NON_CONTENT: OnceLock<Option<Regex>> = OnceLock::new();

fn non_content_matcher() -> Option<&'static Regex> {
    NON_CONTENT
        .get_or_init(|| {
            Regex::new(
                r"(?is)<(script|style|noscript|template|svg|iframe)\b[^>]*>.*?</(script|style|noscript|template|svg|iframe)\s*>",
            )
            .ok()
        })
        .as_ref()
}

fn strip_non_content(html: &str) -> String {
    match non_content_matcher() {
        Some(re) => re.replace_all(html, " ").into_owned(),
        None => html.to_string(),
    }
}

fn body_html(html: &str) -> String {
    let document = Html::parse_document(html);
    if let Ok(selector) = Selector::parse("body") {
        if let Some(body) = document.select(&selector).next() {
            return body.inner_html();
        }
    }
    html.to_string()
}

fn extract_title(document: &Html) -> String {
    for sel in ["title", "meta[property=\"og:title\"]", "h1"] {
        if let Ok(selector) = Selector::parse(sel) {
            if let Some(element) = document.select(&selector).next() {
                let text = if sel.starts_with("meta") {
                    element.value().attr("content").unwrap_or("").to_string()
                } else {
                    element.text().collect::<String>()
                };
                let text = text.trim();
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
    }
    "No Title".to_string()
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .filter_map(|e| e.value().attr("content"))
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

fn time_datetime(document: &Html) -> Option<String> {
    let selector = Selector::parse("time[datetime]").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|e| e.value().attr("datetime"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn detect_language(document: &Html, text: &str) -> Option<String> {
    if let Ok(selector) = Selector::parse("html") {
        if let Some(lang) = document
            .select(&selector)
            .next()
            .and_then(|e| e.value().attr("lang"))
        {
            let lang = lang.trim();
            if !lang.is_empty() {
                return Some(lang.to_string());
            }
        }
    }

    let info = detect(text)?;
    if !info.is_reliable() {
        return None;
    }
    let code = match info.lang() {
        Lang::Eng => "en",
        Lang::Spa => "es",
        Lang::Fra => "fr",
        Lang::Deu => "de",
        Lang::Ita => "it",
        Lang::Por => "pt",
        Lang::Rus => "ru",
        Lang::Jpn => "ja",
        Lang::Kor => "ko",
        Lang::Cmn => "zh",
        other => other.code(),
    };
    Some(code.to_string())
}

/// Text nodes, trimmed, one per line.
fn fragment_text(fragment: &Html) -> String {
    fragment
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Cuts at a char boundary and appends `...` when over `max` characters.
fn truncate_chars(content: String, max: usize) -> (String, bool) {
    if content.chars().count() <= max {
        return (content, false);
    }
    let mut cut: String = content.chars().take(max).collect();
    cut.push_str("...");
    (cut, true)
}

fn skip_href(href: &str) -> bool {
    let href = href.trim();
    href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
}

fn collect_links(scope: &Html, base: Option<&Url>) -> Vec<Link> {
    let mut links = Vec::new();
    let mut seen = HashSet::new();
    if let Ok(selector) = Selector::parse("a[href]") {
        for element in scope.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if skip_href(href) {
                continue;
            }
            let url = resolve(base, href);
            if seen.insert(url.clone()) {
                links.push(Link {
                    text: element.text().collect::<String>().trim().to_string(),
                    url,
                });
            }
        }
    }
    links
}

fn collect_headings(scope: &Html) -> Vec<Heading> {
    let mut headings = Vec::new();
    if let Ok(selector) = Selector::parse("h1, h2, h3") {
        for element in scope.select(&selector) {
            let text = element.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                headings.push(Heading {
                    level: element.value().name().to_string(),
                    text,
                });
            }
        }
    }
    headings
}

fn collect_images(scope: &Html, base: Option<&Url>) -> Vec<Image> {
    let mut images = Vec::new();
    let mut seen = HashSet::new();
    if let Ok(selector) = Selector::parse("img[src]") {
        for element in scope.select(&selector) {
            let Some(src) = element.value().attr("src") else {
                continue;
            };
            if src.trim().is_empty() || src.starts_with("data:") {
                continue;
            }
            let url = resolve(base, src);
            if seen.insert(url.clone()) {
                images.push(Image {
                    url,
                    alt: element.value().attr("alt").unwrap_or("").trim().to_string(),
                });
            }
            if images.len() >= MAX_IMAGES {
                break;
            }
        }
    }
    images
}

fn resolve(base: Option<&Url>, href: &str) -> String {
    base.and_then(|b| b.join(href.trim()).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| href.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> String {
        let paragraphs = (0..12)
            .map(|i| {
                format!(
                    "<p>Paragraph {} explains how the borrow checker enforces aliasing rules \
                     across function boundaries, with enough words to look like an article.</p>",
                    i
                )
            })
            .collect::<String>();
        format!(
            r#"<html lang="en"><head>
                <title>Understanding Ownership | The Rust Blog</title>
                <meta name="description" content="A tour of ownership.">
                <meta name="author" content="Ferris">
                <meta property="article:published_time" content="2024-05-01T10:00:00Z">
                <meta property="og:site_name" content="Rust Blog">
                <script>var tracking = "ignore me";</script>
            </head><body>
                <nav><a href="/home">Home</a></nav>
                <article>
                    <h1>Understanding Ownership</h1>
                    <h2>Moves</h2>
                    {}
                    <a href="/book/ch04">Chapter 4</a>
                    <a href="https://doc.rust-lang.org/std/">std docs</a>
                    <a href="javascript:void(0)">noop</a>
                    <img src="/img/ferris.png" alt="Ferris">
                </article>
            </body></html>"#,
            paragraphs
        )
    }

    #[test]
    fn test_full_mode_text_extraction() {
        let options = ExtractOptions {
            mode: ExtractionMode::Full,
            ..ExtractOptions::default()
        };
        let out = extract(&sample_page(), "https://blog.example.com/ownership", &options);

        assert_eq!(out.metadata.title, "Understanding Ownership | The Rust Blog");
        assert_eq!(out.short_title, "Understanding Ownership");
        assert_eq!(out.metadata.description.as_deref(), Some("A tour of ownership."));
        assert_eq!(out.metadata.author.as_deref(), Some("Ferris"));
        assert_eq!(out.metadata.site_name.as_deref(), Some("Rust Blog"));
        assert_eq!(out.metadata.language.as_deref(), Some("en"));
        assert!(out.content.contains("borrow checker"));
        assert!(!out.content.contains("ignore me"));
        assert!(!out.truncated);
        assert!(out.word_count > 100);
        assert!(out.html.is_none());

        let links = out.links.unwrap();
        assert!(links
            .iter()
            .any(|l| l.url == "https://blog.example.com/book/ch04" && l.text == "Chapter 4"));
        assert!(links.iter().all(|l| !l.url.starts_with("javascript:")));
        assert_eq!(out.images[0].url, "https://blog.example.com/img/ferris.png");
        assert_eq!(out.headings[0].level, "h1");
        assert_eq!(out.headings[1].text, "Moves");
    }

    #[test]
    fn test_truncation_and_link_limits() {
        let options = ExtractOptions {
            mode: ExtractionMode::Full,
            max_content_length: 40,
            max_links: 1,
            include_html: true,
            ..ExtractOptions::default()
        };
        let out = extract(&sample_page(), "https://blog.example.com/ownership", &options);
        assert!(out.truncated);
        assert_eq!(out.content.chars().count(), 43);
        assert!(out.content.ends_with("..."));
        assert_eq!(out.links.unwrap().len(), 1);
        assert!(out.html.is_some());
    }

    #[test]
    fn test_links_can_be_omitted() {
        let options = ExtractOptions {
            include_links: false,
            format: OutputFormat::Markdown,
            ..ExtractOptions::default()
        };
        let out = extract(&sample_page(), "https://blog.example.com/ownership", &options);
        assert!(out.links.is_none());
        assert!(out.content.contains("borrow checker"));
    }

    #[test]
    fn test_non_content_blocks_are_stripped() {
        assert!(non_content_matcher().is_some());
        let html = "<p>keep</p><script type=\"x\">drop()</script><STYLE>.a{}</STYLE><p>also</p>";
        let stripped = strip_non_content(html);
        assert!(stripped.contains("keep"));
        assert!(stripped.contains("also"));
        assert!(!stripped.contains("drop()"));
        assert!(!stripped.contains(".a{}"));
        // Same compiled matcher on every call.
        assert!(std::ptr::eq(
            non_content_matcher().unwrap(),
            non_content_matcher().unwrap()
        ));
    }

    #[test]
    fn test_empty_page_does_not_panic() {
        let out = extract("", "https://example.com/", &ExtractOptions::default());
        assert_eq!(out.metadata.title, "No Title");
        assert_eq!(out.word_count, 0);
    }

    #[test]
    fn test_page_links_for_crawling() {
        let base = Url::parse("https://blog.example.com/ownership").unwrap();
        let links = page_links(&sample_page(), &base);
        let as_str: Vec<String> = links.iter().map(|u| u.to_string()).collect();
        assert!(as_str.contains(&"https://blog.example.com/home".to_string()));
        assert!(as_str.contains(&"https://doc.rust-lang.org/std/".to_string()));
        assert!(!as_str.iter().any(|u| u.starts_with("javascript")));
    }

    #[test]
    fn test_short_title() {
        assert_eq!(short_title("Tokio Tutorial - Tokio"), "Tokio Tutorial");
        assert_eq!(short_title("Home"), "Home");
        assert_eq!(short_title("A | B"), "A | B");
    }
}
