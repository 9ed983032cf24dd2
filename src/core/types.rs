use super::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Fetch model
// ─────────────────────────────────────────────────────────────────────────────

/// Tier of fetch evasion. Ordered: `Off < Low < Medium < High`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StealthLevel {
    #[default]
    Off,
    Low,
    Medium,
    High,
}

impl StealthLevel {
    pub const ALL: [StealthLevel; 4] = [
        StealthLevel::Off,
        StealthLevel::Low,
        StealthLevel::Medium,
        StealthLevel::High,
    ];

    pub fn parse_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Some(StealthLevel::Off),
            "low" => Some(StealthLevel::Low),
            "medium" => Some(StealthLevel::Medium),
            "high" => Some(StealthLevel::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StealthLevel::Off => "off",
            StealthLevel::Low => "low",
            StealthLevel::Medium => "medium",
            StealthLevel::High => "high",
        }
    }
}

impl fmt::Display for StealthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchTarget {
    pub url: String,
    pub stealth_level: StealthLevel,
    pub auto_bypass: bool,
}

impl FetchTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stealth_level: StealthLevel::Off,
            auto_bypass: false,
        }
    }

    pub fn with_stealth(mut self, level: StealthLevel) -> Self {
        self.stealth_level = level;
        self
    }

    pub fn with_auto_bypass(mut self, auto_bypass: bool) -> Self {
        self.auto_bypass = auto_bypass;
        self
    }
}

/// What happened at one rung of an orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AttemptResult {
    Clear,
    Blocked { confidence: f32 },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchAttempt {
    pub level: StealthLevel,
    #[serde(flatten)]
    pub result: AttemptResult,
}

/// Result of driving one `FetchTarget` through the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    #[serde(skip_serializing)]
    #[serde(default)]
    pub html: String,
    pub status_code: u16,
    /// URL after redirects.
    pub final_url: String,
    pub content_type: String,
    /// Stealth level that produced (or last tried to produce) this body.
    pub method_used: StealthLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection: Option<ProtectionVerdict>,
    /// `None` when no escalation was attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bypassed: Option<bool>,
    #[serde(default)]
    pub attempts: Vec<FetchAttempt>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Protection classification
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionMechanism {
    Challenge,
    Captcha,
    RateLimit,
    AccessDenied,
    BotManager,
}

impl ProtectionMechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtectionMechanism::Challenge => "challenge",
            ProtectionMechanism::Captcha => "captcha",
            ProtectionMechanism::RateLimit => "rate_limit",
            ProtectionMechanism::AccessDenied => "access_denied",
            ProtectionMechanism::BotManager => "bot_manager",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionVerdict {
    pub is_protected: bool,
    pub is_blocked: bool,
    pub mechanisms: BTreeSet<ProtectionMechanism>,
    /// In `[0.0, 1.0]`.
    pub confidence: f32,
    pub recommendation: String,
}

impl ProtectionVerdict {
    pub fn unprotected() -> Self {
        Self {
            is_protected: false,
            is_blocked: false,
            mechanisms: BTreeSet::new(),
            confidence: 0.0,
            recommendation: "No protection detected.".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Markdown,
    Html,
}

impl OutputFormat {
    pub fn parse_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Some(OutputFormat::Text),
            "markdown" | "md" => Some(OutputFormat::Markdown),
            "html" => Some(OutputFormat::Html),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Markdown => "markdown",
            OutputFormat::Html => "html",
        }
    }
}

/// `Article` isolates the main content (readability); `Full` keeps the whole body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    #[default]
    Article,
    Full,
}

impl ExtractionMode {
    pub fn parse_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "article" | "readability" => Some(ExtractionMode::Article),
            "full" => Some(ExtractionMode::Full),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Article => "article",
            ExtractionMode::Full => "full",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    pub format: OutputFormat,
    pub mode: ExtractionMode,
    pub include_links: bool,
    pub include_html: bool,
    pub max_content_length: usize,
    pub max_links: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            mode: ExtractionMode::Article,
            include_links: true,
            include_html: false,
            max_content_length: 50_000,
            max_links: 50,
        }
    }
}

/// Per-page request knobs shared by every endpoint that fetches pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageOptions {
    pub stealth_level: StealthLevel,
    pub auto_bypass: bool,
    pub extract: ExtractOptions,
}

impl PageOptions {
    pub fn target(&self, url: impl Into<String>) -> FetchTarget {
        FetchTarget::new(url)
            .with_stealth(self.stealth_level)
            .with_auto_bypass(self.auto_bypass)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Heading {
    pub level: String,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Link {
    pub text: String,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Image {
    pub url: String,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub metadata: PageMetadata,
    pub short_title: String,
    pub format: OutputFormat,
    pub content: String,
    pub word_count: usize,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub headings: Vec<Heading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<Link>>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

/// A fetched and extracted page: the `/fetch` response and the fan-out payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    pub url: String,
    pub final_url: String,
    pub status_code: u16,
    pub method_used: StealthLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bypassed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection: Option<ProtectionVerdict>,
    #[serde(default)]
    pub attempts: Vec<FetchAttempt>,
    #[serde(flatten)]
    pub extracted: ExtractedContent,
}

// ─────────────────────────────────────────────────────────────────────────────
// Search
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Day,
    Week,
    Month,
    Year,
}

impl TimeRange {
    pub fn parse_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "day" => Some(TimeRange::Day),
            "week" => Some(TimeRange::Week),
            "month" => Some(TimeRange::Month),
            "year" => Some(TimeRange::Year),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Day => "day",
            TimeRange::Week => "week",
            TimeRange::Month => "month",
            TimeRange::Year => "year",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub query: String,
    pub categories: Option<String>,
    pub engines: Option<String>,
    pub language: String,
    /// Forwarded verbatim as `pageno`; SearXNG decides what a bad value means.
    pub page: String,
    pub time_range: Option<TimeRange>,
    pub rerank: bool,
}

impl SearchParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            categories: None,
            engines: None,
            language: "en".to_string(),
            page: "1".to_string(),
            time_range: None,
            rerank: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    pub engine: String,
    #[serde(default)]
    pub parsed_url: Vec<String>,
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(
        rename = "publishedDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub published_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SearchResponse {
    pub query: String,
    pub number_of_results: u64,
    pub results: Vec<SearchResult>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub infoboxes: Vec<serde_json::Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Fan-out
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Success,
    Error,
}

/// Outcome for one fan-out target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanOutEntry<T, P> {
    pub target: T,
    pub status: EntryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<P>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub duration_ms: u64,
}

impl<T, P> FanOutEntry<T, P> {
    pub fn is_success(&self) -> bool {
        self.status == EntryStatus::Success
    }
}

/// One entry per input target, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanOutResult<T, P> {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_duration_ms: u64,
    pub results: Vec<FanOutEntry<T, P>>,
}

impl<T, P> FanOutResult<T, P> {
    pub fn from_entries(results: Vec<FanOutEntry<T, P>>, total_duration_ms: u64) -> Self {
        let successful = results.iter().filter(|r| r.is_success()).count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            total_duration_ms,
            results,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SearchAndFetchResponse {
    pub query: String,
    pub number_of_results: u64,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(flatten)]
    pub pages: FanOutResult<String, PageResult>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Research
// ─────────────────────────────────────────────────────────────────────────────

pub const MAX_RESEARCH_QUERIES: usize = 10;
pub const MAX_RESEARCH_BREADTH: usize = 5;
pub const MAX_RESEARCH_SUGGESTIONS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResearchJob {
    queries: Vec<String>,
    breadth: usize,
}

impl ResearchJob {
    /// Rejects empty query lists, blank queries, more than ten queries and a
    /// breadth outside `1..=5`.
    pub fn new(queries: Vec<String>, breadth: usize) -> Result<Self, ValidationError> {
        let queries: Vec<String> = queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .collect();
        if queries.is_empty() {
            return Err(ValidationError::invalid(
                "queries",
                "at least one query is required",
            ));
        }
        if queries.iter().any(|q| q.is_empty()) {
            return Err(ValidationError::invalid(
                "queries",
                "queries must not be empty",
            ));
        }
        if queries.len() > MAX_RESEARCH_QUERIES {
            return Err(ValidationError::invalid(
                "queries",
                format!(
                    "at most {} queries are allowed, got {}",
                    MAX_RESEARCH_QUERIES,
                    queries.len()
                ),
            ));
        }
        if !(1..=MAX_RESEARCH_BREADTH).contains(&breadth) {
            return Err(ValidationError::invalid(
                "breadth",
                format!("must be between 1 and {}", MAX_RESEARCH_BREADTH),
            ));
        }
        Ok(Self { queries, breadth })
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn breadth(&self) -> usize {
        self.breadth
    }
}

/// Per-query payload of a research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResearch {
    pub query: String,
    pub number_of_results: u64,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub pages: FanOutResult<String, PageResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    pub queries: Vec<String>,
    pub breadth: usize,
    pub successful_queries: usize,
    pub failed_queries: usize,
    pub pages_successful: usize,
    pub pages_failed: usize,
    pub suggestions: Vec<String>,
    pub per_query: Vec<FanOutEntry<String, QueryResearch>>,
    pub document: String,
    pub generated_at: String,
    pub total_duration_ms: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Crawl
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CrawlPage {
    pub url: String,
    pub depth: usize,
    pub status: EntryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links_found: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CrawlReport {
    pub start_url: String,
    pub pages_crawled: usize,
    pub pages_failed: usize,
    pub max_depth_reached: usize,
    pub total_duration_ms: u64,
    pub pages: Vec<CrawlPage>,
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP envelopes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub backend_status: String,
    pub backend_url: String,
}
