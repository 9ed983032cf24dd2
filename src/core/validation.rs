//! Eager request validation. Everything here runs before any network work.

use super::error::ValidationError;
use super::types::{
    ExtractionMode, OutputFormat, StealthLevel, TimeRange, MAX_RESEARCH_QUERIES,
};
use url::Url;

/// Accepts only absolute `http`/`https` URLs with a host.
pub fn parse_http_url(param: &'static str, raw: &str) -> Result<Url, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::Missing(param));
    }
    let parsed = Url::parse(raw).map_err(|e| ValidationError::invalid(param, e.to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ValidationError::invalid(
            param,
            "URL must use the http or https scheme",
        ));
    }
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(parsed),
        _ => Err(ValidationError::invalid(param, "URL must include a host")),
    }
}

pub fn require<'a>(param: &'static str, value: Option<&'a str>) -> Result<&'a str, ValidationError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::Missing(param)),
    }
}

pub fn parse_stealth_level(raw: Option<&str>) -> Result<StealthLevel, ValidationError> {
    match raw {
        None => Ok(StealthLevel::Off),
        Some(v) => StealthLevel::parse_str(v).ok_or_else(|| {
            ValidationError::invalid("stealth_mode", "expected one of off, low, medium, high")
        }),
    }
}

pub fn parse_format(raw: Option<&str>) -> Result<OutputFormat, ValidationError> {
    match raw {
        None => Ok(OutputFormat::Text),
        Some(v) => OutputFormat::parse_str(v).ok_or_else(|| {
            ValidationError::invalid("format", "expected one of text, markdown, html")
        }),
    }
}

pub fn parse_extraction_mode(raw: Option<&str>) -> Result<ExtractionMode, ValidationError> {
    match raw {
        None => Ok(ExtractionMode::Article),
        Some(v) => ExtractionMode::parse_str(v).ok_or_else(|| {
            ValidationError::invalid("extraction_mode", "expected one of article, full")
        }),
    }
}

pub fn parse_time_range(raw: Option<&str>) -> Result<Option<TimeRange>, ValidationError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => TimeRange::parse_str(v).map(Some).ok_or_else(|| {
            ValidationError::invalid("time_range", "expected one of day, week, month, year")
        }),
    }
}

pub fn parse_bool(
    param: &'static str,
    raw: Option<&str>,
    default: bool,
) -> Result<bool, ValidationError> {
    let Some(v) = raw else {
        return Ok(default);
    };
    match v.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ValidationError::invalid(param, "expected a boolean")),
    }
}

/// Parses an integer parameter and rejects values outside `min..=max`.
pub fn parse_bounded(
    param: &'static str,
    raw: Option<&str>,
    default: usize,
    min: usize,
    max: usize,
) -> Result<usize, ValidationError> {
    let Some(v) = raw else {
        return Ok(default);
    };
    let n: usize = v
        .trim()
        .parse()
        .map_err(|_| ValidationError::invalid(param, "expected a non-negative integer"))?;
    if n < min || n > max {
        return Err(ValidationError::invalid(
            param,
            format!("must be between {} and {}", min, max),
        ));
    }
    Ok(n)
}

/// Splits a comma-separated query list. Blank items are dropped; an empty
/// result or more than ten queries is rejected.
pub fn parse_queries(raw: Option<&str>) -> Result<Vec<String>, ValidationError> {
    let raw = require("queries", raw)?;
    let queries: Vec<String> = raw
        .split(',')
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .map(|q| q.to_string())
        .collect();
    if queries.is_empty() {
        return Err(ValidationError::invalid(
            "queries",
            "at least one non-empty query is required",
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
    Ok(queries)
}
