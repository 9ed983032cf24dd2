use thiserror::Error;

/// Transport-level failure of a single retrieval.
///
/// These never trigger stealth escalation: only a page that was retrieved
/// successfully but classified as blocked does.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("upstream returned HTTP {0}")]
    HttpStatus(u16),
    #[error("failed to read response body: {0}")]
    Body(String),
}

impl FetchError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus(status.as_u16())
        } else if err.is_body() || err.is_decode() {
            FetchError::Body(err.to_string())
        } else {
            FetchError::Connection(err.to_string())
        }
    }

    /// Short machine-readable label, used in attempt records and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl { .. } => "invalid_url",
            FetchError::Timeout(_) => "timeout",
            FetchError::Connection(_) => "connection_error",
            FetchError::HttpStatus(_) => "http_status",
            FetchError::Body(_) => "body_error",
        }
    }
}

/// Request rejected before any network work happens.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required parameter: {0}")]
    Missing(&'static str),
    #[error("Invalid {param}: {reason}")]
    Invalid { param: &'static str, reason: String },
}

impl ValidationError {
    pub fn invalid(param: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::Invalid {
            param,
            reason: reason.into(),
        }
    }
}

/// Cache store fault. Always handled as a miss by `ResponseCache`.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("cache value (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Failure talking to the search backend. Aborts the job that needed it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("search backend returned HTTP {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("cannot connect to search backend: {0}")]
    Unreachable(String),
    #[error("invalid search backend response: {0}")]
    Decode(String),
}

impl SearchError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            SearchError::Status {
                status: status.as_u16(),
                detail: err.to_string(),
            }
        } else if err.is_decode() {
            SearchError::Decode(err.to_string())
        } else {
            SearchError::Unreachable(err.to_string())
        }
    }
}
