use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// GatewayConfig: file-based config loader (gateway.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const DEFAULT_SEARXNG_URL: &str = "http://127.0.0.1:8888";
pub const DEFAULT_PORT: u16 = 8001;

/// Top-level config loaded from `gateway.json`. Every field is optional and
/// resolves JSON field → env var → built-in default.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct GatewayConfig {
    /// SearXNG base URL, e.g. `http://127.0.0.1:8888`.
    pub searxng_url: Option<String>,
    pub port: Option<u16>,
    /// Per-attempt wall clock for outbound fetches.
    pub http_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    /// Fan-out concurrency ceiling per job.
    pub fanout_concurrency: Option<usize>,
    /// Wall clock for one fan-out task (one URL, escalation included).
    pub fanout_task_timeout_secs: Option<u64>,
    /// Wall clock for one research query (search + its fan-out).
    pub research_query_timeout_secs: Option<u64>,
    /// Characters of page content kept per entry in the compiled research document.
    pub research_entry_chars: Option<usize>,
    pub cache_enabled: Option<bool>,
    pub cache_max_entries: Option<u64>,
    /// Proxy that `high` stealth requests egress through.
    pub high_stealth_proxy: Option<String>,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
}

impl GatewayConfig {
    /// Search backend: JSON field → `SEARXNG_URL` → `http://127.0.0.1:8888`.
    pub fn resolve_searxng_url(&self) -> String {
        if let Some(u) = &self.searxng_url {
            if !u.trim().is_empty() {
                return u.trim().trim_end_matches('/').to_string();
            }
        }
        std::env::var("SEARXNG_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_SEARXNG_URL.to_string())
    }

    /// Listen port: JSON field → `PORT` → 8001. `--port` on the command line wins over all.
    pub fn resolve_port(&self) -> u16 {
        self.port
            .or_else(|| env_parse("PORT"))
            .unwrap_or(DEFAULT_PORT)
    }

    pub fn resolve_http_timeout(&self) -> Duration {
        let secs = self
            .http_timeout_secs
            .or_else(|| env_parse("HTTP_TIMEOUT_SECS"))
            .unwrap_or(30);
        Duration::from_secs(secs.max(1))
    }

    pub fn resolve_connect_timeout(&self) -> Duration {
        let secs = self
            .connect_timeout_secs
            .or_else(|| env_parse("HTTP_CONNECT_TIMEOUT_SECS"))
            .unwrap_or(10);
        Duration::from_secs(secs.max(1))
    }

    /// Fan-out ceiling: JSON field → `FANOUT_CONCURRENCY` → 5. Never below 1.
    pub fn resolve_fanout_concurrency(&self) -> usize {
        self.fanout_concurrency
            .or_else(|| env_parse("FANOUT_CONCURRENCY"))
            .unwrap_or(5)
            .max(1)
    }

    pub fn resolve_fanout_task_timeout(&self) -> Duration {
        let secs = self
            .fanout_task_timeout_secs
            .or_else(|| env_parse("FANOUT_TASK_TIMEOUT_SECS"))
            .unwrap_or(30);
        Duration::from_secs(secs.max(1))
    }

    pub fn resolve_research_query_timeout(&self) -> Duration {
        let secs = self
            .research_query_timeout_secs
            .or_else(|| env_parse("RESEARCH_QUERY_TIMEOUT_SECS"))
            .unwrap_or(120);
        Duration::from_secs(secs.max(1))
    }

    pub fn resolve_research_entry_chars(&self) -> usize {
        self.research_entry_chars
            .or_else(|| env_parse("RESEARCH_ENTRY_CHARS"))
            .unwrap_or(1500)
    }

    /// JSON field → `CACHE_ENABLED` (`0`/`false` disables) → `true`.
    pub fn resolve_cache_enabled(&self) -> bool {
        if let Some(b) = self.cache_enabled {
            return b;
        }
        std::env::var("CACHE_ENABLED")
            .map(|v| {
                !matches!(
                    v.trim().to_ascii_lowercase().as_str(),
                    "0" | "false" | "no" | "off"
                )
            })
            .unwrap_or(true)
    }

    pub fn resolve_cache_max_entries(&self) -> u64 {
        self.cache_max_entries
            .or_else(|| env_parse("CACHE_MAX_ENTRIES"))
            .unwrap_or(10_000)
    }

    /// JSON field → `HIGH_STEALTH_PROXY` → none (`high` falls back to medium headers).
    pub fn resolve_high_stealth_proxy(&self) -> Option<String> {
        self.high_stealth_proxy
            .clone()
            .or_else(|| std::env::var("HIGH_STEALTH_PROXY").ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Load `gateway.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `GATEWAY_CONFIG` env var path
/// 2. `./gateway.json`
/// 3. `../gateway.json`
///
/// Missing file → `GatewayConfig::default()` (silent, all env-var fallbacks apply).
/// Parse error → log a warning, return `GatewayConfig::default()`.
pub fn load_gateway_config() -> GatewayConfig {
    let mut candidates = vec![
        PathBuf::from("gateway.json"),
        PathBuf::from("../gateway.json"),
    ];
    if let Ok(env_path) = std::env::var("GATEWAY_CONFIG") {
        candidates.insert(0, PathBuf::from(env_path));
    }

    for path in &candidates {
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };
        return match serde_json::from_str::<GatewayConfig>(&contents) {
            Ok(cfg) => {
                tracing::info!("gateway.json loaded from {}", path.display());
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    "gateway.json parse error at {}: {}; using defaults",
                    path.display(),
                    e
                );
                GatewayConfig::default()
            }
        };
    }

    GatewayConfig::default()
}
