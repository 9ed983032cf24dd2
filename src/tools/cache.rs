//! Response cache for expensive, read-only operations.
//!
//! Keys are the operation name followed by every output-affecting parameter
//! in a fixed order, each value percent-encoded so the `|`, `=` and `,`
//! separators cannot be forged by user input. An absent optional parameter
//! is written as the bare name (`|engines`), an empty one as `|engines=`.
//!
//! The cache fails open: a store fault is logged and treated as a miss.

use crate::core::error::CacheError;
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const KEY_VALUE: &AsciiSet = &CONTROLS.add(b'|').add(b'=').add(b',').add(b'%').add(b' ');

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOp {
    Search,
    SearchAndFetch,
    Research,
    Crawl,
    Fetch,
}

impl CacheOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOp::Search => "search",
            CacheOp::SearchAndFetch => "search_fetch",
            CacheOp::Research => "research",
            CacheOp::Crawl => "crawl",
            CacheOp::Fetch => "fetch",
        }
    }

    pub fn ttl(&self) -> Duration {
        match self {
            CacheOp::Search | CacheOp::SearchAndFetch => Duration::from_secs(60 * 60),
            CacheOp::Research | CacheOp::Crawl | CacheOp::Fetch => Duration::from_secs(30 * 60),
        }
    }
}

/// Canonical request descriptor. Build with the `param` family in the order
/// the operation documents; the same inputs always produce the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    op: CacheOp,
    key: String,
}

impl CacheKey {
    pub fn new(op: CacheOp) -> Self {
        Self {
            op,
            key: op.as_str().to_string(),
        }
    }

    pub fn param(mut self, name: &str, value: impl fmt::Display) -> Self {
        let value = value.to_string();
        self.key.push('|');
        self.key.push_str(name);
        self.key.push('=');
        self.key.extend(utf8_percent_encode(&value, KEY_VALUE));
        self
    }

    pub fn opt_param(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.param(name, v),
            None => {
                let mut this = self;
                this.key.push('|');
                this.key.push_str(name);
                this
            }
        }
    }

    pub fn list_param(mut self, name: &str, values: &[String]) -> Self {
        self.key.push('|');
        self.key.push_str(name);
        self.key.push('=');
        let encoded: Vec<String> = values
            .iter()
            .map(|v| utf8_percent_encode(v, KEY_VALUE).to_string())
            .collect();
        self.key.push_str(&encoded.join(","));
        self
    }

    pub fn op(&self) -> CacheOp {
        self.op
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: Arc<serde_json::Value>,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Backing store. The in-process moka store is the default; anything that
/// can hold JSON values with an expiry fits here.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;
    async fn set(&self, entry: CacheEntry) -> Result<(), CacheError>;
}

/// Expires each entry at its own `expires_at`.
struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(value.expires_at.saturating_duration_since(created_at))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.expires_at.saturating_duration_since(updated_at))
    }
}

pub struct MemoryStore {
    cache: Cache<String, CacheEntry>,
}

impl MemoryStore {
    pub fn new(max_entries: u64) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(max_entries)
                .expire_after(EntryExpiry)
                .build(),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.cache.get(key).await)
    }

    async fn set(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.cache.insert(entry.key.clone(), entry).await;
        Ok(())
    }
}

/// Typed front of the store. Cloning is cheap; a disabled cache is a
/// permanent miss.
#[derive(Clone, Default)]
pub struct ResponseCache {
    store: Option<Arc<dyn CacheStore>>,
}

impl fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("enabled", &self.store.is_some())
            .finish()
    }
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store: Some(store) }
    }

    pub fn memory(max_entries: u64) -> Self {
        Self::new(Arc::new(MemoryStore::new(max_entries)))
    }

    pub fn disabled() -> Self {
        Self { store: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let store = self.store.as_ref()?;
        let entry = match store.get(key.as_str()).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!("cache read failed for {}: {}", key.op().as_str(), e);
                return None;
            }
        };
        if entry.is_expired(Instant::now()) {
            return None;
        }
        match T::deserialize(entry.value.as_ref()) {
            Ok(v) => {
                debug!("cache hit: {}", key);
                Some(v)
            }
            Err(e) => {
                warn!("cache entry for {} did not decode: {}", key.op().as_str(), e);
                None
            }
        }
    }

    /// Stores `value` for the operation's TTL.
    pub async fn set<T: Serialize>(&self, key: &CacheKey, value: &T) {
        self.set_with_ttl(key, value, key.op().ttl()).await
    }

    pub async fn set_with_ttl<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!("{}", CacheError::from(e));
                return;
            }
        };
        let entry = CacheEntry {
            key: key.as_str().to_string(),
            value: Arc::new(value),
            expires_at: Instant::now() + ttl,
        };
        if let Err(e) = store.set(entry).await {
            warn!("cache write failed for {}: {}", key.op().as_str(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn search_key(query: &str, engines: Option<&str>) -> CacheKey {
        CacheKey::new(CacheOp::Search)
            .param("q", query)
            .opt_param("engines", engines)
            .param("page", 1)
    }

    #[test]
    fn test_key_is_deterministic() {
        let a = search_key("rust async", Some("google,bing"));
        let b = search_key("rust async", Some("google,bing"));
        assert_eq!(a.as_str(), b.as_str());
        assert_eq!(
            a.as_str(),
            "search|q=rust%20async|engines=google%2Cbing|page=1"
        );
    }

    #[test]
    fn test_absent_and_empty_differ() {
        assert_ne!(
            search_key("q", None).as_str(),
            search_key("q", Some("")).as_str()
        );
    }

    #[test]
    fn test_separators_cannot_collide() {
        // Without encoding both would read `search|q=a|engines=b|page=1`.
        let forged = search_key("a|engines=b", None);
        let honest = search_key("a", Some("b"));
        assert_ne!(forged.as_str(), honest.as_str());

        let list_a = CacheKey::new(CacheOp::Research).list_param("queries", &["a,b".to_string()]);
        let list_b = CacheKey::new(CacheOp::Research)
            .list_param("queries", &["a".to_string(), "b".to_string()]);
        assert_ne!(list_a.as_str(), list_b.as_str());
    }

    #[test]
    fn test_ops_do_not_share_keys() {
        let a = CacheKey::new(CacheOp::Research).param("q", "x");
        let b = CacheKey::new(CacheOp::Crawl).param("q", "x");
        assert_ne!(a.as_str(), b.as_str());
        assert_eq!(CacheOp::Search.ttl(), Duration::from_secs(3600));
        assert_eq!(CacheOp::Crawl.ttl(), Duration::from_secs(1800));
    }

    #[tokio::test]
    async fn test_roundtrip_and_expiry() {
        let cache = ResponseCache::memory(100);
        let key = search_key("expiring", None);
        cache
            .set_with_ttl(&key, &vec!["a".to_string()], Duration::from_millis(50))
            .await;
        let hit: Option<Vec<String>> = cache.get(&key).await;
        assert_eq!(hit, Some(vec!["a".to_string()]));

        tokio::time::sleep(Duration::from_millis(120)).await;
        let miss: Option<Vec<String>> = cache.get(&key).await;
        assert_eq!(miss, None);
    }

    /// Keeps entries forever, ignoring `expires_at`.
    #[derive(Default)]
    struct ForgetfulStore {
        entries: Mutex<HashMap<String, CacheEntry>>,
    }

    #[async_trait]
    impl CacheStore for ForgetfulStore {
        async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, entry: CacheEntry) -> Result<(), CacheError> {
            self.entries.lock().unwrap().insert(entry.key.clone(), entry);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss_even_if_store_returns_it() {
        let cache = ResponseCache::new(Arc::new(ForgetfulStore::default()));
        let key = search_key("stale", None);
        cache.set_with_ttl(&key, &42u32, Duration::ZERO).await;
        let got: Option<u32> = cache.get(&key).await;
        assert_eq!(got, None);
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, CacheError> {
            Err(CacheError::Unavailable("connection reset".into()))
        }

        async fn set(&self, _entry: CacheEntry) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn test_store_faults_fail_open() {
        let cache = ResponseCache::new(Arc::new(BrokenStore));
        let key = search_key("anything", None);
        cache.set(&key, &"value").await;
        let got: Option<String> = cache.get(&key).await;
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_disabled_cache_never_hits() {
        let cache = ResponseCache::disabled();
        let key = search_key("x", None);
        cache.set(&key, &1u8).await;
        assert_eq!(cache.get::<u8>(&key).await, None);
        assert!(!cache.is_enabled());
    }
}
