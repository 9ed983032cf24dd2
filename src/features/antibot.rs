use crate::core::types::StealthLevel;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// A coherent browser identity: the UA string and the client hints a real
/// Chromium build would send alongside it.
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    pub user_agent: &'static str,
    pub sec_ch_ua: &'static str,
    pub sec_ch_ua_mobile: &'static str,
    pub sec_ch_ua_platform: &'static str,
}

/// Sent at `off`. A plain, current desktop Chrome.
const STATIC_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

pub const USER_AGENTS: &[&str] = &[
    // Chrome
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    // Firefox
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.2; rv:132.0) Gecko/20100101 Firefox/132.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Safari
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    // Edge
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

const BROWSER_PROFILES: &[BrowserProfile] = &[
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        sec_ch_ua: r#""Google Chrome";v="131", "Chromium";v="131", "Not_A Brand";v="24""#,
        sec_ch_ua_mobile: "?0",
        sec_ch_ua_platform: "\"Windows\"",
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        sec_ch_ua: r#""Google Chrome";v="131", "Chromium";v="131", "Not_A Brand";v="24""#,
        sec_ch_ua_mobile: "?0",
        sec_ch_ua_platform: "\"macOS\"",
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
        sec_ch_ua: r#""Microsoft Edge";v="131", "Chromium";v="131", "Not_A Brand";v="24""#,
        sec_ch_ua_mobile: "?0",
        sec_ch_ua_platform: "\"Windows\"",
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
        sec_ch_ua: r#""Google Chrome";v="130", "Chromium";v="130", "Not?A_Brand";v="99""#,
        sec_ch_ua_mobile: "?0",
        sec_ch_ua_platform: "\"Linux\"",
    },
];

const NAVIGATION_REFERER: &str = "https://www.google.com/";

/// Header identities for every stealth level. Built once at startup and
/// shared read-only.
#[derive(Debug, Clone)]
pub struct ProfilePool {
    user_agents: Vec<&'static str>,
    profiles: Vec<BrowserProfile>,
}

impl Default for ProfilePool {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfilePool {
    pub fn new() -> Self {
        Self {
            user_agents: USER_AGENTS.to_vec(),
            profiles: BROWSER_PROFILES.to_vec(),
        }
    }

    fn random_user_agent(&self) -> &'static str {
        use rand::prelude::*;
        let mut rng = rand::rng();
        if self.user_agents.is_empty() {
            return STATIC_USER_AGENT;
        }
        self.user_agents[rng.random_range(0..self.user_agents.len())]
    }

    fn random_profile(&self) -> Option<&BrowserProfile> {
        use rand::prelude::*;
        let mut rng = rand::rng();
        if self.profiles.is_empty() {
            return None;
        }
        self.profiles.get(rng.random_range(0..self.profiles.len()))
    }

    /// Request headers for one attempt at `level`.
    ///
    /// - `off`: static desktop Chrome UA with ordinary browser `Accept*` headers
    /// - `low`: rotated UA plus the navigation header set
    /// - `medium`/`high`: a full client-hint profile, navigation headers and a search-engine `Referer`
    pub fn headers_for(&self, level: StealthLevel) -> HeaderMap {
        let mut headers = HeaderMap::new();
        match level {
            StealthLevel::Off => {
                put(&mut headers, "user-agent", STATIC_USER_AGENT);
                put(
                    &mut headers,
                    "accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                );
                put(&mut headers, "accept-language", "en-US,en;q=0.9");
            }
            StealthLevel::Low => {
                put(&mut headers, "user-agent", self.random_user_agent());
                stealth_headers(&mut headers);
            }
            StealthLevel::Medium | StealthLevel::High => {
                match self.random_profile() {
                    Some(profile) => {
                        put(&mut headers, "user-agent", profile.user_agent);
                        put(&mut headers, "sec-ch-ua", profile.sec_ch_ua);
                        put(&mut headers, "sec-ch-ua-mobile", profile.sec_ch_ua_mobile);
                        put(&mut headers, "sec-ch-ua-platform", profile.sec_ch_ua_platform);
                    }
                    None => put(&mut headers, "user-agent", self.random_user_agent()),
                }
                stealth_headers(&mut headers);
                put(&mut headers, "referer", NAVIGATION_REFERER);
                // Arriving from a search result, not a typed URL.
                put(&mut headers, "sec-fetch-site", "cross-site");
            }
        }
        headers
    }
}

fn stealth_headers(headers: &mut HeaderMap) {
    put(
        headers,
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
    );
    put(headers, "accept-language", "en-US,en;q=0.9");
    put(headers, "dnt", "1");
    put(headers, "upgrade-insecure-requests", "1");
    put(headers, "sec-fetch-dest", "document");
    put(headers, "sec-fetch-mode", "navigate");
    put(headers, "sec-fetch-site", "none");
    put(headers, "sec-fetch-user", "?1");
    put(headers, "cache-control", "max-age=0");
}

fn put(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(v) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), v);
    }
}
