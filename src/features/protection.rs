//! Bot-protection classification of fetched pages.
//!
//! One Aho-Corasick automaton over every signature, matched ASCII
//! case-insensitively in a single pass. The automaton is built once at
//! startup and shared; `classify` itself is pure.

use crate::core::types::{ProtectionMechanism, ProtectionVerdict};
use aho_corasick::AhoCorasick;
use std::collections::BTreeSet;
use tracing::warn;

/// Bodies shorter than this that match anything are almost always an
/// interstitial rather than real content.
const SHORT_BODY_BYTES: usize = 3500;
const SHORT_BODY_BONUS: f32 = 0.15;
const BLOCK_THRESHOLD: f32 = 0.5;

const SIGNATURES: &[(ProtectionMechanism, &str)] = &[
    // Interstitial browser checks
    (ProtectionMechanism::Challenge, "cdn-cgi/challenge-platform"),
    (ProtectionMechanism::Challenge, "cf-browser-verification"),
    (ProtectionMechanism::Challenge, "cf_chl_opt"),
    (ProtectionMechanism::Challenge, "checking your browser before accessing"),
    (ProtectionMechanism::Challenge, "checking if the site connection is secure"),
    (ProtectionMechanism::Challenge, "<title>just a moment...</title>"),
    (ProtectionMechanism::Challenge, "enable javascript and cookies to continue"),
    (ProtectionMechanism::Challenge, "ddos-guard"),
    (ProtectionMechanism::Challenge, "sucuri website firewall"),
    // Captchas
    (ProtectionMechanism::Captcha, "g-recaptcha"),
    (ProtectionMechanism::Captcha, "recaptcha/api.js"),
    (ProtectionMechanism::Captcha, "hcaptcha.com"),
    (ProtectionMechanism::Captcha, "h-captcha"),
    (ProtectionMechanism::Captcha, "cf-turnstile"),
    (ProtectionMechanism::Captcha, "challenges.cloudflare.com/turnstile"),
    (ProtectionMechanism::Captcha, "px-captcha"),
    (ProtectionMechanism::Captcha, "captcha-delivery.com"),
    (ProtectionMechanism::Captcha, "verify you are human"),
    (ProtectionMechanism::Captcha, "are you a robot"),
    // Rate limiting
    (ProtectionMechanism::RateLimit, "too many requests"),
    (ProtectionMechanism::RateLimit, "unusual traffic"),
    (ProtectionMechanism::RateLimit, "rate limit exceeded"),
    (ProtectionMechanism::RateLimit, "you have been rate limited"),
    (ProtectionMechanism::RateLimit, "error 1015"),
    // Hard denials
    (ProtectionMechanism::AccessDenied, "access denied"),
    (ProtectionMechanism::AccessDenied, "you have been blocked"),
    (ProtectionMechanism::AccessDenied, "request blocked"),
    (ProtectionMechanism::AccessDenied, "error 1020"),
    (ProtectionMechanism::AccessDenied, "403 forbidden"),
    (ProtectionMechanism::AccessDenied, "your access to this site has been limited"),
    // Vendor fingerprinting scripts
    (ProtectionMechanism::BotManager, "perimeterx"),
    (ProtectionMechanism::BotManager, "_pxhd"),
    (ProtectionMechanism::BotManager, "datadome"),
    (ProtectionMechanism::BotManager, "_abck"),
    (ProtectionMechanism::BotManager, "akamai bot manager"),
    (ProtectionMechanism::BotManager, "incapsula"),
    (ProtectionMechanism::BotManager, "_incapsula_resource"),
    (ProtectionMechanism::BotManager, "imperva"),
];

impl ProtectionMechanism {
    pub fn weight(&self) -> f32 {
        match self {
            ProtectionMechanism::Challenge => 0.6,
            ProtectionMechanism::Captcha => 0.4,
            ProtectionMechanism::RateLimit => 0.4,
            ProtectionMechanism::AccessDenied => 0.4,
            ProtectionMechanism::BotManager => 0.25,
        }
    }

    /// Soft signals mark a page as protected but never as blocked.
    pub fn is_hard_block(&self) -> bool {
        !matches!(self, ProtectionMechanism::BotManager)
    }

    fn recommendation(&self) -> &'static str {
        match self {
            ProtectionMechanism::Challenge => {
                "JavaScript challenge page detected. Retry with stealth_mode=medium or high and auto_bypass=true."
            }
            ProtectionMechanism::Captcha => {
                "CAPTCHA detected. Retry with stealth_mode=high and auto_bypass=true; a human-solved session may be required."
            }
            ProtectionMechanism::RateLimit => {
                "Rate limited by the site. Back off before retrying, or retry with a higher stealth_mode."
            }
            ProtectionMechanism::AccessDenied => {
                "Access denied by the site. Retry with stealth_mode=high and auto_bypass=true."
            }
            ProtectionMechanism::BotManager => {
                "Bot-management scripts present but content was served. Use stealth_mode=medium if results look incomplete."
            }
        }
    }
}

pub struct ProtectionClassifier {
    automaton: Option<AhoCorasick>,
    mechanisms: Vec<ProtectionMechanism>,
}

impl std::fmt::Debug for ProtectionClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectionClassifier")
            .field("signatures", &self.mechanisms.len())
            .field("ready", &self.automaton.is_some())
            .finish()
    }
}

impl Default for ProtectionClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtectionClassifier {
    pub fn new() -> Self {
        let patterns: Vec<&str> = SIGNATURES.iter().map(|(_, p)| *p).collect();
        let mechanisms = SIGNATURES.iter().map(|(m, _)| *m).collect();
        let automaton = match AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(patterns)
        {
            Ok(ac) => Some(ac),
            Err(e) => {
                warn!("protection classifier disabled: {}", e);
                None
            }
        };
        Self {
            automaton,
            mechanisms,
        }
    }

    pub fn classify(&self, body: &str) -> ProtectionVerdict {
        let Some(ac) = &self.automaton else {
            return ProtectionVerdict::unprotected();
        };
        if body.trim().is_empty() {
            return ProtectionVerdict::unprotected();
        }
        let Ok(matches) = ac.try_find_overlapping_iter(body) else {
            return ProtectionVerdict::unprotected();
        };

        let mut found: BTreeSet<ProtectionMechanism> = BTreeSet::new();
        for m in matches {
            if let Some(mech) = self.mechanisms.get(m.pattern().as_usize()) {
                found.insert(*mech);
            }
        }
        if found.is_empty() {
            return ProtectionVerdict::unprotected();
        }

        let mut confidence: f32 = found.iter().map(|m| m.weight()).sum();
        if body.len() < SHORT_BODY_BYTES {
            confidence += SHORT_BODY_BONUS;
        }
        let confidence = confidence.min(1.0);
        let is_blocked =
            found.iter().any(|m| m.is_hard_block()) && confidence >= BLOCK_THRESHOLD;

        // BTreeSet iterates in declaration order, so ties go to the earlier family.
        let dominant = found
            .iter()
            .copied()
            .fold(None::<ProtectionMechanism>, |best, m| match best {
                Some(b) if b.weight() >= m.weight() => Some(b),
                _ => Some(m),
            });

        ProtectionVerdict {
            is_protected: true,
            is_blocked,
            confidence,
            recommendation: dominant
                .map(|m| m.recommendation().to_string())
                .unwrap_or_default(),
            mechanisms: found,
        }
    }
}
