//! Stealth escalation state machine.
//!
//! ```text
//! Idle → Fetching(level) → Classifying → Done
//!                              │
//!                              └→ Escalating(next) → Fetching(next) → …
//! ```
//!
//! Escalation only happens when the page was retrieved but classified as
//! blocked and the caller opted into `auto_bypass`. The ladder is fixed at
//! `[medium, high]`, so one run makes at most two extra fetches.

use super::PageFetcher;
use crate::core::error::FetchError;
use crate::core::types::{
    AttemptResult, FetchAttempt, FetchOutcome, FetchTarget, ProtectionVerdict, StealthLevel,
};
use crate::features::protection::ProtectionClassifier;
use std::sync::Arc;
use tracing::{info, warn};

const ESCALATION_LADDER: [StealthLevel; 2] = [StealthLevel::Medium, StealthLevel::High];

/// Next rung strictly above `current`, if any.
pub fn next_escalation(current: StealthLevel) -> Option<StealthLevel> {
    ESCALATION_LADDER.iter().copied().find(|level| *level > current)
}

#[derive(Debug)]
enum State {
    Idle,
    Fetching(StealthLevel),
    Classifying(StealthLevel, FetchOutcome),
    Escalating(StealthLevel),
    Done(Result<FetchOutcome, FetchError>),
}

/// Page content and verdict of the first attempt, kept while escalating.
struct Baseline {
    outcome: FetchOutcome,
    verdict: ProtectionVerdict,
}

pub struct FetchOrchestrator {
    fetcher: Arc<dyn PageFetcher>,
    classifier: Arc<ProtectionClassifier>,
}

impl FetchOrchestrator {
    pub fn new(fetcher: Arc<dyn PageFetcher>, classifier: Arc<ProtectionClassifier>) -> Self {
        Self {
            fetcher,
            classifier,
        }
    }

    /// Drive one target to a final outcome.
    ///
    /// A transport failure on the first attempt is returned as-is. Failures
    /// during escalation are recorded in `attempts` and the prior outcome
    /// is kept.
    pub async fn run(&self, target: &FetchTarget) -> Result<FetchOutcome, FetchError> {
        let mut attempts: Vec<FetchAttempt> = Vec::new();
        let mut baseline: Option<Baseline> = None;
        let mut state = State::Idle;

        loop {
            state = match state {
                State::Idle => State::Fetching(target.stealth_level),

                State::Fetching(level) => {
                    match self.fetcher.fetch(&target.url, level).await {
                        Ok(outcome) => State::Classifying(level, outcome),
                        Err(e) if baseline.is_none() => State::Done(Err(e)),
                        Err(e) => {
                            warn!(
                                "escalation attempt at {} failed for {}: {}; keeping prior outcome",
                                level, target.url, e
                            );
                            attempts.push(FetchAttempt {
                                level,
                                result: AttemptResult::Failed {
                                    error: e.to_string(),
                                },
                            });
                            self.after_blocked(level, &mut attempts, &mut baseline)
                        }
                    }
                }

                State::Classifying(level, outcome) => {
                    let verdict = self.classifier.classify(&outcome.html);

                    // A non-2xx page that is not an anti-bot interstitial is a plain HTTP failure.
                    if !(200..300).contains(&outcome.status_code) && !verdict.is_blocked {
                        let err = FetchError::HttpStatus(outcome.status_code);
                        if baseline.is_none() {
                            State::Done(Err(err))
                        } else {
                            warn!(
                                "escalation attempt at {} for {} returned HTTP {}; keeping prior outcome",
                                level, target.url, outcome.status_code
                            );
                            attempts.push(FetchAttempt {
                                level,
                                result: AttemptResult::Failed {
                                    error: err.to_string(),
                                },
                            });
                            self.after_blocked(level, &mut attempts, &mut baseline)
                        }
                    } else {
                        attempts.push(FetchAttempt {
                            level,
                            result: if verdict.is_blocked {
                                AttemptResult::Blocked {
                                    confidence: verdict.confidence,
                                }
                            } else {
                                AttemptResult::Clear
                            },
                        });

                        if baseline.is_none() {
                            match next_escalation(level) {
                                Some(next) if verdict.is_blocked && target.auto_bypass => {
                                    info!(
                                        "{} blocked at {} (confidence {:.2}), escalating to {}",
                                        target.url, level, verdict.confidence, next
                                    );
                                    baseline = Some(Baseline { outcome, verdict });
                                    State::Escalating(next)
                                }
                                _ => State::Done(Ok(finish(
                                    outcome,
                                    verdict,
                                    None,
                                    std::mem::take(&mut attempts),
                                ))),
                            }
                        } else if !verdict.is_blocked {
                            info!("{} cleared at stealth level {}", target.url, level);
                            State::Done(Ok(finish(
                                outcome,
                                verdict,
                                Some(true),
                                std::mem::take(&mut attempts),
                            )))
                        } else {
                            info!(
                                "{} still blocked at {} (confidence {:.2})",
                                target.url, level, verdict.confidence
                            );
                            self.after_blocked(level, &mut attempts, &mut baseline)
                        }
                    }
                }

                State::Escalating(level) => State::Fetching(level),

                State::Done(result) => {
                    return result;
                }
            };
        }
    }

    /// Escalated attempt did not clear: move up the ladder or give up.
    fn after_blocked(
        &self,
        level: StealthLevel,
        attempts: &mut Vec<FetchAttempt>,
        baseline: &mut Option<Baseline>,
    ) -> State {
        match next_escalation(level) {
            Some(next) => State::Escalating(next),
            None => State::Done(settle_blocked(level, attempts, baseline)),
        }
    }
}

/// Every escalated attempt was blocked or failed: return the original page
/// and verdict, stamped with the last level tried.
fn settle_blocked(
    last_level: StealthLevel,
    attempts: &mut Vec<FetchAttempt>,
    baseline: &mut Option<Baseline>,
) -> Result<FetchOutcome, FetchError> {
    match baseline.take() {
        Some(Baseline { mut outcome, verdict }) => {
            outcome.method_used = last_level;
            Ok(finish(
                outcome,
                verdict,
                Some(false),
                std::mem::take(attempts),
            ))
        }
        None => Err(FetchError::Body(
            "escalation finished without an initial page".to_string(),
        )),
    }
}

fn finish(
    mut outcome: FetchOutcome,
    verdict: ProtectionVerdict,
    bypassed: Option<bool>,
    attempts: Vec<FetchAttempt>,
) -> FetchOutcome {
    outcome.protection = Some(verdict);
    outcome.bypassed = bypassed;
    outcome.attempts = attempts;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const CHALLENGE: &str = r#"<html><head><title>Just a moment...</title></head>
        <body><script src="/cdn-cgi/challenge-platform/h/b/orchestrate"></script></body></html>"#;

    fn article(tag: &str) -> String {
        format!(
            "<html><body><article><h1>{}</h1>{}</article></body></html>",
            tag,
            "<p>Plenty of ordinary words in an ordinary paragraph.</p>".repeat(100)
        )
    }

    /// Serves a fixed response per stealth level and records the call order.
    struct ScriptedFetcher {
        responses: HashMap<StealthLevel, Result<(u16, String), FetchError>>,
        calls: Mutex<Vec<StealthLevel>>,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<(StealthLevel, Result<(u16, String), FetchError>)>) -> Self {
            Self {
                responses: responses.into_iter().collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<StealthLevel> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str, level: StealthLevel) -> Result<FetchOutcome, FetchError> {
            self.calls.lock().unwrap().push(level);
            let (status, html) = self
                .responses
                .get(&level)
                .cloned()
                .unwrap_or_else(|| Err(FetchError::Connection("unscripted".into())))?;
            Ok(FetchOutcome {
                html,
                status_code: status,
                final_url: url.to_string(),
                content_type: "text/html".into(),
                method_used: level,
                protection: None,
                bypassed: None,
                attempts: Vec::new(),
            })
        }
    }

    fn orchestrator(fetcher: Arc<ScriptedFetcher>) -> FetchOrchestrator {
        FetchOrchestrator::new(fetcher, Arc::new(ProtectionClassifier::new()))
    }

    fn target(level: StealthLevel, auto_bypass: bool) -> FetchTarget {
        FetchTarget::new("https://example.com/page")
            .with_stealth(level)
            .with_auto_bypass(auto_bypass)
    }

    #[test]
    fn test_ladder() {
        assert_eq!(next_escalation(StealthLevel::Off), Some(StealthLevel::Medium));
        assert_eq!(next_escalation(StealthLevel::Low), Some(StealthLevel::Medium));
        assert_eq!(next_escalation(StealthLevel::Medium), Some(StealthLevel::High));
        assert_eq!(next_escalation(StealthLevel::High), None);
    }

    #[tokio::test]
    async fn test_clear_page_needs_no_escalation() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![(
            StealthLevel::Off,
            Ok((200, article("plain"))),
        )]));
        let outcome = orchestrator(fetcher.clone())
            .run(&target(StealthLevel::Off, true))
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), vec![StealthLevel::Off]);
        assert_eq!(outcome.method_used, StealthLevel::Off);
        assert_eq!(outcome.bypassed, None);
        assert!(!outcome.protection.unwrap().is_blocked);
        assert_eq!(outcome.attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_escalation_is_bounded_when_blocked_everywhere() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            (StealthLevel::Low, Ok((403, format!("{}<!-- low -->", CHALLENGE)))),
            (StealthLevel::Medium, Ok((403, CHALLENGE.to_string()))),
            (StealthLevel::High, Ok((403, CHALLENGE.to_string()))),
        ]));
        let outcome = orchestrator(fetcher.clone())
            .run(&target(StealthLevel::Low, true))
            .await
            .unwrap();

        assert_eq!(
            fetcher.calls(),
            vec![StealthLevel::Low, StealthLevel::Medium, StealthLevel::High]
        );
        assert_eq!(outcome.method_used, StealthLevel::High);
        assert_eq!(outcome.bypassed, Some(false));
        // Original content is kept.
        assert!(outcome.html.contains("<!-- low -->"));
        assert!(outcome.protection.unwrap().is_blocked);
        assert_eq!(outcome.attempts.len(), 3);
    }

    #[tokio::test]
    async fn test_bypass_at_medium() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            (StealthLevel::Low, Ok((200, CHALLENGE.to_string()))),
            (StealthLevel::Medium, Ok((200, article("real")))),
            (StealthLevel::High, Ok((200, article("never")))),
        ]));
        let outcome = orchestrator(fetcher.clone())
            .run(&target(StealthLevel::Low, true))
            .await
            .unwrap();

        assert_eq!(fetcher.calls(), vec![StealthLevel::Low, StealthLevel::Medium]);
        assert_eq!(outcome.method_used, StealthLevel::Medium);
        assert_eq!(outcome.bypassed, Some(true));
        assert!(outcome.html.contains("real"));
        assert_eq!(
            outcome.attempts.iter().map(|a| a.level).collect::<Vec<_>>(),
            vec![StealthLevel::Low, StealthLevel::Medium]
        );
        assert!(matches!(outcome.attempts[0].result, AttemptResult::Blocked { .. }));
        assert_eq!(outcome.attempts[1].result, AttemptResult::Clear);
    }

    #[tokio::test]
    async fn test_blocked_without_auto_bypass_stays_put() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![(
            StealthLevel::Off,
            Ok((200, CHALLENGE.to_string())),
        )]));
        let outcome = orchestrator(fetcher.clone())
            .run(&target(StealthLevel::Off, false))
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), vec![StealthLevel::Off]);
        assert_eq!(outcome.bypassed, None);
        assert!(outcome.protection.unwrap().is_blocked);
    }

    #[tokio::test]
    async fn test_blocked_at_high_has_nowhere_to_go() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![(
            StealthLevel::High,
            Ok((200, CHALLENGE.to_string())),
        )]));
        let outcome = orchestrator(fetcher.clone())
            .run(&target(StealthLevel::High, true))
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), vec![StealthLevel::High]);
        assert_eq!(outcome.method_used, StealthLevel::High);
        assert_eq!(outcome.bypassed, None);
    }

    #[tokio::test]
    async fn test_start_at_medium_only_tries_high() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            (StealthLevel::Medium, Ok((200, CHALLENGE.to_string()))),
            (StealthLevel::High, Ok((200, article("ok")))),
        ]));
        let outcome = orchestrator(fetcher.clone())
            .run(&target(StealthLevel::Medium, true))
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), vec![StealthLevel::Medium, StealthLevel::High]);
        assert_eq!(outcome.method_used, StealthLevel::High);
        assert_eq!(outcome.bypassed, Some(true));
    }

    #[tokio::test]
    async fn test_initial_transport_failure_terminates() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![(
            StealthLevel::Off,
            Err(FetchError::Timeout("slow".into())),
        )]));
        let err = orchestrator(fetcher.clone())
            .run(&target(StealthLevel::Off, true))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout("slow".into()));
        assert_eq!(fetcher.calls(), vec![StealthLevel::Off]);
    }

    #[tokio::test]
    async fn test_plain_error_status_is_not_escalated() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![(
            StealthLevel::Off,
            Ok((503, article("maintenance"))),
        )]));
        let err = orchestrator(fetcher.clone())
            .run(&target(StealthLevel::Off, true))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::HttpStatus(503));
        assert_eq!(fetcher.calls(), vec![StealthLevel::Off]);
    }

    #[tokio::test]
    async fn test_failed_escalation_keeps_prior_outcome() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            (StealthLevel::Off, Ok((200, CHALLENGE.to_string()))),
            (StealthLevel::Medium, Err(FetchError::Connection("reset".into()))),
            (StealthLevel::High, Ok((200, article("through")))),
        ]));
        let outcome = orchestrator(fetcher.clone())
            .run(&target(StealthLevel::Off, true))
            .await
            .unwrap();
        assert_eq!(
            fetcher.calls(),
            vec![StealthLevel::Off, StealthLevel::Medium, StealthLevel::High]
        );
        assert_eq!(outcome.method_used, StealthLevel::High);
        assert_eq!(outcome.bypassed, Some(true));
        assert!(matches!(outcome.attempts[1].result, AttemptResult::Failed { .. }));
    }

    #[tokio::test]
    async fn test_all_escalations_fail_in_transport() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![(
            StealthLevel::Low,
            Ok((200, CHALLENGE.to_string())),
        )]));
        let outcome = orchestrator(fetcher.clone())
            .run(&target(StealthLevel::Low, true))
            .await
            .unwrap();
        assert_eq!(outcome.method_used, StealthLevel::High);
        assert_eq!(outcome.bypassed, Some(false));
        assert!(outcome.html.contains("Just a moment"));
        assert!(outcome.method_used >= StealthLevel::Low);
    }
}
