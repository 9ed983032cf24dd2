use crate::core::types::SearchResult;
use std::cmp::Ordering;
use tracing::debug;

/// Anything the reranker can score: a short title and a longer body.
pub trait Passage {
    fn title(&self) -> &str;
    fn body(&self) -> &str;
}

impl Passage for SearchResult {
    fn title(&self) -> &str {
        &self.title
    }

    fn body(&self) -> &str {
        &self.content
    }
}

/// Token-overlap relevance scoring. Stateless, so one instance is shared by
/// every request.
#[derive(Debug, Clone)]
pub struct Reranker {
    title_weight: f32,
    body_weight: f32,
    min_token_chars: usize,
}

impl Default for Reranker {
    fn default() -> Self {
        Self::new()
    }
}

impl Reranker {
    pub fn new() -> Self {
        Self {
            title_weight: 0.4,
            body_weight: 0.2,
            min_token_chars: 3,
        }
    }

    /// Lowercase alphanumeric runs, skipping very short words.
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.chars().count() >= self.min_token_chars)
            .map(|s| s.to_string())
            .collect()
    }

    /// Relevance in `[0.0, 1.0]`. A title hit outweighs a body hit; the
    /// result averages weighted coverage with the plain match ratio.
    pub fn score<P: Passage + ?Sized>(&self, query_tokens: &[String], passage: &P) -> f32 {
        if query_tokens.is_empty() {
            return 0.5;
        }

        let title_tokens = self.tokenize(passage.title());
        let body_tokens = self.tokenize(passage.body());

        let mut weighted = 0.0;
        let mut matches = 0usize;
        for token in query_tokens {
            if title_tokens.contains(token) {
                weighted += self.title_weight;
                matches += 1;
            } else if body_tokens.contains(token) {
                weighted += self.body_weight;
                matches += 1;
            }
        }

        let max = query_tokens.len() as f32 * self.title_weight;
        let normalized = (weighted / max).min(1.0);
        let match_ratio = matches as f32 / query_tokens.len() as f32;
        ((normalized + match_ratio) / 2.0).clamp(0.0, 1.0)
    }

    /// Reorder passages by descending relevance to `query`. Ties keep their
    /// incoming order.
    pub fn rerank<P: Passage>(&self, query: &str, passages: Vec<P>) -> Vec<P> {
        let query_tokens = self.tokenize(query);
        let mut scored: Vec<(P, f32)> = passages
            .into_iter()
            .map(|p| {
                let s = self.score(&query_tokens, &p);
                (p, s)
            })
            .collect();

        scored.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(Ordering::Equal));
        debug!("reranked {} passages for '{}'", scored.len(), query);
        scored.into_iter().map(|(p, _)| p).collect()
    }
}
