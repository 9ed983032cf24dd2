pub mod extract;
pub mod orchestrator;
pub mod stealth;

use crate::core::error::FetchError;
use crate::core::types::{FetchOutcome, StealthLevel};

pub use orchestrator::FetchOrchestrator;
pub use stealth::StealthClient;

/// One HTTP retrieval at a given evasion level. The returned outcome has no
/// verdict attached; classification belongs to the orchestrator.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, level: StealthLevel) -> Result<FetchOutcome, FetchError>;
}
