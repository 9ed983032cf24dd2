pub mod api;
pub mod core;
pub mod features;
pub mod nlp;
pub mod scraping;
pub mod tools;

// --- Primary core exports ---
pub use crate::core::error;
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::core::AppState;

// --- Short module paths ---
pub use features::{antibot, protection};
pub use nlp::rerank;
pub use tools::{cache, crawl, fanout, research, scrape, search, search_fetch};
