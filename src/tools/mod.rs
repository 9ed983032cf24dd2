pub mod cache;
pub mod crawl;
pub mod fanout;
pub mod research;
pub mod scrape;
pub mod search;
pub mod search_fetch;

pub use cache::ResponseCache;
pub use fanout::FanOutExecutor;
