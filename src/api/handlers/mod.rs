pub mod common;
pub mod crawl_site;
pub mod deep_research;
pub mod fetch;
pub mod health;
pub mod root;
pub mod search;
pub mod search_and_fetch;
