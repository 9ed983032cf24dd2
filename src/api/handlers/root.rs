use axum::response::Json;
use serde_json::{json, Value};

pub async fn handle() -> Json<Value> {
    Json(json!({
        "message": "SearXNG Search API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/search-api": "Search using SearXNG engines",
            "/fetch": "Fetch and clean website content",
            "/search-and-fetch": "Search, then fetch and extract the top results",
            "/deep-research": "Run several searches and compile a research report",
            "/crawl-site": "Breadth-first crawl of a site",
            "/health": "Service and search backend status"
        }
    }))
}
