pub mod rerank;

pub use rerank::Reranker;
