pub mod antibot;
pub mod protection;

pub use antibot::ProfilePool;
pub use protection::ProtectionClassifier;
