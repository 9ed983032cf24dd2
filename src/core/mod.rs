pub mod app_state;
pub mod config;
pub mod error;
pub mod types;
pub mod validation;

pub use app_state::AppState;
