pub mod health;
pub mod quotes;
pub mod templates;

pub use health::{health_check, metrics_handler, readiness_check};
