//! Services module for quoting-service.

pub mod database;
pub mod metrics;

pub use database::{Database, RecalculatedQuote};
pub use metrics::{get_metrics, init_metrics};
