//! Prometheus metrics for quoting-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "quoting_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Quote counter by lifecycle status reached.
pub static QUOTES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quoting_quotes_total",
        "Total number of quotes by status",
        &["status"] // draft, pending, sent, accepted, rejected, expired, converted
    )
    .expect("Failed to register quotes_total")
});

/// Recalculation passes by trigger.
pub static RECALCULATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quoting_recalculations_total",
        "Total number of quote recalculation passes",
        &["trigger"]
    )
    .expect("Failed to register recalculations_total")
});

/// Parts priced with a missing catalog entry.
pub static PRICING_GAPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quoting_pricing_gaps_total",
        "Total number of pricing gaps by kind",
        &["kind"]
    )
    .expect("Failed to register pricing_gaps_total")
});

/// Template estimates by mode and outcome.
pub static TEMPLATE_ESTIMATES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quoting_template_estimates_total",
        "Total number of template price estimates",
        &["mode", "outcome"]
    )
    .expect("Failed to register template_estimates_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&QUOTES_TOTAL);
    Lazy::force(&RECALCULATIONS_TOTAL);
    Lazy::force(&PRICING_GAPS_TOTAL);
    Lazy::force(&TEMPLATE_ESTIMATES_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
