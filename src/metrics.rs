//! Prometheus metrics registry and metric definitions.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use tracing::error;

/// Global registry under crate namespace
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    Registry::new_custom(Some("output_viewer".into()), None)
        .expect("failed to create Prometheus registry")
});

/// Total queries issued against the store
pub static STORE_QUERY_COUNTER: Lazy<IntCounter> = Lazy::new(|| {
    let opts = Opts::new("store_queries_total", "Total number of store queries issued");
    let c = IntCounter::with_opts(opts).expect("counter opts");
    REGISTRY.register(Box::new(c.clone())).expect("register store_queries_total");
    c
});

/// Retrieval or export calls that ended in a store failure
pub static FETCH_FAILURE_COUNTER: Lazy<IntCounter> = Lazy::new(|| {
    let opts = Opts::new("fetch_failures_total", "Total number of failed fetch or export calls");
    let c = IntCounter::with_opts(opts).expect("counter opts");
    REGISTRY.register(Box::new(c.clone())).expect("register fetch_failures_total");
    c
});

/// Histogram of store query durations
pub static STORE_QUERY_HISTOGRAM: Lazy<Histogram> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "store_query_duration_seconds",
        "Duration of store queries in seconds",
    );
    let h = Histogram::with_opts(opts).expect("histogram opts");
    REGISTRY.register(Box::new(h.clone())).expect("register store_query_duration_seconds");
    h
});

/// Rows delivered through CSV export
pub static EXPORTED_ROWS_COUNTER: Lazy<IntCounter> = Lazy::new(|| {
    let opts = Opts::new("exported_rows_total", "Total number of rows exported");
    let c = IntCounter::with_opts(opts).expect("counter opts");
    REGISTRY.register(Box::new(c.clone())).expect("register exported_rows_total");
    c
});

/// HTTP requests by route and status code
pub static HTTP_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("http_requests_total", "Total HTTP requests by route and status");
    let c = IntCounterVec::new(opts, &["route", "status"]).expect("counter vec opts");
    REGISTRY.register(Box::new(c.clone())).expect("register http_requests_total");
    c
});

/// Encode all metrics as text
pub fn gather_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let mf = REGISTRY.gather();
    if let Err(e) = encoder.encode(&mf, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
