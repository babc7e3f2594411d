//! Prometheus metrics for the rc server
//!
//! Defines metrics for:
//! - Requests by method and status
//! - Synchronous call latency
//! - Async jobs started
//! - Remote browser operations by kind and outcome

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    /// Registry for all metrics
    pub static ref REGISTRY: Registry = Registry::new();

    /// Request counter by method and status
    pub static ref HTTP_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("rcserver_http_requests_total", "Total HTTP requests"),
        &["method", "status"]
    )
    .expect("Failed to create HTTP_REQUESTS metric");

    /// Synchronous call latency histogram
    pub static ref CALL_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "rcserver_call_duration_seconds",
            "Synchronous rc call duration in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    )
    .expect("Failed to create CALL_DURATION metric");

    /// Async jobs handed to the scheduler
    pub static ref JOBS_STARTED: IntCounter = IntCounter::new(
        "rcserver_jobs_started_total",
        "Total async jobs started"
    )
    .expect("Failed to create JOBS_STARTED metric");

    /// Remote browser operations by kind (list, object, root) and status
    pub static ref BROWSE_OPERATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("rcserver_browse_operations_total", "Total remote browser operations"),
        &["operation", "status"]
    )
    .expect("Failed to create BROWSE_OPERATIONS metric");
}

/// Register all metrics with the registry
pub fn init_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(HTTP_REQUESTS.clone()))?;
    REGISTRY.register(Box::new(CALL_DURATION.clone()))?;
    REGISTRY.register(Box::new(JOBS_STARTED.clone()))?;
    REGISTRY.register(Box::new(BROWSE_OPERATIONS.clone()))?;
    Ok(())
}

/// Render the registry in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
