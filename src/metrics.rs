//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{Gauge, HistogramOpts, IntCounterVec, Opts, Registry};
use std::time::{Duration, Instant};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("copysmith_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");
    pub static ref HTTP_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "copysmith_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["method", "endpoint"]
    ).expect("metric can be created");

    // Generation Metrics
    pub static ref GENERATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("copysmith_generations_total", "Total number of generation requests"),
        &["kind", "outcome"]
    ).expect("metric can be created");
    pub static ref AI_IMAGES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("copysmith_ai_images_total", "Total number of AI images generated"),
        &["trigger"]
    ).expect("metric can be created");
    pub static ref STOCK_CANDIDATES_RETURNED: prometheus::Histogram = prometheus::Histogram::with_opts(
        HistogramOpts::new(
            "copysmith_stock_candidates_returned",
            "Stock candidates returned per lookup"
        ).buckets(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 10.0]),
    ).expect("metric can be created");
    pub static ref SOFT_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("copysmith_soft_failures_total", "Soft failures by pipeline stage"),
        &["stage"]
    ).expect("metric can be created");
    pub static ref QUOTA_REJECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("copysmith_quota_rejections_total", "Requests or branches refused by quota"),
        &["kind"]
    ).expect("metric can be created");

    // Provider Metrics
    pub static ref PROVIDER_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("copysmith_provider_requests_total", "Total number of external provider calls"),
        &["provider", "status"]
    ).expect("metric can be created");
    pub static ref PROVIDER_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "copysmith_provider_request_duration_seconds",
            "External provider call duration in seconds"
        ).buckets(vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["provider"]
    ).expect("metric can be created");

    // Application Metrics
    static ref STARTED_AT: Instant = Instant::now();
    pub static ref APP_UPTIME_SECONDS: Gauge = Gauge::new(
        "copysmith_app_uptime_seconds",
        "Application uptime in seconds"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("copysmith_errors_total", "Total number of errors"),
        &["error_type", "endpoint"]
    ).expect("metric can be created");
}

/// Record one provider call outcome and its latency.
pub fn observe_provider_call(provider: &str, status: &str, elapsed: Duration) {
    PROVIDER_REQUESTS_TOTAL
        .with_label_values(&[provider, status])
        .inc();
    PROVIDER_REQUEST_DURATION_SECONDS
        .with_label_values(&[provider])
        .observe(elapsed.as_secs_f64());
}

/// Refresh gauges that are computed rather than counted
pub fn refresh_uptime() {
    APP_UPTIME_SECONDS.set(STARTED_AT.elapsed().as_secs_f64());
}

/// Initialize metrics registry.
///
/// Registration happens once per process; later calls are no-ops.
pub fn init_metrics() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(register_all);
}

fn register_all() {
    lazy_static::initialize(&STARTED_AT);
    REGISTRY
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("HTTP_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))
        .expect("HTTP_REQUEST_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(GENERATIONS_TOTAL.clone()))
        .expect("GENERATIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(AI_IMAGES_TOTAL.clone()))
        .expect("AI_IMAGES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(STOCK_CANDIDATES_RETURNED.clone()))
        .expect("STOCK_CANDIDATES_RETURNED can be registered");
    REGISTRY
        .register(Box::new(SOFT_FAILURES_TOTAL.clone()))
        .expect("SOFT_FAILURES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(QUOTA_REJECTIONS_TOTAL.clone()))
        .expect("QUOTA_REJECTIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(PROVIDER_REQUESTS_TOTAL.clone()))
        .expect("PROVIDER_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(PROVIDER_REQUEST_DURATION_SECONDS.clone()))
        .expect("PROVIDER_REQUEST_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(APP_UPTIME_SECONDS.clone()))
        .expect("APP_UPTIME_SECONDS can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
