//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("kotipat_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");
    pub static ref HTTP_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "kotipat_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "endpoint"]
    ).expect("metric can be created");

    // Database Metrics
    pub static ref DB_QUERIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("kotipat_db_queries_total", "Total number of database queries"),
        &["operation", "table"]
    ).expect("metric can be created");
    pub static ref DB_QUERY_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "kotipat_db_query_duration_seconds",
            "Database query duration in seconds"
        ).buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["operation", "table"]
    ).expect("metric can be created");

    // Federation Metrics
    pub static ref INBOUND_VERIFICATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("kotipat_inbound_verifications_total", "Inbound signature verifications by final stage and rejection kind"),
        &["stage", "reason"]
    ).expect("metric can be created");
    pub static ref ACTOR_KEY_FETCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("kotipat_actor_key_fetches_total", "Total number of remote actor key fetches"),
        &["status"]
    ).expect("metric can be created");
    pub static ref ACTOR_KEY_FETCH_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "kotipat_actor_key_fetch_duration_seconds",
            "Remote actor key fetch duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    ).expect("metric can be created");
    pub static ref OBJECTS_STORED_TOTAL: IntCounter = IntCounter::new(
        "kotipat_objects_stored_total",
        "Total number of objects stored from inbound deliveries"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("kotipat_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("HTTP_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))
        .expect("HTTP_REQUEST_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(DB_QUERIES_TOTAL.clone()))
        .expect("DB_QUERIES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(DB_QUERY_DURATION_SECONDS.clone()))
        .expect("DB_QUERY_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(INBOUND_VERIFICATIONS_TOTAL.clone()))
        .expect("INBOUND_VERIFICATIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ACTOR_KEY_FETCHES_TOTAL.clone()))
        .expect("ACTOR_KEY_FETCHES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ACTOR_KEY_FETCH_DURATION_SECONDS.clone()))
        .expect("ACTOR_KEY_FETCH_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(OBJECTS_STORED_TOTAL.clone()))
        .expect("OBJECTS_STORED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
