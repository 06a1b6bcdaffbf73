/// Metrics and telemetry for CyberGuard
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Consultation outcomes and credit movements
/// - Rate-limit rejections and tool invocations
/// - Background job execution

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_gauge, register_histogram_vec, register_int_counter,
    register_int_counter_vec, register_int_gauge, Counter, Encoder, Gauge, HistogramVec,
    IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use rust_decimal::{prelude::ToPrimitive, Decimal};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();

    /// Active HTTP requests
    pub static ref HTTP_REQUESTS_ACTIVE: IntGauge = register_int_gauge!(
        "http_requests_active",
        "Number of HTTP requests currently being processed"
    )
    .unwrap();

    // ========== Consultation Metrics ==========

    /// Consultations by terminal state
    pub static ref CONSULTATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "consultations_total",
        "Total number of consultation requests by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Credits taken by the credit gate
    pub static ref CREDITS_DEBITED_TOTAL: Counter = register_counter!(
        "credits_debited_total",
        "Total credits debited for consultations"
    )
    .unwrap();

    /// Credits handed back after failed consultations
    pub static ref CREDITS_REFUNDED_TOTAL: Counter = register_counter!(
        "credits_refunded_total",
        "Total credits refunded after upstream failures"
    )
    .unwrap();

    /// External AI and payment call latency
    pub static ref UPSTREAM_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "upstream_request_duration_seconds",
        "Latency of external collaborator calls in seconds",
        &["collaborator", "status"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .unwrap();

    // ========== Account Metrics ==========

    /// Anonymous accounts created by the identity resolver
    pub static ref ACCOUNTS_CREATED_TOTAL: IntCounter = register_int_counter!(
        "accounts_created_total",
        "Total number of anonymous accounts created"
    )
    .unwrap();

    // ========== Rate Limit & Tool Metrics ==========

    /// Rate-limit rejections by bucket
    pub static ref RATE_LIMITED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rate_limited_total",
        "Total number of requests rejected by rate limiting",
        &["bucket"]
    )
    .unwrap();

    /// Security tool invocations by tool and status
    pub static ref TOOL_INVOCATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tool_invocations_total",
        "Total number of security tool invocations",
        &["tool", "status"]
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();

    /// Background job duration in seconds
    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "background_job_duration_seconds",
        "Background job execution time in seconds",
        &["job_type"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 10.0]
    )
    .unwrap();

    // ========== System Metrics ==========

    /// Application uptime in seconds
    pub static ref UPTIME_SECONDS: Gauge = register_gauge!(
        "uptime_seconds",
        "Application uptime in seconds"
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record a consultation reaching a terminal state
pub fn record_consultation(outcome: &str) {
    CONSULTATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Consultations that reached `Responded` since startup
pub fn questions_answered() -> u64 {
    CONSULTATIONS_TOTAL.with_label_values(&["responded"]).get()
}

pub fn record_credits_debited(amount: Decimal) {
    CREDITS_DEBITED_TOTAL.inc_by(amount.to_f64().unwrap_or(0.0));
}

pub fn record_credits_refunded(amount: Decimal) {
    CREDITS_REFUNDED_TOTAL.inc_by(amount.to_f64().unwrap_or(0.0));
}

/// Record an external collaborator call
pub fn record_upstream_call(collaborator: &str, success: bool, duration: f64) {
    UPSTREAM_REQUEST_DURATION_SECONDS
        .with_label_values(&[collaborator, if success { "success" } else { "failure" }])
        .observe(duration);
}

pub fn record_account_created() {
    ACCOUNTS_CREATED_TOTAL.inc();
}

pub fn record_rate_limited(bucket: &str) {
    RATE_LIMITED_TOTAL.with_label_values(&[bucket]).inc();
}

/// Record a security tool invocation
pub fn record_tool_invocation(tool: &str, success: bool) {
    TOOL_INVOCATIONS_TOTAL
        .with_label_values(&[tool, if success { "success" } else { "failure" }])
        .inc();
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, status: &str, duration: f64) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_type])
        .observe(duration);
}
