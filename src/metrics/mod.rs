//! Prometheus metrics for the rotation engine
//!
//! This module provides metrics tracking for:
//! - Watchers: probe verdicts, demotions, bundle publishes
//! - Engine: selections by operation and outcome, tracked groups
//! - Catch-up: newly discovered groups
//! - HTTP: requests by endpoint and status, request duration
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge_vec, register_histogram_vec, Counter,
    CounterVec, Encoder, GaugeVec, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all engine metrics
struct EngineMetrics {
    probes: CounterVec,
    demotions: Counter,
    publishes: CounterVec,
    selections: CounterVec,
    discoveries: CounterVec,
    tracked_groups: GaugeVec,
    api_requests: CounterVec,
    api_duration: HistogramVec,
}

/// Global storage for engine metrics
static ENGINE_METRICS: OnceLock<EngineMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Call once at startup. A second call is a no-op. If registration fails
/// the error is returned and every recording function stays a no-op.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = rotor::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = EngineMetrics {
        probes: register_counter_vec!(
            "rotor_health_probes_total",
            "Domain health probes by verdict",
            &["verdict"]
        )?,
        demotions: register_counter!(
            "rotor_domain_demotions_total",
            "Domains demoted to DOWN by the health monitor"
        )?,
        publishes: register_counter_vec!(
            "rotor_bundle_publishes_total",
            "Content bundle publish attempts by outcome",
            &["outcome"]
        )?,
        selections: register_counter_vec!(
            "rotor_selections_total",
            "Selection requests by operation and outcome",
            &["operation", "outcome"]
        )?,
        discoveries: register_counter_vec!(
            "rotor_groups_discovered_total",
            "Groups picked up by the catch-up task",
            &["kind"]
        )?,
        tracked_groups: register_gauge_vec!(
            "rotor_tracked_groups",
            "Groups currently served by the engine",
            &["kind"]
        )?,
        api_requests: register_counter_vec!(
            "rotor_api_requests_total",
            "Total API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
        api_duration: register_histogram_vec!(
            "rotor_api_request_duration_seconds",
            "API request duration in seconds",
            &["endpoint"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
        )?,
    };

    ENGINE_METRICS
        .set(metrics)
        .map_err(|_| "Engine metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    ENGINE_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record one probe verdict
pub fn record_probe(verdict: &str) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.probes.with_label_values(&[verdict]).inc();
    }
}

/// Record a domain demotion
pub fn record_demotion() {
    if let Some(m) = ENGINE_METRICS.get() {
        m.demotions.inc();
    }
}

/// Record a publish attempt
pub fn record_publish(outcome: &str) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.publishes.with_label_values(&[outcome]).inc();
    }
}

/// Record a selection request
pub fn record_selection(operation: &str, outcome: &str) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.selections.with_label_values(&[operation, outcome]).inc();
    }
}

/// Record groups found by catch-up
pub fn record_discovery(kind: &str, count: usize) {
    let Some(m) = ENGINE_METRICS.get() else {
        return;
    };

    if count > 0 {
        m.discoveries
            .with_label_values(&[kind])
            .inc_by(count as f64);
    }
}

/// Update the tracked group gauges
pub fn set_tracked_groups(show: usize, jump: usize, content: usize) {
    let Some(m) = ENGINE_METRICS.get() else {
        return;
    };

    m.tracked_groups.with_label_values(&["show"]).set(show as f64);
    m.tracked_groups.with_label_values(&["jump"]).set(jump as f64);
    m.tracked_groups
        .with_label_values(&["content"])
        .set(content as f64);
}

/// Record API request
pub fn record_api_request(endpoint: &str, status: u16, duration_secs: f64) {
    let Some(m) = ENGINE_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.api_requests
        .with_label_values(&[endpoint, &status_str])
        .inc();
    m.api_duration
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

// ============================================================================
// Tests
// ============================================================================
