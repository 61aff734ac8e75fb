//! Prometheus metrics for the conversion pipeline.
//!
//! This module provides metrics for:
//! - Conversions (outcome, duration, failure kinds)
//! - Fallbacks from the primary to the secondary path
//! - Enrichers and the remote backends they call

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Conversion Metrics
// =============================================================================

/// Conversions total by adapter and outcome.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("transmute_conversions_total", "Total conversions"),
        &["adapter", "outcome"], // outcome: "succeeded", "failed"
    )
    .expect("valid metric")
});

/// Conversion duration in seconds.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "transmute_conversion_duration_seconds",
            "Duration of conversions, gate to release",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["adapter"],
    )
    .expect("valid metric")
});

/// Failed conversions by error kind.
pub static CONVERSION_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "transmute_conversion_failures_total",
            "Failed conversions by error kind",
        ),
        &["kind"],
    )
    .expect("valid metric")
});

/// Conversions currently executing.
pub static CONVERSIONS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "transmute_conversions_in_flight",
        "Conversions holding a scratch directory",
    )
    .expect("valid metric")
});

/// Input and output sizes.
pub static PAYLOAD_BYTES: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("transmute_payload_bytes", "Payload sizes in bytes").buckets(
            vec![
                1_024.0,
                16_384.0,
                131_072.0,
                1_048_576.0,
                8_388_608.0,
                67_108_864.0,
                268_435_456.0,
            ],
        ),
        &["direction"], // "input", "output"
    )
    .expect("valid metric")
});

// =============================================================================
// Fallback Metrics
// =============================================================================

/// Times the secondary path ran after a transport failure.
pub static FALLBACKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "transmute_fallbacks_total",
            "Fallbacks from the primary to the secondary converter",
        ),
        &["kind"], // "backend_unavailable", "timeout"
    )
    .expect("valid metric")
});

/// Requests sent to a remote conversion backend.
pub static REMOTE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "transmute_remote_requests_total",
            "Requests sent to the remote conversion backend",
        ),
        &["status"], // "success", "rejected", "error"
    )
    .expect("valid metric")
});

// =============================================================================
// Enricher Metrics
// =============================================================================

/// Enricher runs by name and outcome.
pub static ENRICHER_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("transmute_enricher_runs_total", "Enricher runs"),
        &["enricher", "outcome"], // outcome: "attached", "skipped", "failed"
    )
    .expect("valid metric")
});

/// Quota denials.
pub static QUOTA_DENIALS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "transmute_quota_denials_total",
        "Requests denied by the usage gate",
    )
    .expect("valid metric")
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(CONVERSION_FAILURES.clone()),
        Box::new(CONVERSIONS_IN_FLIGHT.clone()),
        Box::new(PAYLOAD_BYTES.clone()),
        Box::new(FALLBACKS_TOTAL.clone()),
        Box::new(REMOTE_REQUESTS.clone()),
        Box::new(ENRICHER_RUNS.clone()),
        Box::new(QUOTA_DENIALS.clone()),
    ]
}
