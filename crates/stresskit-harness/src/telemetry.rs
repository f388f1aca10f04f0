//! Prometheus metrics describing the harness itself
//!
//! Metrics are registered lazily on first access using once_cell::Lazy.

use once_cell::sync::Lazy;
use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter, register_int_counter_vec,
    Encoder, GaugeVec, HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

use stresskit_core::StressTestResult;

/// Scenario runs by kind and outcome (passed / failed / error)
pub static SCENARIO_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "stresskit_scenario_runs_total",
        "Total number of scenario runs",
        &["kind", "status"]
    )
    .expect("Failed to register scenario run counter")
});

/// Breaking points reached, by metric and recoverability
pub static BREAKING_POINTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "stresskit_breaking_points_total",
        "Total number of breaking points reached",
        &["metric", "recoverability"]
    )
    .expect("Failed to register breaking point counter")
});

/// Samples skipped because the metrics source failed
pub static DROPPED_SAMPLES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "stresskit_dropped_samples_total",
        "Metric samples skipped after a source failure"
    )
    .expect("Failed to register dropped sample counter")
});

/// Score of the most recent run of each scenario
pub static SCENARIO_SCORE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "stresskit_scenario_score",
        "Score (0-1) of the latest run of a scenario",
        &["scenario"]
    )
    .expect("Failed to register scenario score gauge")
});

/// Wall-clock duration of scenario runs
pub static SCENARIO_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "stresskit_scenario_duration_seconds",
        "Scenario run duration in seconds",
        &["kind"],
        vec![1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 3600.0]
    )
    .expect("Failed to register scenario duration histogram")
});

/// Record the outcome of one scenario run.
pub fn record_result(result: &StressTestResult) {
    let status = if !result.errors.is_empty() {
        "error"
    } else if result.passed {
        "passed"
    } else {
        "failed"
    };

    SCENARIO_RUNS
        .with_label_values(&[result.kind.as_str(), status])
        .inc();
    SCENARIO_SCORE
        .with_label_values(&[&result.scenario_id])
        .set(result.score);
    SCENARIO_DURATION
        .with_label_values(&[result.kind.as_str()])
        .observe(result.duration_ms as f64 / 1000.0);

    if let Some(bp) = &result.breaking_point {
        BREAKING_POINTS
            .with_label_values(&[bp.metric.as_str(), bp.recoverability.as_str()])
            .inc();
    }
}

/// Render every registered metric in the Prometheus text format.
pub fn export_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
