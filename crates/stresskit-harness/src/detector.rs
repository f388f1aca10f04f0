//! Breaking-point detection
//!
//! Thresholds are evaluated in a fixed order and the first violation wins:
//! response time, error rate, memory, cpu. Each metric's recoverability
//! comes from the scenario's [`RecoverabilityTable`].

use chrono::Utc;
use tracing::warn;

use stresskit_core::{
    BreakingPoint, BreakingPointThresholds, Metric, MetricSample, RecoverabilityTable,
    TargetError,
};

/// Stateless threshold evaluator for one scenario.
#[derive(Debug, Clone)]
pub struct BreakingPointDetector {
    thresholds: BreakingPointThresholds,
    table: RecoverabilityTable,
}

impl BreakingPointDetector {
    pub fn new(thresholds: BreakingPointThresholds, table: RecoverabilityTable) -> Self {
        Self { thresholds, table }
    }

    /// Evaluate a sample. Returns the first violated threshold, if any.
    pub fn check(&self, sample: &MetricSample) -> Option<BreakingPoint> {
        let limits = &self.thresholds;
        let ordered = [
            (
                Metric::ResponseTime,
                sample.response_time_ms,
                limits.max_response_time_ms,
            ),
            (Metric::ErrorRate, sample.error_rate, limits.max_error_rate),
            (Metric::Memory, sample.memory_usage, limits.memory_limit),
            (Metric::Cpu, sample.cpu_usage, limits.cpu_limit),
        ];

        let (metric, value, threshold) = ordered
            .into_iter()
            .find(|(_, value, threshold)| value > threshold)?;

        let breaking_point = BreakingPoint {
            metric,
            value,
            threshold,
            timestamp: sample.timestamp,
            recoverability: self.table.classify(metric),
            root_cause: None,
        };

        warn!(
            metric = %metric,
            value,
            threshold,
            recoverability = %breaking_point.recoverability,
            load = sample.load,
            "Breaking point reached"
        );

        Some(breaking_point)
    }

    /// Convert a crashed target into a breaking point when crash detection is on.
    pub fn crash(&self, error: &TargetError) -> Option<BreakingPoint> {
        if !self.thresholds.crash_detection || !error.is_crash() {
            return None;
        }

        let recoverability = self.table.classify(Metric::Crash);
        warn!(error = %error, recoverability = %recoverability, "Target crashed");

        Some(BreakingPoint {
            metric: Metric::Crash,
            value: 1.0,
            threshold: 0.0,
            timestamp: Utc::now(),
            recoverability,
            root_cause: Some(error.to_string()),
        })
    }
}
