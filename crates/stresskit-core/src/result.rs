//! Result records produced by a stress run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::RunId;
use crate::sample::MetricSample;
use crate::scenario::{Metric, Recoverability, ScenarioKind};

/// First hard-threshold violation observed during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakingPoint {
    pub metric: Metric,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
    pub recoverability: Recoverability,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
}

/// Variance-based stability of a run's time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityAnalysis {
    /// Mean of the per-metric scores (0.0-1.0)
    pub overall_stability: f64,
    pub response_time_stability: f64,
    pub throughput_stability: f64,
    pub memory_stability: f64,

    /// Mean response time of the trailing window over the leading window
    pub performance_degradation: f64,

    /// Samples the analysis was computed from
    pub sample_count: usize,

    /// False when too few samples were available for the scores to mean anything
    pub conclusive: bool,
}

/// Peak, average and naive linear growth of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceTrend {
    pub peak: f64,
    pub average: f64,
    /// `(last - first) / count`
    pub growth: f64,
}

/// Resource usage over a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceUsageAnalysis {
    pub memory: ResourceTrend,
    pub cpu: ResourceTrend,
}

/// Per-metric aggregate (either peaks or averages) over a run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSummary {
    pub load: f64,
    pub response_time_ms: f64,
    pub throughput: f64,
    pub error_rate: f64,
    pub memory_usage: f64,
    pub cpu_usage: f64,
    pub active_connections: f64,
    pub queue_length: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

/// Remediation suggested by the report generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub category: String,
    pub title: String,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

/// Failure of the harness itself (as opposed to a breaking point).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionErrorEntry {
    pub severity: Severity,
    pub message: String,
    /// Error source chain, outermost first
    pub causes: Vec<String>,
}

/// How the system behaved after a breaking point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoveryObservation {
    pub recovered: bool,
    /// Time until expectations were met again, if they were
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered_after_ms: Option<u64>,
    /// Length of the observation window
    pub window_ms: u64,
}

/// Output record of one scenario run. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressTestResult {
    pub scenario_id: String,
    pub scenario_name: String,
    pub kind: ScenarioKind,
    pub passed: bool,
    pub duration_ms: u64,
    pub score: f64,
    pub peak_metrics: MetricSummary,
    pub average_metrics: MetricSummary,
    pub breaking_point: Option<BreakingPoint>,
    pub stability_analysis: StabilityAnalysis,
    pub resource_analysis: ResourceUsageAnalysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryObservation>,
    pub timeline: Vec<MetricSample>,
    pub recommendations: Vec<Recommendation>,
    pub errors: Vec<ExecutionErrorEntry>,
}

/// One breaking point listed in a suite summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakingPointSummary {
    pub scenario_id: String,
    pub metric: Metric,
    pub value: f64,
    pub threshold: f64,
    pub recoverability: Recoverability,
}

/// Aggregate over every result of a suite run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub run_id: RunId,
    pub total: usize,
    pub passed: usize,
    pub average_score: f64,
    pub breaking_points: Vec<BreakingPointSummary>,
}

impl SuiteSummary {
    /// Summarize a list of results.
    pub fn from_results(run_id: RunId, results: &[StressTestResult]) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        let average_score = if total == 0 {
            0.0
        } else {
            results.iter().map(|r| r.score).sum::<f64>() / total as f64
        };

        let breaking_points = results
            .iter()
            .filter_map(|r| {
                r.breaking_point.as_ref().map(|bp| BreakingPointSummary {
                    scenario_id: r.scenario_id.clone(),
                    metric: bp.metric,
                    value: bp.value,
                    threshold: bp.threshold,
                    recoverability: bp.recoverability,
                })
            })
            .collect();

        Self {
            run_id,
            total,
            passed,
            average_score,
            breaking_points,
        }
    }

    /// True when every scenario passed.
    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}
