//! Assemble a [`StressTestResult`] from the pieces of a finished run

use std::error::Error as StdError;
use std::time::Duration;

use stresskit_core::{
    BreakingPoint, ExecutionErrorEntry, HarnessError, Metric, MetricSample, Priority,
    Recommendation, Recoverability, RecoveryObservation, ResourceUsageAnalysis, Scenario,
    Severity, StabilityAnalysis, StressTestResult,
};

use crate::resources::analyze_resources;
use crate::stability::StabilityAnalyzer;
use crate::timeseries::TimeSeries;

/// Degradation ratio above which a recommendation is emitted.
const DEGRADATION_ALERT: f64 = 1.5;

/// Everything the driver and analyzers produced for one run.
pub struct RunOutcome {
    pub breaking_point: Option<BreakingPoint>,
    pub timeline: TimeSeries,
    pub duration: Duration,
    pub recovery: Option<RecoveryObservation>,
}

pub struct ReportGenerator {
    analyzer: StabilityAnalyzer,
}

impl ReportGenerator {
    pub fn new(analyzer: StabilityAnalyzer) -> Self {
        Self { analyzer }
    }

    /// Build the result record of a completed run.
    pub fn generate(&self, scenario: &Scenario, outcome: RunOutcome) -> StressTestResult {
        let RunOutcome {
            breaking_point,
            timeline,
            duration,
            recovery,
        } = outcome;

        let resources = analyze_resources(&timeline);
        let peak_metrics = timeline.peaks();
        let average_metrics = timeline.averages();
        let latest = timeline.latest().cloned();
        let samples = timeline.into_samples();
        let stability = self.analyzer.analyze(&samples);

        let passed = Self::passed(scenario, breaking_point.as_ref(), latest.as_ref());
        let score = Self::score(breaking_point.as_ref(), &stability);
        let recommendations = Self::recommendations(
            scenario,
            breaking_point.as_ref(),
            &stability,
            &resources,
            recovery.as_ref(),
        );

        StressTestResult {
            scenario_id: scenario.id.clone(),
            scenario_name: scenario.name.clone(),
            kind: scenario.kind,
            passed,
            duration_ms: duration.as_millis() as u64,
            score,
            peak_metrics,
            average_metrics,
            breaking_point,
            stability_analysis: stability,
            resource_analysis: resources,
            recovery,
            timeline: samples,
            recommendations,
            errors: Vec::new(),
        }
    }

    /// Build the failed result of a run the harness could not complete.
    pub fn execution_failure(
        &self,
        scenario: &Scenario,
        error: &HarnessError,
        timeline: TimeSeries,
        duration: Duration,
    ) -> StressTestResult {
        let resources = analyze_resources(&timeline);
        let peak_metrics = timeline.peaks();
        let average_metrics = timeline.averages();
        let samples = timeline.into_samples();
        let stability = self.analyzer.analyze(&samples);

        StressTestResult {
            scenario_id: scenario.id.clone(),
            scenario_name: scenario.name.clone(),
            kind: scenario.kind,
            passed: false,
            duration_ms: duration.as_millis() as u64,
            score: 0.0,
            peak_metrics,
            average_metrics,
            breaking_point: None,
            stability_analysis: stability,
            resource_analysis: resources,
            recovery: None,
            timeline: samples,
            recommendations: vec![Recommendation {
                priority: Priority::Critical,
                category: "execution".to_string(),
                title: "Fix the stress test execution failure".to_string(),
                actions: vec![
                    format!("Resolve the execution error: {error}"),
                    "Verify the target and metrics source are reachable before re-running"
                        .to_string(),
                ],
            }],
            errors: vec![ExecutionErrorEntry {
                severity: Severity::Critical,
                message: error.to_string(),
                causes: error_chain(error),
            }],
        }
    }

    /// No fatal breaking point, and the latest sample meets every expectation.
    pub fn passed(
        scenario: &Scenario,
        breaking_point: Option<&BreakingPoint>,
        latest: Option<&MetricSample>,
    ) -> bool {
        if breaking_point.is_some_and(|bp| bp.recoverability == Recoverability::Fatal) {
            return false;
        }
        latest.is_some_and(|sample| scenario.expectations.is_satisfied_by(sample))
    }

    /// `1.0 × recoverability penalty × overall stability`
    pub fn score(breaking_point: Option<&BreakingPoint>, stability: &StabilityAnalysis) -> f64 {
        let penalty = breaking_point.map_or(1.0, |bp| bp.recoverability.score_penalty());
        (penalty * stability.overall_stability).clamp(0.0, 1.0)
    }

    fn recommendations(
        scenario: &Scenario,
        breaking_point: Option<&BreakingPoint>,
        stability: &StabilityAnalysis,
        resources: &ResourceUsageAnalysis,
        recovery: Option<&RecoveryObservation>,
    ) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();

        if let Some(bp) = breaking_point {
            recommendations.push(remediation_for(bp));
        }

        if let Some(observed) = recovery {
            if !observed.recovered {
                recommendations.push(Recommendation {
                    priority: Priority::High,
                    category: "recovery".to_string(),
                    title: "System did not recover within the expected time".to_string(),
                    actions: vec![
                        format!(
                            "Investigate why expectations were still violated after {} ms",
                            observed.window_ms
                        ),
                        "Add load shedding or back-pressure so overload clears on its own"
                            .to_string(),
                    ],
                });
            }
        }

        if stability.overall_stability < scenario.expectations.stability_threshold {
            recommendations.push(Recommendation {
                priority: Priority::Medium,
                category: "stability".to_string(),
                title: format!(
                    "Stability {:.3} is below the {:.3} threshold",
                    stability.overall_stability, scenario.expectations.stability_threshold
                ),
                actions: vec![
                    "Look for contention, GC pauses or noisy neighbours during the run".to_string(),
                ],
            });
        }

        if stability.performance_degradation > DEGRADATION_ALERT {
            recommendations.push(Recommendation {
                priority: Priority::Medium,
                category: "performance".to_string(),
                title: format!(
                    "Response time degraded {:.2}x over the run",
                    stability.performance_degradation
                ),
                actions: vec![
                    "Check for leaks, unbounded queues or cache churn under sustained load"
                        .to_string(),
                ],
            });
        }

        if resources.memory.growth > 0.0
            && resources.memory.peak > scenario.expectations.max_memory_usage
        {
            recommendations.push(Recommendation {
                priority: Priority::Medium,
                category: "memory".to_string(),
                title: "Memory grew past its expectation during the run".to_string(),
                actions: vec!["Profile allocations under load".to_string()],
            });
        }

        if !stability.conclusive {
            recommendations.push(Recommendation {
                priority: Priority::Low,
                category: "sampling".to_string(),
                title: "Too few samples for a meaningful stability analysis".to_string(),
                actions: vec![
                    "Increase the scenario duration or lower the sampling interval".to_string(),
                ],
            });
        }

        recommendations.sort_by_key(|r| r.priority);
        recommendations
    }
}

/// Canned remediation keyed by the metric that broke.
fn remediation_for(bp: &BreakingPoint) -> Recommendation {
    let priority = match bp.recoverability {
        Recoverability::Fatal => Priority::High,
        Recoverability::Degraded => Priority::Medium,
        Recoverability::Recoverable => Priority::Low,
    };

    let (category, title, actions): (&str, &str, &[&str]) = match bp.metric {
        Metric::Memory => (
            "memory",
            "Scale or optimize memory usage",
            &[
                "Increase the memory available to the service",
                "Reduce per-request allocations and cache footprints",
            ],
        ),
        Metric::Cpu => (
            "cpu",
            "Scale or optimize compute",
            &[
                "Add CPU capacity or scale out horizontally",
                "Profile and optimize CPU-bound hot paths",
            ],
        ),
        Metric::ResponseTime => (
            "performance",
            "Add caching to reduce response time",
            &[
                "Cache frequently requested data",
                "Review slow queries and downstream calls",
            ],
        ),
        Metric::ErrorRate => (
            "reliability",
            "Reduce the error rate under load",
            &[
                "Add retries with backoff for transient failures",
                "Put circuit breakers in front of failing dependencies",
            ],
        ),
        Metric::Crash => (
            "reliability",
            "Investigate the target crash",
            &[
                "Collect crash logs and core dumps from the target",
                "Add health checks and automatic restarts",
            ],
        ),
    };

    Recommendation {
        priority,
        category: category.to_string(),
        title: format!(
            "{title} ({} reached {:.3}, limit {:.3})",
            bp.metric, bp.value, bp.threshold
        ),
        actions: actions.iter().map(|a| (*a).to_string()).collect(),
    }
}

fn error_chain(error: &HarnessError) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = error.source();
    while let Some(cause) = current {
        causes.push(cause.to_string());
        current = cause.source();
    }
    causes
}
