//! Scenario definitions: load shape, expectations and breaking-point limits.
//!
//! A [`Scenario`] is static configuration. It is built once when the harness
//! is configured and is never mutated while it runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{HarnessError, HarnessResult};
use crate::sample::MetricSample;
use crate::traits::TestCase;

/// Load shape executed by the scenario driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioKind {
    /// Ramp from initial to max load, then sustain.
    Load,
    /// Process a data volume in sequential chunks.
    Volume,
    /// Many independent workers at once.
    Concurrency,
    /// Constant load for a long period.
    Endurance,
    /// Instantaneous jump to max load.
    Spike,
    /// Allocation pressure.
    Memory,
    /// CPU-bound pressure.
    Cpu,
}

impl ScenarioKind {
    /// Stable lowercase label used in logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Volume => "volume",
            Self::Concurrency => "concurrency",
            Self::Endurance => "endurance",
            Self::Spike => "spike",
            Self::Memory => "memory",
            Self::Cpu => "cpu",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric watched by the breaking-point detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    ResponseTime,
    ErrorRate,
    Memory,
    Cpu,
    /// The target stopped responding (only with crash detection enabled).
    Crash,
}

impl Metric {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResponseTime => "responseTime",
            Self::ErrorRate => "errorRate",
            Self::Memory => "memory",
            Self::Cpu => "cpu",
            Self::Crash => "crash",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How badly a breaking point impairs the system under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recoverability {
    Recoverable,
    Degraded,
    Fatal,
}

impl Recoverability {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recoverable => "recoverable",
            Self::Degraded => "degraded",
            Self::Fatal => "fatal",
        }
    }

    /// Multiplier applied to the scenario score when this class is reached.
    #[must_use]
    pub fn score_penalty(&self) -> f64 {
        match self {
            Self::Fatal => 0.1,
            Self::Degraded => 0.5,
            Self::Recoverable => 0.8,
        }
    }
}

impl fmt::Display for Recoverability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load parameters shared by every scenario kind. Each kind reads the
/// subset it needs.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadParameters {
    /// Load level at the start of a ramp
    pub initial_load: u32,

    /// Peak load level
    pub max_load: u32,

    /// Load added per tick while ramping
    pub ramp_up_rate: u32,

    /// How long max load is held after ramping (ms)
    pub sustain_duration_ms: u64,

    /// Number of concurrent workers
    pub concurrency: usize,

    /// Number of records processed by a volume scenario
    pub data_volume: u64,

    /// Target operation rate (ops/sec), informational for targets that pace themselves
    pub target_ops_per_sec: u32,

    /// Total memory allocated by a memory scenario (MB)
    pub memory_pressure_mb: u64,

    /// Fraction (0.0-1.0) of each sub-interval spent spinning in a cpu scenario
    pub cpu_pressure: f64,
}

impl Default for LoadParameters {
    fn default() -> Self {
        Self {
            initial_load: 10,
            max_load: 100,
            ramp_up_rate: 10,
            sustain_duration_ms: 60_000,
            concurrency: 10,
            data_volume: 10_000,
            target_ops_per_sec: 100,
            memory_pressure_mb: 256,
            cpu_pressure: 0.8,
        }
    }
}

impl LoadParameters {
    /// Sustain phase length as a `Duration`
    pub fn sustain_duration(&self) -> Duration {
        Duration::from_millis(self.sustain_duration_ms)
    }
}

/// Thresholds the system is expected to stay within.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Expectations {
    /// Maximum acceptable response time (ms)
    pub max_response_time_ms: f64,

    /// Minimum acceptable throughput (ops/sec)
    pub min_throughput: f64,

    /// Maximum acceptable error rate (0.0-1.0)
    pub max_error_rate: f64,

    /// Maximum acceptable memory usage (0.0-1.0)
    pub max_memory_usage: f64,

    /// Maximum acceptable cpu usage (0.0-1.0)
    pub max_cpu_usage: f64,

    /// Minimum system stability (0.0-1.0)
    pub stability_threshold: f64,

    /// Time the system may take to recover after a breaking point (ms)
    pub recovery_time_ms: u64,
}

impl Default for Expectations {
    fn default() -> Self {
        Self {
            max_response_time_ms: 1000.0,
            min_throughput: 0.0,
            max_error_rate: 0.01,
            max_memory_usage: 0.8,
            max_cpu_usage: 0.8,
            stability_threshold: 0.9,
            recovery_time_ms: 30_000,
        }
    }
}

impl Expectations {
    /// Recovery window as a `Duration`
    pub fn recovery_time(&self) -> Duration {
        Duration::from_millis(self.recovery_time_ms)
    }

    /// Check a sample against every expectation and return the failures.
    pub fn violations(&self, sample: &MetricSample) -> Vec<String> {
        let mut failures = Vec::new();

        if sample.response_time_ms > self.max_response_time_ms {
            failures.push(format!(
                "Response time {:.2}ms exceeds target {:.2}ms",
                sample.response_time_ms, self.max_response_time_ms
            ));
        }

        if sample.throughput < self.min_throughput {
            failures.push(format!(
                "Throughput {:.1} ops/s below target {:.1} ops/s",
                sample.throughput, self.min_throughput
            ));
        }

        if sample.error_rate > self.max_error_rate {
            failures.push(format!(
                "Error rate {:.4}% exceeds target {:.4}%",
                sample.error_rate * 100.0,
                self.max_error_rate * 100.0
            ));
        }

        if sample.memory_usage > self.max_memory_usage {
            failures.push(format!(
                "Memory usage {:.1}% exceeds target {:.1}%",
                sample.memory_usage * 100.0,
                self.max_memory_usage * 100.0
            ));
        }

        if sample.cpu_usage > self.max_cpu_usage {
            failures.push(format!(
                "CPU usage {:.1}% exceeds target {:.1}%",
                sample.cpu_usage * 100.0,
                self.max_cpu_usage * 100.0
            ));
        }

        if sample.system_stability < self.stability_threshold {
            failures.push(format!(
                "System stability {:.3} below target {:.3}",
                sample.system_stability, self.stability_threshold
            ));
        }

        failures
    }

    /// True when the sample is within every expectation.
    pub fn is_satisfied_by(&self, sample: &MetricSample) -> bool {
        self.violations(sample).is_empty()
    }
}

/// Hard limits; crossing one of them is a breaking point.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakingPointThresholds {
    /// Response time limit (ms)
    pub max_response_time_ms: f64,

    /// Error rate limit (0.0-1.0)
    pub max_error_rate: f64,

    /// Memory usage limit (0.0-1.0)
    pub memory_limit: f64,

    /// CPU usage limit (0.0-1.0)
    pub cpu_limit: f64,

    /// Treat a crashed target as a breaking point instead of an execution error
    pub crash_detection: bool,
}

impl Default for BreakingPointThresholds {
    fn default() -> Self {
        Self {
            max_response_time_ms: 5000.0,
            max_error_rate: 0.1,
            memory_limit: 0.95,
            cpu_limit: 0.95,
            crash_detection: true,
        }
    }
}

/// Recoverability assigned to each metric when it crosses its limit.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RecoverabilityTable {
    pub response_time: Recoverability,
    pub error_rate: Recoverability,
    pub memory: Recoverability,
    pub cpu: Recoverability,
    pub crash: Recoverability,
}

impl Default for RecoverabilityTable {
    fn default() -> Self {
        Self {
            response_time: Recoverability::Degraded,
            error_rate: Recoverability::Degraded,
            memory: Recoverability::Fatal,
            cpu: Recoverability::Recoverable,
            crash: Recoverability::Fatal,
        }
    }
}

impl RecoverabilityTable {
    /// Look up the class for a metric.
    #[must_use]
    pub fn classify(&self, metric: Metric) -> Recoverability {
        match metric {
            Metric::ResponseTime => self.response_time,
            Metric::ErrorRate => self.error_rate,
            Metric::Memory => self.memory,
            Metric::Cpu => self.cpu,
            Metric::Crash => self.crash,
        }
    }
}

/// A named, parameterized load-shape definition.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Scenario {
    /// Unique identifier, used to select scenarios and name test cases
    pub id: String,

    /// Human readable name
    pub name: String,

    /// Load shape
    pub kind: ScenarioKind,

    /// Overall duration budget (ms); cpu scenarios spin for this long
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,

    #[serde(default)]
    pub load: LoadParameters,

    #[serde(default)]
    pub expectations: Expectations,

    #[serde(default)]
    pub breaking_point: BreakingPointThresholds,

    #[serde(default)]
    pub recoverability: RecoverabilityTable,
}

fn default_duration_ms() -> u64 {
    60_000
}

impl Scenario {
    /// Create a scenario with default parameters.
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ScenarioKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            duration_ms: default_duration_ms(),
            load: LoadParameters::default(),
            expectations: Expectations::default(),
            breaking_point: BreakingPointThresholds::default(),
            recoverability: RecoverabilityTable::default(),
        }
    }

    /// The scenario as an independently runnable `stress::<id>` test case.
    pub fn test_case(&self) -> TestCase {
        TestCase {
            name: format!("stress::{}", self.id),
            scenario_id: self.id.clone(),
            description: format!("{} stress test: {}", self.kind, self.name),
        }
    }

    /// Duration budget as a `Duration`
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Validate the scenario definition.
    ///
    /// Breaking-point limits must sit at or beyond the matching expectation,
    /// so that reaching a breaking point always implies a violated expectation.
    pub fn validate(&self) -> HarnessResult<()> {
        let invalid = |message: String| -> HarnessResult<()> {
            Err(HarnessError::invalid_scenario(&self.id, message))
        };

        if self.id.trim().is_empty() {
            return Err(HarnessError::invalid_scenario(
                "<unnamed>",
                "scenario id must not be empty",
            ));
        }

        let load = &self.load;
        if load.max_load < load.initial_load {
            return invalid(format!(
                "load.max_load ({}) must be >= load.initial_load ({})",
                load.max_load, load.initial_load
            ));
        }

        if self.kind == ScenarioKind::Load && load.ramp_up_rate == 0 {
            return invalid("load.ramp_up_rate must be > 0".to_string());
        }

        if self.kind == ScenarioKind::Concurrency && load.concurrency == 0 {
            return invalid("load.concurrency must be > 0".to_string());
        }

        if !(0.0..=1.0).contains(&load.cpu_pressure) {
            return invalid(format!(
                "load.cpu_pressure ({}) must be within 0.0-1.0",
                load.cpu_pressure
            ));
        }

        let limits = &self.breaking_point;
        let expected = &self.expectations;
        let pairs = [
            (
                "max_response_time_ms",
                limits.max_response_time_ms,
                expected.max_response_time_ms,
            ),
            ("max_error_rate", limits.max_error_rate, expected.max_error_rate),
            ("memory_limit", limits.memory_limit, expected.max_memory_usage),
            ("cpu_limit", limits.cpu_limit, expected.max_cpu_usage),
        ];

        for (name, limit, expectation) in pairs {
            if limit < expectation {
                return invalid(format!(
                    "breaking_point.{name} ({limit}) is stricter than its expectation \
                     ({expectation})"
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_with(response_time_ms: f64, error_rate: f64) -> MetricSample {
        MetricSample {
            response_time_ms,
            error_rate,
            system_stability: 1.0 - error_rate,
            throughput: 100.0,
            memory_usage: 0.5,
            cpu_usage: 0.5,
            ..MetricSample::default()
        }
    }

    #[test]
    fn test_default_recoverability_mapping() {
        let table = RecoverabilityTable::default();
        assert_eq!(table.classify(Metric::ResponseTime), Recoverability::Degraded);
        assert_eq!(table.classify(Metric::ErrorRate), Recoverability::Degraded);
        assert_eq!(table.classify(Metric::Memory), Recoverability::Fatal);
        assert_eq!(table.classify(Metric::Cpu), Recoverability::Recoverable);
    }

    #[test]
    fn test_default_scenario_is_valid() {
        let scenario = Scenario::new("baseline", "Baseline", ScenarioKind::Load);
        assert!(scenario.validate().is_ok());
    }

    #[test]
    fn test_threshold_stricter_than_expectation_is_rejected() {
        let mut scenario = Scenario::new("strict", "Strict", ScenarioKind::Load);
        scenario.expectations.max_response_time_ms = 2000.0;
        scenario.breaking_point.max_response_time_ms = 1500.0;

        let err = scenario.validate().unwrap_err();
        assert!(err.to_string().contains("max_response_time_ms"));
    }

    #[test]
    fn test_equal_threshold_and_expectation_is_accepted() {
        let mut scenario = Scenario::new("equal", "Equal", ScenarioKind::Load);
        scenario.expectations.max_response_time_ms = 2000.0;
        scenario.breaking_point.max_response_time_ms = 2000.0;
        assert!(scenario.validate().is_ok());
    }

    #[test]
    fn test_inverted_load_range_is_rejected() {
        let mut scenario = Scenario::new("ramp", "Ramp", ScenarioKind::Load);
        scenario.load.initial_load = 50;
        scenario.load.max_load = 10;
        assert!(scenario.validate().is_err());

        scenario.load.max_load = 50;
        scenario.load.ramp_up_rate = 0;
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn test_expectation_violations() {
        let expectations = Expectations::default();

        assert!(expectations.is_satisfied_by(&sample_with(100.0, 0.0)));

        let failures = expectations.violations(&sample_with(1500.0, 0.5));
        assert!(failures.iter().any(|f| f.contains("Response time")));
        assert!(failures.iter().any(|f| f.contains("Error rate")));
        assert!(failures.iter().any(|f| f.contains("stability")));
    }

    #[test]
    fn test_scenario_kind_parses_lowercase() {
        let kind: ScenarioKind = serde_json::from_str("\"endurance\"").unwrap();
        assert_eq!(kind, ScenarioKind::Endurance);
        assert_eq!(serde_json::to_string(&Metric::ResponseTime).unwrap(), "\"responseTime\"");
    }

    #[test]
    fn test_scenario_as_test_case() {
        let case = Scenario::new("soak", "Overnight soak", ScenarioKind::Endurance).test_case();
        assert_eq!(case.name, "stress::soak");
        assert_eq!(case.scenario_id, "soak");
        assert_eq!(case.description, "endurance stress test: Overnight soak");
    }

    #[test]
    fn test_duration_defaults_when_omitted() {
        let scenario: Scenario =
            serde_json::from_str(r#"{"id":"a","name":"A","kind":"spike"}"#).unwrap();
        assert_eq!(scenario.duration_ms, 60_000);
        assert_eq!(scenario.load, LoadParameters::default());
    }
}
