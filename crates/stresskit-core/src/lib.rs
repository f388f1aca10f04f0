//! Core domain types and traits for the stresskit harness.

pub mod config;
pub mod error;
pub mod ids;
pub mod result;
pub mod sample;
pub mod scenario;
pub mod traits;

pub use config::{HarnessConfig, StresskitConfig};
pub use error::{HarnessError, HarnessResult, SourceError, TargetError};
pub use ids::RunId;
pub use result::{
    BreakingPoint, BreakingPointSummary, ExecutionErrorEntry, MetricSummary, Priority,
    Recommendation, RecoveryObservation, ResourceTrend, ResourceUsageAnalysis, Severity,
    StabilityAnalysis, StressTestResult, SuiteSummary,
};
pub use sample::{MetricSample, PerformanceSnapshot};
pub use scenario::{
    BreakingPointThresholds, Expectations, LoadParameters, Metric, Recoverability,
    RecoverabilityTable, Scenario, ScenarioKind,
};
pub use traits::{CacheControl, LoadTarget, MetricsSource, NoopCache, TestCase, TestRegistrar};
