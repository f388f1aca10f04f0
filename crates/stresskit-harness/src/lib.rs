//! Stress and breaking-point harness
//!
//! Drives registered scenarios against a [`stresskit_core::LoadTarget`],
//! samples a [`stresskit_core::MetricsSource`] while doing so, and reports
//! where and how the system under test broke.

pub mod collector;
pub mod detector;
pub mod driver;
pub mod http;
pub mod orchestrator;
pub mod pressure;
pub mod report;
pub mod resources;
pub mod sources;
pub mod stability;
pub mod synthetic;
pub mod telemetry;
pub mod timeseries;
pub mod writer;

pub use collector::MetricsCollector;
pub use detector::BreakingPointDetector;
pub use driver::{LoadPhase, ScenarioDriver};
pub use http::{HttpTarget, HttpTargetOptions};
pub use orchestrator::{StressHarness, SuiteRun};
pub use report::{ReportGenerator, RunOutcome};
pub use resources::analyze_resources;
pub use sources::{ProcessMetricsSource, RequestStats, RequestWindow};
pub use stability::StabilityAnalyzer;
pub use timeseries::TimeSeries;
pub use writer::{ReportFormat, ReportWriter};
