//! End-to-end harness runs against synthetic targets
//!
//! Covers:
//! 1. Response-time breaking point during a load ramp
//! 2. Fatal memory breaking point
//! 3. Quiescent suite passes cleanly
//! 4. Re-entrant runs are rejected
//! 5. Target crash without crash detection becomes an execution error
//! 6. Cancellation stops the suite
//! 7. Scenarios exposed as test cases
//! 8. Recovery after a transient breaking point
//! 9. Invalid harness configuration
//! 10. CPU pressure on real time

use std::sync::Arc;
use std::time::Duration;

use stresskit_core::{
    HarnessConfig, HarnessError, Metric, Priority, Recoverability, Scenario, ScenarioKind,
    Severity, TestCase,
};
use stresskit_harness::synthetic::{ScriptedTarget, Signal, SyntheticMetricsSource};
use stresskit_harness::{ReportFormat, ReportWriter, StressHarness};

fn config() -> HarnessConfig {
    HarnessConfig {
        recovery_pause_secs: 1,
        ..HarnessConfig::default()
    }
}

fn harness_with(source: SyntheticMetricsSource) -> StressHarness {
    StressHarness::new(config(), Arc::new(source), Arc::new(ScriptedTarget::new())).unwrap()
}

fn quick_volume(id: &str) -> Scenario {
    let mut scenario = Scenario::new(id, format!("Volume {id}"), ScenarioKind::Volume);
    scenario.load.data_volume = 1_000;
    scenario
}

#[tokio::test(start_paused = true)]
async fn test_load_ramp_hits_response_time_breaking_point() {
    let mut scenario = Scenario::new("api-ramp", "API ramp", ScenarioKind::Load);
    scenario.load.initial_load = 10;
    scenario.load.max_load = 100;
    scenario.load.ramp_up_rate = 10;
    scenario.load.sustain_duration_ms = 10_000;
    scenario.breaking_point.max_response_time_ms = 2_000.0;

    let source =
        SyntheticMetricsSource::quiescent().with_ramp(Signal::ResponseTime, 100.0, 6_000.0, 20);
    let mut harness = harness_with(source);
    harness.register(scenario).unwrap();

    let results = harness.run_all().await.unwrap();
    assert_eq!(results.len(), 1);
    let result = &results[0];

    let bp = result.breaking_point.as_ref().expect("Expected a breaking point");
    assert_eq!(bp.metric, Metric::ResponseTime);
    assert_eq!(bp.recoverability, Recoverability::Degraded);
    assert!(bp.value > 2_000.0, "Breaking value {} not above limit", bp.value);
    assert_eq!(bp.threshold, 2_000.0);

    assert!(!result.passed);
    assert!(result.score <= 0.5);
    let recovery = result.recovery.expect("Expected a recovery observation");
    assert!(!recovery.recovered);
    assert!(result
        .recommendations
        .iter()
        .any(|r| r.category == "performance" && r.priority == Priority::Medium));
}

#[tokio::test(start_paused = true)]
async fn test_memory_climb_is_fatal() {
    let mut scenario = Scenario::new("mem", "Memory climb", ScenarioKind::Memory);
    scenario.duration_ms = 10_000;
    scenario.load.memory_pressure_mb = 1;
    scenario.breaking_point.memory_limit = 0.99;
    scenario.expectations.recovery_time_ms = 2_000;

    let source = SyntheticMetricsSource::quiescent().with_ramp(Signal::Memory, 0.5, 1.0, 10);
    let mut harness = harness_with(source);
    harness.register(scenario).unwrap();

    let result = harness.run_scenario("mem").await.unwrap();

    let bp = result.breaking_point.as_ref().unwrap();
    assert_eq!(bp.metric, Metric::Memory);
    assert_eq!(bp.recoverability, Recoverability::Fatal);
    assert!(!result.passed);
    assert!(result.score <= 0.1 + 1e-12);
    assert_eq!(result.recommendations[0].priority, Priority::High);
    assert_eq!(result.resource_analysis.memory.peak, 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_quiescent_suite_passes() {
    let mut harness = harness_with(SyntheticMetricsSource::quiescent());
    harness.register(quick_volume("bulk")).unwrap();
    let mut concurrency = Scenario::new("workers", "Workers", ScenarioKind::Concurrency);
    concurrency.load.concurrency = 4;
    harness.register(concurrency).unwrap();

    let run = harness.run_suite().await.unwrap();

    assert_eq!(run.results.len(), 2);
    for result in &run.results {
        assert!(result.passed, "{} should pass", result.scenario_id);
        assert!(result.breaking_point.is_none());
        assert_eq!(result.stability_analysis.overall_stability, 1.0);
        assert_eq!(result.score, 1.0);
    }
    assert!(run.summary.all_passed());
    assert!(run.summary.breaking_points.is_empty());
    assert_eq!(run.summary.average_score, 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_run_is_rejected() {
    let mut harness = harness_with(SyntheticMetricsSource::quiescent());
    harness.register(quick_volume("bulk")).unwrap();

    let (first, second) = tokio::join!(harness.run_all(), harness.run_all());

    assert_eq!(first.unwrap().len(), 1);
    assert!(matches!(second, Err(HarnessError::AlreadyRunning)));
    assert!(!harness.is_running());

    // The flag is released once the first run completes.
    assert!(harness.run_all().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_crash_without_detection_is_execution_error() {
    let mut scenario = Scenario::new("fragile", "Fragile", ScenarioKind::Endurance);
    scenario.breaking_point.crash_detection = false;

    let mut harness = StressHarness::new(
        config(),
        Arc::new(SyntheticMetricsSource::quiescent()),
        Arc::new(ScriptedTarget::new().crash_after(2)),
    )
    .unwrap();
    harness.register(scenario).unwrap();

    let result = harness.run_scenario("fragile").await.unwrap();

    assert!(!result.passed);
    assert_eq!(result.score, 0.0);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].severity, Severity::Critical);
    assert!(result.errors[0].message.contains("crashed"));
    assert_eq!(result.recommendations[0].priority, Priority::Critical);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_suite() {
    let mut harness = harness_with(SyntheticMetricsSource::quiescent());
    for id in ["first", "second"] {
        harness
            .register(Scenario::new(id, id, ScenarioKind::Endurance))
            .unwrap();
    }
    let token = harness.cancellation_token();

    let (run, _) = tokio::join!(harness.run_suite(), async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        token.cancel();
    });

    let run = run.unwrap();
    assert_eq!(run.results.len(), 1);
    assert!(!run.results[0].passed);
    assert!(run.results[0].errors[0].message.contains("cancelled"));
}

#[tokio::test(start_paused = true)]
async fn test_transient_spike_recovers() {
    let mut scenario = quick_volume("blip");
    scenario.breaking_point.max_response_time_ms = 2_000.0;
    scenario.expectations.recovery_time_ms = 10_000;

    // Reading 0 is the baseline sample, readings 1.. are per-chunk checks.
    let source =
        SyntheticMetricsSource::quiescent().with_burst(Signal::ResponseTime, 9_000.0, 2..5);
    let mut harness = harness_with(source);
    harness.register(scenario).unwrap();

    let result = harness.run_scenario("blip").await.unwrap();

    let bp = result.breaking_point.as_ref().expect("Expected a breaking point");
    assert_eq!(bp.metric, Metric::ResponseTime);
    assert_eq!(bp.value, 9_000.0);

    let recovery = result.recovery.expect("Expected a recovery observation");
    assert!(recovery.recovered);
    let after = recovery.recovered_after_ms.expect("Expected a recovery time");
    assert!(after > 0 && after < recovery.window_ms, "recovered after {after} ms");
    assert!(!result.passed);
    assert!(result.recommendations.iter().all(|r| r.category != "recovery"));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_config_never_reaches_the_driver() {
    let config = HarnessConfig {
        volume_chunks: 0,
        ..config()
    };
    let err = StressHarness::new(
        config,
        Arc::new(SyntheticMetricsSource::quiescent()),
        Arc::new(ScriptedTarget::new()),
    )
    .err()
    .expect("zero volume chunks must be rejected");
    assert!(matches!(err, HarnessError::Config(_)));
}

#[test]
fn test_scenarios_registered_as_test_cases() {
    let mut harness = harness_with(SyntheticMetricsSource::quiescent());
    harness.register(quick_volume("bulk")).unwrap();
    harness
        .register(Scenario::new("peak", "Peak", ScenarioKind::Spike))
        .unwrap();

    let mut cases: Vec<TestCase> = Vec::new();
    harness.register_cases(&mut cases);

    let names: Vec<&str> = cases.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["stress::bulk", "stress::peak"]);
    assert_eq!(cases[1].scenario_id, "peak");
}

#[tokio::test(start_paused = true)]
async fn test_suite_report_written_as_markdown() {
    let mut harness = harness_with(SyntheticMetricsSource::quiescent());
    harness.register(quick_volume("bulk")).unwrap();
    let run = harness.run_suite().await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = ReportWriter::new(ReportFormat::Markdown)
        .write_suite(dir.path(), &run.summary, &run.results)
        .unwrap();

    let text = std::fs::read_to_string(path).unwrap();
    assert!(text.contains(&run.run_id.to_string()));
    assert!(text.contains("(`bulk`)"));
    assert!(text.contains("✅ PASS"));
}

#[tokio::test]
async fn test_cpu_pressure_scenario_completes() {
    let mut scenario = Scenario::new("burn", "Burn", ScenarioKind::Cpu);
    scenario.duration_ms = 200;
    scenario.load.concurrency = 1;
    scenario.load.cpu_pressure = 0.5;

    let mut harness = harness_with(SyntheticMetricsSource::quiescent());
    harness.register(scenario).unwrap();

    let result = harness.run_scenario("burn").await.unwrap();
    assert!(result.passed);
    assert!(result.errors.is_empty());
    assert!(result.timeline.len() >= 2);
}
