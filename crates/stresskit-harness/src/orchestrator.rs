//! Stress suite orchestration
//!
//! [`StressHarness`] owns the registered scenarios and runs them one at a
//! time: clear caches, drive the load shape, watch for recovery after a
//! breaking point, build the report, then pause before the next scenario.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use stresskit_core::{
    CacheControl, HarnessConfig, HarnessError, HarnessResult, LoadTarget, MetricsSource,
    NoopCache, RecoveryObservation, RunId, Scenario, StressTestResult, StresskitConfig,
    SuiteSummary, TestRegistrar,
};

use crate::collector::MetricsCollector;
use crate::driver::ScenarioDriver;
use crate::report::{ReportGenerator, RunOutcome};
use crate::stability::StabilityAnalyzer;
use crate::telemetry;

/// Results of one `run_suite` call.
#[derive(Debug, Clone)]
pub struct SuiteRun {
    pub run_id: RunId,
    pub results: Vec<StressTestResult>,
    pub summary: SuiteSummary,
}

/// Holds the running flag for the lifetime of a run.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> HarnessResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| HarnessError::AlreadyRunning)?;
        Ok(Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct StressHarness {
    config: HarnessConfig,
    scenarios: Vec<Scenario>,
    source: Arc<dyn MetricsSource>,
    target: Arc<dyn LoadTarget>,
    cache: Arc<dyn CacheControl>,
    reporter: ReportGenerator,
    running: AtomicBool,
    cancel: CancellationToken,
}

impl StressHarness {
    /// Create an empty harness. Fails if `config` does not validate.
    pub fn new(
        config: HarnessConfig,
        source: Arc<dyn MetricsSource>,
        target: Arc<dyn LoadTarget>,
    ) -> HarnessResult<Self> {
        config.validate()?;
        let analyzer = StabilityAnalyzer::new(config.min_stability_samples);
        Ok(Self {
            config,
            scenarios: Vec::new(),
            source,
            target,
            cache: Arc::new(NoopCache),
            reporter: ReportGenerator::new(analyzer),
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    /// Build a harness with every scenario of a loaded configuration.
    pub fn from_config(
        config: StresskitConfig,
        source: Arc<dyn MetricsSource>,
        target: Arc<dyn LoadTarget>,
    ) -> HarnessResult<Self> {
        let mut harness = Self::new(config.harness, source, target)?;
        for scenario in config.scenarios {
            harness.register(scenario)?;
        }
        Ok(harness)
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheControl>) -> Self {
        self.cache = cache;
        self
    }

    /// Add a scenario. Ids must be unique.
    pub fn register(&mut self, scenario: Scenario) -> HarnessResult<()> {
        scenario.validate()?;
        if self.scenarios.iter().any(|s| s.id == scenario.id) {
            return Err(HarnessError::invalid_scenario(
                &scenario.id,
                "a scenario with this id is already registered",
            ));
        }
        self.scenarios.push(scenario);
        Ok(())
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Token that cancels the current and every later run once fired.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Expose each scenario as a `stress::<id>` test case.
    pub fn register_cases(&self, registrar: &mut dyn TestRegistrar) {
        for scenario in &self.scenarios {
            registrar.register(scenario.test_case());
        }
    }

    /// Summarize results gathered outside of `run_suite`, e.g. from
    /// individual `run_scenario` calls.
    pub fn summarize(&self, results: &[StressTestResult]) -> SuiteSummary {
        SuiteSummary::from_results(RunId::new(), results)
    }

    /// Run every registered scenario in registration order.
    pub async fn run_all(&self) -> HarnessResult<Vec<StressTestResult>> {
        Ok(self.run_suite().await?.results)
    }

    /// Run every registered scenario and summarize the suite.
    ///
    /// Fails with [`HarnessError::AlreadyRunning`] if a run is in flight.
    /// Cancellation stops the suite after the current scenario's result.
    pub async fn run_suite(&self) -> HarnessResult<SuiteRun> {
        let _guard = RunGuard::acquire(&self.running)?;
        let run_id = RunId::new();
        let pause = self.config.recovery_pause();
        info!(%run_id, scenarios = self.scenarios.len(), "Starting stress suite");

        let mut results = Vec::with_capacity(self.scenarios.len());
        for (index, scenario) in self.scenarios.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(%run_id, remaining = self.scenarios.len() - index, "Suite cancelled");
                break;
            }

            results.push(self.execute(scenario).await);

            let is_last = index + 1 == self.scenarios.len();
            if is_last || pause.is_zero() || self.cancel.is_cancelled() {
                continue;
            }

            info!(pause_secs = pause.as_secs(), "Recovery pause before next scenario");
            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = sleep(pause) => {}
            }
        }

        let summary = SuiteSummary::from_results(run_id, &results);
        info!(
            %run_id,
            total = summary.total,
            passed = summary.passed,
            average_score = summary.average_score,
            "Stress suite finished"
        );

        Ok(SuiteRun {
            run_id,
            results,
            summary,
        })
    }

    /// Run one registered scenario on its own.
    pub async fn run_scenario(&self, id: &str) -> HarnessResult<StressTestResult> {
        let scenario = self
            .scenarios
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| HarnessError::UnknownScenario(id.to_string()))?;

        let _guard = RunGuard::acquire(&self.running)?;
        Ok(self.execute(scenario).await)
    }

    /// Execute a scenario. Harness failures become a failed result.
    async fn execute(&self, scenario: &Scenario) -> StressTestResult {
        info!(scenario = %scenario.id, kind = %scenario.kind, "Starting scenario");
        let started = Instant::now();

        self.clear_cache(scenario).await;

        let mut collector = MetricsCollector::new(
            Arc::clone(&self.source),
            self.config.sampling_interval(),
            self.config.retention_cap,
        );
        collector.collect().await;

        let driver = ScenarioDriver::new(
            scenario,
            &self.config,
            Arc::clone(&self.target),
            self.cancel.clone(),
        );

        let result = match driver.drive(&mut collector).await {
            Ok(breaking_point) => {
                let recovery = match &breaking_point {
                    Some(_) => Some(self.observe_recovery(scenario).await),
                    None => None,
                };
                self.reporter.generate(
                    scenario,
                    RunOutcome {
                        breaking_point,
                        timeline: collector.into_timeline(),
                        duration: started.elapsed(),
                        recovery,
                    },
                )
            }
            Err(err) => {
                error!(scenario = %scenario.id, error = %err, "Scenario execution failed");
                self.reporter.execution_failure(
                    scenario,
                    &err,
                    collector.into_timeline(),
                    started.elapsed(),
                )
            }
        };

        self.clear_cache(scenario).await;
        telemetry::record_result(&result);

        info!(
            scenario = %scenario.id,
            passed = result.passed,
            score = result.score,
            breaking_point = ?result.breaking_point.as_ref().map(|bp| bp.metric),
            "Scenario finished"
        );
        result
    }

    async fn clear_cache(&self, scenario: &Scenario) {
        if let Err(err) = self.cache.clear_cache().await {
            warn!(scenario = %scenario.id, error = %err, "Failed to clear target cache");
        }
    }

    /// Sample until the expectations hold again or the recovery window ends.
    ///
    /// Uses its own collector so the scenario timeline ends at the breaking
    /// point.
    async fn observe_recovery(&self, scenario: &Scenario) -> RecoveryObservation {
        let window = scenario.expectations.recovery_time();
        let window_ms = window.as_millis() as u64;
        let interval = self.config.sampling_interval();
        let mut collector =
            MetricsCollector::new(Arc::clone(&self.source), interval, self.config.retention_cap);
        let deadline = Instant::now() + window;

        loop {
            let satisfied = collector
                .collect()
                .await
                .is_some_and(|sample| scenario.expectations.is_satisfied_by(sample));
            if satisfied {
                let after = collector.elapsed().as_millis() as u64;
                info!(scenario = %scenario.id, recovered_after_ms = after, "Target recovered");
                return RecoveryObservation {
                    recovered: true,
                    recovered_after_ms: Some(after),
                    window_ms,
                };
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            if collector
                .pace(interval.min(remaining), &self.cancel)
                .await
                .is_err()
            {
                break;
            }
        }

        warn!(scenario = %scenario.id, window_ms, "Target did not recover");
        RecoveryObservation {
            recovered: false,
            recovered_after_ms: None,
            window_ms,
        }
    }
}
