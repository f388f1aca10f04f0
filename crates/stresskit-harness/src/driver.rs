//! Scenario driver: executes one load shape against the target
//!
//! Every shape checks the [`BreakingPointDetector`] between steps and stops
//! early on the first violation. All waiting on the target goes through the
//! collector so samples keep arriving on interval. Reaching a breaking point is a normal
//! outcome (`Ok(Some(_))`); only harness-level failures are errors.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stresskit_core::{
    BreakingPoint, HarnessConfig, HarnessError, HarnessResult, LoadTarget, Scenario,
    ScenarioKind, TargetError,
};

use crate::collector::MetricsCollector;
use crate::detector::BreakingPointDetector;
use crate::pressure::{CpuPressure, MemoryPressure};

type StepResult = HarnessResult<Option<BreakingPoint>>;

/// Phase of a ramped load scenario, logged on transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Ramping,
    Sustaining,
    Done,
}

/// Drives a single scenario. Borrowed configuration, owned handles.
pub struct ScenarioDriver<'a> {
    scenario: &'a Scenario,
    config: &'a HarnessConfig,
    target: Arc<dyn LoadTarget>,
    detector: BreakingPointDetector,
    cancel: CancellationToken,
}

impl<'a> ScenarioDriver<'a> {
    pub fn new(
        scenario: &'a Scenario,
        config: &'a HarnessConfig,
        target: Arc<dyn LoadTarget>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            scenario,
            config,
            target,
            detector: BreakingPointDetector::new(
                scenario.breaking_point.clone(),
                scenario.recoverability.clone(),
            ),
            cancel,
        }
    }

    /// Run the scenario to completion or to its first breaking point.
    pub async fn drive(&self, collector: &mut MetricsCollector) -> StepResult {
        match self.scenario.kind {
            ScenarioKind::Load => self.run_load(collector).await,
            ScenarioKind::Volume => self.run_volume(collector).await,
            ScenarioKind::Concurrency => self.run_concurrency(collector).await,
            ScenarioKind::Endurance => self.run_endurance(collector).await,
            ScenarioKind::Spike => self.run_spike(collector).await,
            ScenarioKind::Memory => self.run_memory(collector).await,
            ScenarioKind::Cpu => self.run_cpu(collector).await,
        }
    }

    fn ensure_active(&self) -> HarnessResult<()> {
        if self.cancel.is_cancelled() {
            Err(HarnessError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Take a fresh sample and consult the detector.
    async fn checkpoint(&self, collector: &mut MetricsCollector) -> Option<BreakingPoint> {
        collector.collect().await;
        collector
            .latest()
            .and_then(|sample| self.detector.check(sample))
    }

    /// Map a target failure onto the scenario outcome.
    fn absorb(&self, outcome: Result<(), TargetError>) -> StepResult {
        match outcome {
            Ok(()) => Ok(None),
            Err(err) => match self.detector.crash(&err) {
                Some(bp) => Ok(Some(bp)),
                None => Err(err.into()),
            },
        }
    }

    async fn apply(&self, collector: &mut MetricsCollector, level: u32) -> StepResult {
        let outcome = collector
            .pace_while(self.target.apply_load(level), &self.cancel)
            .await?;
        self.absorb(outcome)
    }

    async fn run_load(&self, collector: &mut MetricsCollector) -> StepResult {
        let load = &self.scenario.load;
        let tick = self.config.tick_interval();
        let mut level = load.initial_load;
        let mut phase = LoadPhase::Ramping;
        debug!(phase = ?phase, from = level, to = load.max_load, "Load phase");

        loop {
            self.ensure_active()?;
            collector.set_load(level);

            if let Some(bp) = self.apply(collector, level).await? {
                return Ok(Some(bp));
            }
            collector.pace(tick, &self.cancel).await?;
            if let Some(bp) = self.checkpoint(collector).await {
                return Ok(Some(bp));
            }

            if level >= load.max_load {
                break;
            }
            level = level.saturating_add(load.ramp_up_rate).min(load.max_load);
        }

        phase = LoadPhase::Sustaining;
        debug!(phase = ?phase, level = load.max_load, "Load phase");

        let outcome = self
            .sustain(collector, load.max_load, load.sustain_duration(), Some(tick))
            .await?;

        phase = LoadPhase::Done;
        debug!(phase = ?phase, "Load phase");
        Ok(outcome)
    }

    /// Hold `level` for `duration`, checking every `check_every` if given.
    async fn sustain(
        &self,
        collector: &mut MetricsCollector,
        level: u32,
        duration: Duration,
        check_every: Option<Duration>,
    ) -> StepResult {
        let tick = self.config.tick_interval();
        let deadline = Instant::now() + duration;
        let mut next_check = check_every.map(|every| Instant::now() + every);
        collector.set_load(level);

        while Instant::now() < deadline {
            self.ensure_active()?;

            if let Some(bp) = self.apply(collector, level).await? {
                return Ok(Some(bp));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            collector.pace(tick.min(remaining), &self.cancel).await?;

            if let (Some(at), Some(every)) = (next_check, check_every) {
                if Instant::now() >= at {
                    if let Some(bp) = self.checkpoint(collector).await {
                        return Ok(Some(bp));
                    }
                    next_check = Some(at + every);
                }
            }
        }

        Ok(None)
    }

    async fn run_volume(&self, collector: &mut MetricsCollector) -> StepResult {
        let total = self.scenario.load.data_volume;
        let chunks = u64::from(self.config.volume_chunks.max(1));
        let chunk_size = total / chunks;
        let remainder = total % chunks;
        let tick = self.config.tick_interval();

        for index in 0..chunks {
            self.ensure_active()?;

            let records = if index == chunks - 1 {
                chunk_size + remainder
            } else {
                chunk_size
            };
            collector.set_load(u32::try_from(records).unwrap_or(u32::MAX));
            debug!(chunk = index + 1, of = chunks, records, "Processing volume chunk");

            let outcome = collector
                .pace_while(self.target.process_volume(records), &self.cancel)
                .await?;
            if let Some(bp) = self.absorb(outcome)? {
                return Ok(Some(bp));
            }
            collector.pace(tick, &self.cancel).await?;
            if let Some(bp) = self.checkpoint(collector).await {
                return Ok(Some(bp));
            }
        }

        Ok(None)
    }

    async fn run_concurrency(&self, collector: &mut MetricsCollector) -> StepResult {
        let workers = self.scenario.load.concurrency;
        let operations = self.config.operations_per_worker;
        let mut set = JoinSet::new();

        collector.set_load(u32::try_from(workers).unwrap_or(u32::MAX));

        for worker in 0..workers {
            self.ensure_active()?;

            let target = Arc::clone(&self.target);
            let cancel = self.cancel.clone();
            set.spawn(async move {
                let mut report = WorkerReport::default();
                for _ in 0..operations {
                    if cancel.is_cancelled() {
                        break;
                    }
                    match target.execute_operation(worker).await {
                        Ok(()) => report.succeeded += 1,
                        Err(err) if err.is_crash() => {
                            report.crash = Some(err);
                            break;
                        }
                        Err(err) => {
                            debug!(worker, error = %err, "Worker operation failed");
                            report.failed += 1;
                        }
                    }
                }
                report
            });
        }

        let settle = async {
            let mut totals = WorkerReport::default();
            let mut panicked = 0usize;
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(report) => totals.merge(report),
                    Err(err) => {
                        warn!(error = %err, "Concurrency worker did not complete");
                        panicked += 1;
                    }
                }
            }
            (totals, panicked)
        };
        let (totals, panicked) = collector.pace_while(settle, &self.cancel).await?;

        info!(
            workers,
            succeeded = totals.succeeded,
            failed = totals.failed,
            panicked,
            "Concurrency workers settled"
        );

        self.ensure_active()?;
        if let Some(crash) = totals.crash {
            if let Some(bp) = self.absorb(Err(crash))? {
                return Ok(Some(bp));
            }
        }

        Ok(self.checkpoint(collector).await)
    }

    async fn run_endurance(&self, collector: &mut MetricsCollector) -> StepResult {
        let load = &self.scenario.load;
        self.sustain(
            collector,
            load.max_load,
            load.sustain_duration(),
            Some(self.config.endurance_check_interval()),
        )
        .await
    }

    async fn run_spike(&self, collector: &mut MetricsCollector) -> StepResult {
        let load = &self.scenario.load;
        self.ensure_active()?;
        collector.set_load(load.max_load);

        let burst = (0..self.config.spike_multiplier.max(1))
            .map(|_| self.target.apply_load(load.max_load));
        let outcomes = collector.pace_while(join_all(burst), &self.cancel).await?;
        for outcome in outcomes {
            if let Some(bp) = self.absorb(outcome)? {
                return Ok(Some(bp));
            }
        }

        if let Some(bp) = self.checkpoint(collector).await {
            return Ok(Some(bp));
        }

        if let Some(bp) = self
            .sustain(collector, load.max_load, load.sustain_duration(), None)
            .await?
        {
            return Ok(Some(bp));
        }

        Ok(self.checkpoint(collector).await)
    }

    async fn run_memory(&self, collector: &mut MetricsCollector) -> StepResult {
        let steps = self.config.pressure_steps.max(1);
        let total_bytes = self.scenario.load.memory_pressure_mb.saturating_mul(1_048_576);
        let step_bytes = usize::try_from(total_bytes / u64::from(steps)).unwrap_or(usize::MAX);
        let step_duration = self.scenario.duration() / steps;

        let mut pressure = MemoryPressure::new();
        for step in 1..=steps {
            self.ensure_active()?;

            pressure.allocate(step_bytes)?;
            collector.set_load(step);
            debug!(step, held_bytes = pressure.held_bytes(), "Memory pressure step");

            collector.pace(step_duration, &self.cancel).await?;
            if let Some(bp) = self.checkpoint(collector).await {
                return Ok(Some(bp));
            }
        }

        Ok(None)
    }

    async fn run_cpu(&self, collector: &mut MetricsCollector) -> StepResult {
        let load = &self.scenario.load;
        let steps = self.config.pressure_steps.max(1);
        let step_duration = self.scenario.duration() / steps;
        let busy = step_duration.mul_f64(load.cpu_pressure);
        let idle = step_duration.saturating_sub(busy);

        let pressure = CpuPressure::new(load.concurrency);
        for step in 1..=steps {
            self.ensure_active()?;
            collector.set_load(step);

            let completed = collector.pace_while(pressure.burn(busy), &self.cancel).await?;
            debug!(step, workers = pressure.workers(), completed, "CPU pressure step");

            collector.pace(idle, &self.cancel).await?;
            if let Some(bp) = self.checkpoint(collector).await {
                return Ok(Some(bp));
            }
        }

        Ok(None)
    }
}

#[derive(Debug, Default)]
struct WorkerReport {
    succeeded: u64,
    failed: u64,
    crash: Option<TargetError>,
}

impl WorkerReport {
    fn merge(&mut self, other: WorkerReport) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        if self.crash.is_none() {
            self.crash = other.crash;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{ScriptedTarget, Signal, SyntheticMetricsSource};
    use stresskit_core::{Metric, MetricsSource, Recoverability};

    fn config() -> HarnessConfig {
        HarnessConfig {
            recovery_pause_secs: 0,
            ..HarnessConfig::default()
        }
    }

    fn collector(source: Arc<dyn MetricsSource>) -> MetricsCollector {
        MetricsCollector::new(source, Duration::from_millis(1000), 1000)
    }

    fn driver<'a>(
        scenario: &'a Scenario,
        config: &'a HarnessConfig,
        target: Arc<dyn LoadTarget>,
    ) -> ScenarioDriver<'a> {
        ScenarioDriver::new(scenario, config, target, CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_ramps_then_sustains() {
        let mut scenario = Scenario::new("ramp", "Ramp", ScenarioKind::Load);
        scenario.load.initial_load = 10;
        scenario.load.max_load = 50;
        scenario.load.ramp_up_rate = 10;
        scenario.load.sustain_duration_ms = 3_000;

        let config = config();
        let target = Arc::new(ScriptedTarget::new());
        let driver = driver(&scenario, &config, target.clone());
        let mut collector = collector(Arc::new(SyntheticMetricsSource::quiescent()));

        let outcome = driver.drive(&mut collector).await.unwrap();

        assert!(outcome.is_none());
        let levels = target.applied_levels();
        assert_eq!(&levels[..5], &[10, 20, 30, 40, 50]);
        assert!(levels[5..].iter().all(|l| *l == 50));
        assert_eq!(collector.load(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_stops_at_response_time_breaking_point() {
        let mut scenario = Scenario::new("slow", "Slow", ScenarioKind::Load);
        scenario.load.initial_load = 1;
        scenario.load.max_load = 100;
        scenario.load.ramp_up_rate = 1;

        let config = config();
        let target = Arc::new(ScriptedTarget::new());
        let source = SyntheticMetricsSource::quiescent()
            .with_ramp(Signal::ResponseTime, 100.0, 10_000.0, 50);
        let driver = driver(&scenario, &config, target.clone());
        let mut collector = collector(Arc::new(source));

        let bp = driver.drive(&mut collector).await.unwrap().unwrap();

        assert_eq!(bp.metric, Metric::ResponseTime);
        assert!(bp.value > 5000.0);
        assert!(target.applied_levels().len() < 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_splits_into_chunks_with_remainder() {
        let mut scenario = Scenario::new("vol", "Volume", ScenarioKind::Volume);
        scenario.load.data_volume = 1_005;

        let config = config();
        let target = Arc::new(ScriptedTarget::new());
        let driver = driver(&scenario, &config, target.clone());
        let mut collector = collector(Arc::new(SyntheticMetricsSource::quiescent()));

        assert!(driver.drive(&mut collector).await.unwrap().is_none());

        let chunks = target.volume_chunks();
        assert_eq!(chunks.len(), 10);
        assert!(chunks[..9].iter().all(|c| *c == 100));
        assert_eq!(chunks[9], 105);
        assert_eq!(chunks.iter().sum::<u64>(), 1_005);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_tolerates_failing_workers() {
        let mut scenario = Scenario::new("conc", "Concurrency", ScenarioKind::Concurrency);
        scenario.load.concurrency = 8;

        let config = config();
        let target = Arc::new(ScriptedTarget::new().with_failing_worker(3));
        let driver = driver(&scenario, &config, target.clone());
        let mut collector = collector(Arc::new(SyntheticMetricsSource::quiescent()));

        assert!(driver.drive(&mut collector).await.unwrap().is_none());
        assert_eq!(target.operations(), 8 * u64::from(config.operations_per_worker));
        assert!(!collector.timeline().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_samples_while_workers_run() {
        let mut scenario = Scenario::new("conc", "Concurrency", ScenarioKind::Concurrency);
        scenario.load.concurrency = 4;

        let config = config();
        let target =
            Arc::new(ScriptedTarget::new().with_operation_delay(Duration::from_secs(1)));
        let driver = driver(&scenario, &config, target.clone());
        let mut collector = collector(Arc::new(SyntheticMetricsSource::quiescent()));

        assert!(driver.drive(&mut collector).await.unwrap().is_none());

        // 10 operations of 1 s each per worker, one sample per second
        assert_eq!(target.operations(), 40);
        assert!(collector.timeline().len() >= 10, "{}", collector.timeline().len());
        assert!(collector.latest().unwrap().elapsed_ms >= 9_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_endurance_checks_on_interval() {
        let mut scenario = Scenario::new("soak", "Soak", ScenarioKind::Endurance);
        scenario.load.sustain_duration_ms = 60_000;
        scenario.breaking_point.max_response_time_ms = 2_000.0;

        let config = config();
        let source = SyntheticMetricsSource::quiescent()
            .with_ramp(Signal::ResponseTime, 100.0, 6_000.0, 30);
        let driver = driver(&scenario, &config, Arc::new(ScriptedTarget::new()));
        let mut collector = collector(Arc::new(source));

        let bp = driver.drive(&mut collector).await.unwrap().unwrap();

        assert_eq!(bp.metric, Metric::ResponseTime);
        let breaking = collector.latest().unwrap();
        assert_eq!(breaking.response_time_ms, bp.value);
        assert!(breaking.elapsed_ms > 0);
        assert_eq!(breaking.elapsed_ms % 5_000, 0);
        // Samples in between were taken but not judged.
        assert!(collector
            .timeline()
            .iter()
            .any(|s| s.response_time_ms > 2_000.0 && s.elapsed_ms < breaking.elapsed_ms));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_step_config_does_not_divide_by_zero() {
        let mut scenario = Scenario::new("vol", "Volume", ScenarioKind::Volume);
        scenario.load.data_volume = 50;

        let config = HarnessConfig {
            volume_chunks: 0,
            pressure_steps: 0,
            ..config()
        };
        let target = Arc::new(ScriptedTarget::new());
        let driver = driver(&scenario, &config, target.clone());
        let mut collector = collector(Arc::new(SyntheticMetricsSource::quiescent()));

        assert!(driver.drive(&mut collector).await.unwrap().is_none());
        assert_eq!(target.volume_chunks(), vec![50]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spike_bursts_at_multiplier() {
        let mut scenario = Scenario::new("spike", "Spike", ScenarioKind::Spike);
        scenario.load.max_load = 200;
        scenario.load.sustain_duration_ms = 2_000;

        let config = config();
        let target = Arc::new(ScriptedTarget::new());
        let driver = driver(&scenario, &config, target.clone());
        let mut collector = collector(Arc::new(SyntheticMetricsSource::quiescent()));

        assert!(driver.drive(&mut collector).await.unwrap().is_none());
        let levels = target.applied_levels();
        assert!(levels.len() >= config.spike_multiplier as usize);
        assert!(levels.iter().all(|l| *l == 200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_crash_becomes_breaking_point() {
        let scenario = Scenario::new("crash", "Crash", ScenarioKind::Endurance);
        let config = config();
        let target = Arc::new(ScriptedTarget::new().crash_after(3));
        let driver = driver(&scenario, &config, target);
        let mut collector = collector(Arc::new(SyntheticMetricsSource::quiescent()));

        let bp = driver.drive(&mut collector).await.unwrap().unwrap();
        assert_eq!(bp.metric, Metric::Crash);
        assert_eq!(bp.recoverability, Recoverability::Fatal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crash_without_detection_is_an_error() {
        let mut scenario = Scenario::new("crash", "Crash", ScenarioKind::Endurance);
        scenario.breaking_point.crash_detection = false;
        let config = config();
        let target = Arc::new(ScriptedTarget::new().crash_after(0));
        let driver = driver(&scenario, &config, target);
        let mut collector = collector(Arc::new(SyntheticMetricsSource::quiescent()));

        let err = driver.drive(&mut collector).await.unwrap_err();
        assert!(matches!(err, HarnessError::Target(TargetError::Crashed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_pressure_checks_each_step() {
        let mut scenario = Scenario::new("mem", "Memory", ScenarioKind::Memory);
        scenario.duration_ms = 10_000;
        scenario.load.memory_pressure_mb = 1;

        let config = config();
        let driver = driver(&scenario, &config, Arc::new(ScriptedTarget::new()));
        let mut collector = collector(Arc::new(SyntheticMetricsSource::quiescent()));

        assert!(driver.drive(&mut collector).await.unwrap().is_none());
        assert_eq!(collector.load(), config.pressure_steps);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_driver_stops_immediately() {
        let scenario = Scenario::new("long", "Long", ScenarioKind::Endurance);
        let config = config();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let target = Arc::new(ScriptedTarget::new());
        let driver = ScenarioDriver::new(&scenario, &config, target, cancel);
        let mut collector = collector(Arc::new(SyntheticMetricsSource::quiescent()));

        let err = driver.drive(&mut collector).await.unwrap_err();
        assert!(matches!(err, HarnessError::Cancelled));
    }
}
