//! Deterministic metrics source and load target.
//!
//! Used by the harness's own tests and by `stresskit run --target synthetic`
//! for dry runs of a scenario file without a system under test.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use stresskit_core::{LoadTarget, MetricsSource, PerformanceSnapshot, SourceError, TargetError};

/// Snapshot field a ramp drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    ResponseTime,
    Throughput,
    ErrorRate,
    Memory,
    Cpu,
}

#[derive(Debug, Clone, Copy)]
struct Ramp {
    signal: Signal,
    from: f64,
    to: f64,
    steps: usize,
}

impl Ramp {
    /// Linear from `from` at the first reading to `to` after `steps` readings.
    fn value_at(&self, reading: usize) -> f64 {
        if self.steps == 0 {
            return self.to;
        }
        let progress = reading.min(self.steps) as f64 / self.steps as f64;
        self.from + (self.to - self.from) * progress
    }
}

#[derive(Debug, Clone)]
struct Burst {
    signal: Signal,
    value: f64,
    readings: Range<usize>,
}

/// Metrics source replaying a baseline snapshot with optional linear ramps
/// and short bursts.
#[derive(Debug)]
pub struct SyntheticMetricsSource {
    baseline: PerformanceSnapshot,
    ramps: Vec<Ramp>,
    bursts: Vec<Burst>,
    failures: HashSet<usize>,
    readings: AtomicUsize,
}

impl SyntheticMetricsSource {
    pub fn new(baseline: PerformanceSnapshot) -> Self {
        Self {
            baseline,
            ramps: Vec::new(),
            bursts: Vec::new(),
            failures: HashSet::new(),
            readings: AtomicUsize::new(0),
        }
    }

    /// A healthy, idle system well within default expectations.
    pub fn quiescent() -> Self {
        Self::new(PerformanceSnapshot {
            response_time_ms: 100.0,
            throughput: 50.0,
            error_rate: 0.0,
            memory_usage: 0.3,
            cpu_usage: 0.2,
            active_connections: 1,
            queue_length: 0,
        })
    }

    pub fn with_ramp(mut self, signal: Signal, from: f64, to: f64, steps: usize) -> Self {
        self.ramps.retain(|r| r.signal != signal);
        self.ramps.push(Ramp {
            signal,
            from,
            to,
            steps,
        });
        self
    }

    /// Report `value` for the readings in `readings`, then fall back to the
    /// baseline or ramp. Bursts win over ramps.
    pub fn with_burst(mut self, signal: Signal, value: f64, readings: Range<usize>) -> Self {
        self.bursts.push(Burst {
            signal,
            value,
            readings,
        });
        self
    }

    /// Fail the reading with this zero-based index.
    pub fn fail_on(mut self, reading: usize) -> Self {
        self.failures.insert(reading);
        self
    }

    /// Readings taken so far, including failed ones.
    pub fn readings(&self) -> usize {
        self.readings.load(Ordering::Relaxed)
    }

    fn snapshot_at(&self, reading: usize) -> PerformanceSnapshot {
        let mut snapshot = self.baseline;
        for ramp in &self.ramps {
            set_signal(&mut snapshot, ramp.signal, ramp.value_at(reading));
        }
        for burst in self.bursts.iter().filter(|b| b.readings.contains(&reading)) {
            set_signal(&mut snapshot, burst.signal, burst.value);
        }
        snapshot
    }
}

fn set_signal(snapshot: &mut PerformanceSnapshot, signal: Signal, value: f64) {
    match signal {
        Signal::ResponseTime => snapshot.response_time_ms = value,
        Signal::Throughput => snapshot.throughput = value,
        Signal::ErrorRate => snapshot.error_rate = value,
        Signal::Memory => snapshot.memory_usage = value,
        Signal::Cpu => snapshot.cpu_usage = value,
    }
}

#[async_trait]
impl MetricsSource for SyntheticMetricsSource {
    async fn current_metrics(&self) -> Result<PerformanceSnapshot, SourceError> {
        let reading = self.readings.fetch_add(1, Ordering::Relaxed);
        if self.failures.contains(&reading) {
            return Err(SourceError(format!("synthetic failure at reading {reading}")));
        }
        Ok(self.snapshot_at(reading))
    }
}

/// Load target that records every call and fails on demand.
#[derive(Debug, Default)]
pub struct ScriptedTarget {
    levels: Mutex<Vec<u32>>,
    chunks: Mutex<Vec<u64>>,
    operations: AtomicU64,
    calls: AtomicU64,
    failing_workers: HashSet<usize>,
    crash_after: Option<u64>,
    operation_delay: Option<Duration>,
}

impl ScriptedTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation from `worker` fails with [`TargetError::Operation`].
    pub fn with_failing_worker(mut self, worker: usize) -> Self {
        self.failing_workers.insert(worker);
        self
    }

    /// Succeed for `calls` calls of any kind, then report a crash.
    pub fn crash_after(mut self, calls: u64) -> Self {
        self.crash_after = Some(calls);
        self
    }

    /// Each concurrency operation takes `delay` before it completes.
    pub fn with_operation_delay(mut self, delay: Duration) -> Self {
        self.operation_delay = Some(delay);
        self
    }

    pub fn applied_levels(&self) -> Vec<u32> {
        self.levels.lock().clone()
    }

    pub fn volume_chunks(&self) -> Vec<u64> {
        self.chunks.lock().clone()
    }

    /// Concurrency operations executed, failed ones included.
    pub fn operations(&self) -> u64 {
        self.operations.load(Ordering::Relaxed)
    }

    fn check_alive(&self) -> Result<(), TargetError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        match self.crash_after {
            Some(limit) if call >= limit => Err(TargetError::crashed(format!(
                "scripted crash after {limit} calls"
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl LoadTarget for ScriptedTarget {
    async fn apply_load(&self, load: u32) -> Result<(), TargetError> {
        self.check_alive()?;
        self.levels.lock().push(load);
        Ok(())
    }

    async fn process_volume(&self, records: u64) -> Result<(), TargetError> {
        self.check_alive()?;
        self.chunks.lock().push(records);
        Ok(())
    }

    async fn execute_operation(&self, worker: usize) -> Result<(), TargetError> {
        self.check_alive()?;
        self.operations.fetch_add(1, Ordering::Relaxed);
        if self.failing_workers.contains(&worker) {
            return Err(TargetError::Operation(format!("worker {worker} is scripted to fail")));
        }
        match self.operation_delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        Ok(())
    }
}
