//! Metrics sources backed by real measurements
//!
//! [`RequestStats`] is fed by a load target as requests complete;
//! [`ProcessMetricsSource`] combines its window with process memory and CPU
//! read through `sysinfo`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sysinfo::{get_current_pid, Pid, PidExt, ProcessExt, System, SystemExt};
use tokio::time::Instant;

use stresskit_core::{MetricsSource, PerformanceSnapshot, SourceError};

#[derive(Debug)]
struct Window {
    started: Instant,
    succeeded: u64,
    failed: u64,
    total_latency: Duration,
}

impl Window {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            succeeded: 0,
            failed: 0,
            total_latency: Duration::ZERO,
        }
    }
}

/// Request outcomes observed since the previous snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RequestWindow {
    pub response_time_ms: f64,
    pub throughput: f64,
    pub error_rate: f64,
    pub active_connections: u32,
    pub queue_length: u32,
}

/// Shared request counters. Every snapshot starts a new window.
#[derive(Debug)]
pub struct RequestStats {
    window: Mutex<Window>,
    in_flight: AtomicU32,
    queued: AtomicU32,
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            window: Mutex::new(Window::new()),
            in_flight: AtomicU32::new(0),
            queued: AtomicU32::new(0),
        }
    }

    pub fn record_success(&self, latency: Duration) {
        let mut window = self.window.lock();
        window.succeeded += 1;
        window.total_latency += latency;
    }

    pub fn record_failure(&self, latency: Duration) {
        let mut window = self.window.lock();
        window.failed += 1;
        window.total_latency += latency;
    }

    /// Mark a request as in flight until the guard drops.
    pub fn begin(&self) -> Tracked<'_> {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        Tracked {
            counter: &self.in_flight,
        }
    }

    /// Mark a request as waiting for a slot until the guard drops.
    pub fn enqueue(&self) -> Tracked<'_> {
        self.queued.fetch_add(1, Ordering::Relaxed);
        Tracked {
            counter: &self.queued,
        }
    }

    /// Read the current window and start a new one.
    pub fn snapshot_and_reset(&self) -> RequestWindow {
        let finished = {
            let mut window = self.window.lock();
            std::mem::replace(&mut *window, Window::new())
        };

        let completed = finished.succeeded + finished.failed;
        let elapsed = finished.started.elapsed().as_secs_f64();
        let (response_time_ms, error_rate) = if completed == 0 {
            (0.0, 0.0)
        } else {
            (
                finished.total_latency.as_secs_f64() * 1000.0 / completed as f64,
                finished.failed as f64 / completed as f64,
            )
        };

        RequestWindow {
            response_time_ms,
            throughput: if elapsed > 0.0 {
                completed as f64 / elapsed
            } else {
                0.0
            },
            error_rate,
            active_connections: self.in_flight.load(Ordering::Relaxed),
            queue_length: self.queued.load(Ordering::Relaxed),
        }
    }
}

/// Decrements its counter on drop.
#[derive(Debug)]
pub struct Tracked<'a> {
    counter: &'a AtomicU32,
}

impl Drop for Tracked<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Request window plus memory and CPU of a watched process.
///
/// Memory is normalized against `memory_budget_bytes` when set, otherwise
/// against total system memory. CPU is normalized by the number of cores.
pub struct ProcessMetricsSource {
    stats: Arc<RequestStats>,
    system: Mutex<System>,
    pid: Pid,
    memory_budget_bytes: Option<u64>,
    cores: usize,
}

impl ProcessMetricsSource {
    /// Watch the current process.
    pub fn current(stats: Arc<RequestStats>) -> Result<Self, SourceError> {
        let pid = get_current_pid().map_err(|e| SourceError(e.to_string()))?;
        Ok(Self::for_pid(stats, pid))
    }

    /// Watch another process, typically the system under test.
    pub fn with_pid(stats: Arc<RequestStats>, pid: u32) -> Self {
        Self::for_pid(stats, Pid::from_u32(pid))
    }

    fn for_pid(stats: Arc<RequestStats>, pid: Pid) -> Self {
        let system = System::new_all();
        let cores = system.cpus().len().max(1);
        Self {
            stats,
            system: Mutex::new(system),
            pid,
            memory_budget_bytes: None,
            cores,
        }
    }

    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget_bytes = Some(bytes).filter(|b| *b > 0);
        self
    }

    fn process_usage(&self) -> Result<(f64, f64), SourceError> {
        let mut system = self.system.lock();
        if !system.refresh_process(self.pid) {
            return Err(SourceError(format!("process {} is not running", self.pid)));
        }
        let process = system
            .process(self.pid)
            .ok_or_else(|| SourceError(format!("process {} disappeared", self.pid)))?;

        let memory_bytes = process.memory() as f64;
        let cpu_percent = f64::from(process.cpu_usage());

        let budget = match self.memory_budget_bytes {
            Some(bytes) => bytes as f64,
            None => {
                system.refresh_memory();
                system.total_memory() as f64
            }
        };

        let memory = if budget > 0.0 {
            (memory_bytes / budget).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let cpu = (cpu_percent / (100.0 * self.cores as f64)).clamp(0.0, 1.0);
        Ok((memory, cpu))
    }
}

#[async_trait]
impl MetricsSource for ProcessMetricsSource {
    async fn current_metrics(&self) -> Result<PerformanceSnapshot, SourceError> {
        let (memory_usage, cpu_usage) = self.process_usage()?;
        let window = self.stats.snapshot_and_reset();

        Ok(PerformanceSnapshot {
            response_time_ms: window.response_time_ms,
            throughput: window.throughput,
            error_rate: window.error_rate,
            memory_usage,
            cpu_usage,
            active_connections: window.active_connections,
            queue_length: window.queue_length,
        })
    }
}
