use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw reading returned by a [`MetricsSource`](crate::traits::MetricsSource).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    /// Mean response time over the last observation window (ms)
    pub response_time_ms: f64,

    /// Completed operations per second
    pub throughput: f64,

    /// Failed / total operations (0.0-1.0)
    pub error_rate: f64,

    /// Memory usage (0.0-1.0 of the available budget)
    pub memory_usage: f64,

    /// CPU usage (0.0-1.0)
    pub cpu_usage: f64,

    /// Open connections to the target
    pub active_connections: u32,

    /// Operations waiting to be served
    pub queue_length: u32,
}

/// Timestamped snapshot recorded into a run's time series.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSample {
    /// Offset from the start of the run (monotonic clock, ms)
    pub elapsed_ms: u64,

    /// Wall-clock time the sample was taken
    pub timestamp: DateTime<Utc>,

    /// Load level applied when the sample was taken
    pub load: u32,

    pub response_time_ms: f64,
    pub throughput: f64,
    pub error_rate: f64,
    pub memory_usage: f64,
    pub cpu_usage: f64,
    pub active_connections: u32,
    pub queue_length: u32,

    /// `1 - error_rate`
    pub system_stability: f64,
}

impl MetricSample {
    /// Build a sample from a source snapshot.
    pub fn from_snapshot(
        snapshot: PerformanceSnapshot,
        load: u32,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            elapsed_ms,
            timestamp,
            load,
            response_time_ms: snapshot.response_time_ms,
            throughput: snapshot.throughput,
            error_rate: snapshot.error_rate,
            memory_usage: snapshot.memory_usage,
            cpu_usage: snapshot.cpu_usage,
            active_connections: snapshot.active_connections,
            queue_length: snapshot.queue_length,
            system_stability: (1.0 - snapshot.error_rate).clamp(0.0, 1.0),
        }
    }
}
