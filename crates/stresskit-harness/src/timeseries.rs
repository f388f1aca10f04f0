//! Bounded, time-ordered sample storage for a single run

use std::collections::VecDeque;

use stresskit_core::{MetricSample, MetricSummary};

/// Default number of samples retained per run.
pub const DEFAULT_RETENTION_CAP: usize = 1000;

/// Aggregates over every sample ever pushed, including evicted ones.
#[derive(Debug, Clone, Default)]
struct RunningStats {
    count: u64,
    sums: MetricSummary,
    peaks: MetricSummary,
    first: Option<MetricSample>,
}

impl RunningStats {
    fn record(&mut self, sample: &MetricSample) {
        if self.first.is_none() {
            self.first = Some(sample.clone());
        }
        self.count += 1;

        let values = summary_of(sample);
        accumulate(&mut self.sums, &values, |acc, v| acc + v);
        accumulate(&mut self.peaks, &values, f64::max);
    }
}

fn summary_of(sample: &MetricSample) -> MetricSummary {
    MetricSummary {
        load: f64::from(sample.load),
        response_time_ms: sample.response_time_ms,
        throughput: sample.throughput,
        error_rate: sample.error_rate,
        memory_usage: sample.memory_usage,
        cpu_usage: sample.cpu_usage,
        active_connections: f64::from(sample.active_connections),
        queue_length: f64::from(sample.queue_length),
    }
}

fn accumulate(acc: &mut MetricSummary, v: &MetricSummary, op: impl Fn(f64, f64) -> f64) {
    acc.load = op(acc.load, v.load);
    acc.response_time_ms = op(acc.response_time_ms, v.response_time_ms);
    acc.throughput = op(acc.throughput, v.throughput);
    acc.error_rate = op(acc.error_rate, v.error_rate);
    acc.memory_usage = op(acc.memory_usage, v.memory_usage);
    acc.cpu_usage = op(acc.cpu_usage, v.cpu_usage);
    acc.active_connections = op(acc.active_connections, v.active_connections);
    acc.queue_length = op(acc.queue_length, v.queue_length);
}

/// Ring buffer of metric samples.
///
/// When a push takes the length past the cap, the oldest samples are evicted
/// and only the most recent `cap / 2` are kept. Samples are kept in
/// non-decreasing time order: a sample stamped earlier than its predecessor
/// is clamped to the predecessor's time.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    samples: VecDeque<MetricSample>,
    cap: usize,
    stats: RunningStats,
    evicted: u64,
}

impl Default for TimeSeries {
    fn default() -> Self {
        Self::with_cap(DEFAULT_RETENTION_CAP)
    }
}

impl TimeSeries {
    /// Create an empty series. Caps below 2 are raised to 2.
    pub fn with_cap(cap: usize) -> Self {
        let cap = cap.max(2);
        Self {
            samples: VecDeque::with_capacity(cap.min(1024)),
            cap,
            stats: RunningStats::default(),
            evicted: 0,
        }
    }

    /// Append a sample, evicting old samples when the cap is exceeded.
    pub fn push(&mut self, mut sample: MetricSample) {
        if let Some(last) = self.samples.back() {
            if sample.elapsed_ms < last.elapsed_ms {
                sample.elapsed_ms = last.elapsed_ms;
            }
            if sample.timestamp < last.timestamp {
                sample.timestamp = last.timestamp;
            }
        }

        self.stats.record(&sample);
        self.samples.push_back(sample);

        if self.samples.len() > self.cap {
            let keep = self.cap / 2;
            let drop = self.samples.len() - keep;
            self.samples.drain(..drop);
            self.evicted += drop as u64;
        }
    }

    pub fn latest(&self) -> Option<&MetricSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSample> {
        self.samples.iter()
    }

    /// Samples pushed over the whole run, including evicted ones.
    pub fn total_recorded(&self) -> u64 {
        self.stats.count
    }

    /// Samples dropped by retention.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// First sample ever pushed (survives eviction).
    pub fn first_recorded(&self) -> Option<&MetricSample> {
        self.stats.first.as_ref()
    }

    /// Whole-run peak of every metric.
    pub fn peaks(&self) -> MetricSummary {
        self.stats.peaks
    }

    /// Whole-run average of every metric.
    pub fn averages(&self) -> MetricSummary {
        if self.stats.count == 0 {
            return MetricSummary::default();
        }
        let mut averages = self.stats.sums;
        let n = self.stats.count as f64;
        accumulate(&mut averages, &MetricSummary::default(), |sum, _| sum / n);
        averages
    }

    /// Consume the series and return the retained samples, oldest first.
    pub fn into_samples(self) -> Vec<MetricSample> {
        self.samples.into()
    }
}
