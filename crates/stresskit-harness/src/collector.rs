//! Metrics collection for a single scenario run

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use stresskit_core::{HarnessError, HarnessResult, MetricSample, MetricsSource};

use crate::telemetry::DROPPED_SAMPLES;
use crate::timeseries::TimeSeries;

/// Samples a [`MetricsSource`] into the run's [`TimeSeries`].
///
/// The collector is owned by exactly one run. The scenario driver routes all
/// of its waiting through [`MetricsCollector::pace`] and
/// [`MetricsCollector::pace_while`], which keep sampling on the configured
/// interval without a background task.
pub struct MetricsCollector {
    source: Arc<dyn MetricsSource>,
    timeline: TimeSeries,
    interval: Duration,
    started: Instant,
    last_sample_at: Option<Instant>,
    load: u32,
}

impl MetricsCollector {
    /// Create a collector for a new run.
    pub fn new(source: Arc<dyn MetricsSource>, interval: Duration, retention_cap: usize) -> Self {
        Self {
            source,
            timeline: TimeSeries::with_cap(retention_cap),
            interval,
            started: Instant::now(),
            last_sample_at: None,
            load: 0,
        }
    }

    /// Set the load level stamped onto subsequent samples.
    pub fn set_load(&mut self, load: u32) {
        self.load = load;
    }

    pub fn load(&self) -> u32 {
        self.load
    }

    /// Time since the run started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Take one sample now.
    ///
    /// A failing or slow source is logged and skipped; the run continues and
    /// `None` is returned.
    pub async fn collect(&mut self) -> Option<&MetricSample> {
        let now = Instant::now();
        self.last_sample_at = Some(now);

        let reading = match timeout(self.interval, self.source.current_metrics()).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(err)) => {
                DROPPED_SAMPLES.inc();
                warn!(error = %err, "Skipping metric sample");
                return None;
            }
            Err(_) => {
                DROPPED_SAMPLES.inc();
                warn!(
                    timeout_ms = self.interval.as_millis() as u64,
                    "Metrics source timed out, skipping sample"
                );
                return None;
            }
        };

        let elapsed_ms = now.duration_since(self.started).as_millis() as u64;
        self.timeline.push(MetricSample::from_snapshot(
            reading,
            self.load,
            elapsed_ms,
            Utc::now(),
        ));
        self.timeline.latest()
    }

    /// Most recently collected sample.
    pub fn latest(&self) -> Option<&MetricSample> {
        self.timeline.latest()
    }

    /// Wait for `duration`, sampling every interval along the way.
    ///
    /// Returns [`HarnessError::Cancelled`] as soon as `cancel` fires.
    pub async fn pace(
        &mut self,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> HarnessResult<()> {
        let deadline = Instant::now() + duration;

        loop {
            if cancel.is_cancelled() {
                return Err(HarnessError::Cancelled);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }

            let due = self.next_due(now);
            if due <= now {
                self.collect().await;
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(HarnessError::Cancelled),
                _ = sleep_until(due.min(deadline)) => {}
            }
        }
    }

    /// Drive `work` to completion, sampling every interval while it runs.
    ///
    /// Returns [`HarnessError::Cancelled`] as soon as `cancel` fires; `work`
    /// is dropped unfinished in that case.
    pub async fn pace_while<F: Future>(
        &mut self,
        work: F,
        cancel: &CancellationToken,
    ) -> HarnessResult<F::Output> {
        tokio::pin!(work);

        loop {
            let due = self.next_due(Instant::now());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(HarnessError::Cancelled),
                output = &mut work => return Ok(output),
                _ = sleep_until(due) => {
                    self.collect().await;
                }
            }
        }
    }

    fn next_due(&self, now: Instant) -> Instant {
        match self.last_sample_at {
            Some(at) => at + self.interval,
            None => now,
        }
    }

    pub fn timeline(&self) -> &TimeSeries {
        &self.timeline
    }

    /// Hand the time series back to the caller at the end of the run.
    pub fn into_timeline(self) -> TimeSeries {
        debug!(
            retained = self.timeline.len(),
            recorded = self.timeline.total_recorded(),
            "Metrics collection finished"
        );
        self.timeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{Signal, SyntheticMetricsSource};
    use stresskit_core::PerformanceSnapshot;

    fn quiet_source() -> Arc<SyntheticMetricsSource> {
        Arc::new(SyntheticMetricsSource::new(PerformanceSnapshot {
            response_time_ms: 50.0,
            throughput: 100.0,
            ..Default::default()
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_samples_on_interval() {
        let mut collector =
            MetricsCollector::new(quiet_source(), Duration::from_millis(1000), 1000);
        let cancel = CancellationToken::new();

        collector.pace(Duration::from_secs(5), &cancel).await.unwrap();

        // t = 0, 1, 2, 3, 4 seconds
        assert_eq!(collector.timeline().len(), 5);
        let elapsed: Vec<u64> = collector.timeline().iter().map(|s| s.elapsed_ms).collect();
        assert!(elapsed.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_sample_is_skipped() {
        let source = Arc::new(SyntheticMetricsSource::quiescent().fail_on(1));
        let mut collector = MetricsCollector::new(source, Duration::from_millis(100), 1000);

        assert!(collector.collect().await.is_some());
        assert!(collector.collect().await.is_none());
        assert!(collector.collect().await.is_some());
        assert_eq!(collector.timeline().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_is_stamped_on_samples() {
        let source = Arc::new(
            SyntheticMetricsSource::quiescent().with_ramp(Signal::ResponseTime, 100.0, 200.0, 1),
        );
        let mut collector = MetricsCollector::new(source, Duration::from_millis(100), 1000);

        collector.set_load(42);
        let sample = collector.collect().await.unwrap().clone();
        assert_eq!(sample.load, 42);
        assert_eq!(sample.response_time_ms, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_while_samples_during_slow_work() {
        let mut collector =
            MetricsCollector::new(quiet_source(), Duration::from_millis(1000), 1000);
        let cancel = CancellationToken::new();

        let value = collector
            .pace_while(
                async {
                    tokio::time::sleep(Duration::from_millis(4_500)).await;
                    7
                },
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(value, 7);
        // t = 0, 1, 2, 3, 4 seconds
        assert_eq!(collector.timeline().len(), 5);
        assert_eq!(collector.latest().unwrap().elapsed_ms, 4_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_while_skips_sampling_for_ready_work() {
        let mut collector =
            MetricsCollector::new(quiet_source(), Duration::from_millis(1000), 1000);
        let cancel = CancellationToken::new();

        collector.pace_while(async {}, &cancel).await.unwrap();
        assert!(collector.timeline().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_while_stops_on_cancel() {
        let mut collector =
            MetricsCollector::new(quiet_source(), Duration::from_millis(1000), 1000);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let err = collector
            .pace_while(
                async move {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    trigger.cancel();
                    std::future::pending::<()>().await;
                },
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::Cancelled));
        assert!(collector.timeline().len() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_stops_on_cancel() {
        let mut collector =
            MetricsCollector::new(quiet_source(), Duration::from_millis(1000), 1000);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = collector
            .pace(Duration::from_secs(60), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Cancelled));
    }
}
