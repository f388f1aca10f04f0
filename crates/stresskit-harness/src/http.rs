//! HTTP load target
//!
//! Load levels translate into concurrent requests against one endpoint.
//! Every request is recorded in the shared [`RequestStats`] so a
//! [`crate::sources::ProcessMetricsSource`] can report what the target saw.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::debug;

use stresskit_core::{LoadTarget, TargetError};

use crate::sources::RequestStats;

/// Connection settings for an [`HttpTarget`].
#[derive(Debug, Clone)]
pub struct HttpTargetOptions {
    pub request_timeout: Duration,
    /// Requests allowed in flight at once; the rest queue.
    pub max_in_flight: usize,
    /// Records per request when processing volume.
    pub volume_batch: u64,
}

impl Default for HttpTargetOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_in_flight: 256,
            volume_batch: 1_000,
        }
    }
}

#[derive(Debug, Serialize)]
struct VolumeBatch {
    records: u64,
}

pub struct HttpTarget {
    client: Client,
    url: String,
    stats: Arc<RequestStats>,
    slots: Semaphore,
    options: HttpTargetOptions,
}

impl HttpTarget {
    pub fn new(
        url: impl Into<String>,
        stats: Arc<RequestStats>,
        options: HttpTargetOptions,
    ) -> Result<Self, TargetError> {
        let client = Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| TargetError::Operation(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            stats,
            slots: Semaphore::new(options.max_in_flight.max(1)),
            options,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<StatusCode, TargetError> {
        let permit = {
            let _waiting = self.stats.enqueue();
            self.slots
                .acquire()
                .await
                .map_err(|_| TargetError::crashed("request slots closed"))?
        };
        let _active = self.stats.begin();

        let started = Instant::now();
        let outcome = request.send().await;
        let latency = started.elapsed();
        drop(permit);

        match outcome {
            Ok(response) if response.status().is_success() => {
                self.stats.record_success(latency);
                Ok(response.status())
            }
            Ok(response) => {
                self.stats.record_failure(latency);
                Ok(response.status())
            }
            Err(err) => {
                self.stats.record_failure(latency);
                Err(self.classify(err))
            }
        }
    }

    fn classify(&self, err: reqwest::Error) -> TargetError {
        if err.is_connect() {
            TargetError::crashed(format!("{} is unreachable: {err}", self.url))
        } else if err.is_timeout() {
            TargetError::Timeout(self.options.request_timeout.as_millis() as u64)
        } else {
            TargetError::Operation(err.to_string())
        }
    }

    /// Crashes abort the step; other failures are already counted in the
    /// error rate.
    fn settle(outcomes: Vec<Result<StatusCode, TargetError>>) -> Result<(), TargetError> {
        for outcome in outcomes {
            match outcome {
                Err(err) if err.is_crash() => return Err(err),
                Err(err) => debug!(error = %err, "Request failed"),
                Ok(_) => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LoadTarget for HttpTarget {
    async fn apply_load(&self, load: u32) -> Result<(), TargetError> {
        let requests = (0..load).map(|_| self.send(self.client.get(&self.url)));
        Self::settle(join_all(requests).await)
    }

    async fn process_volume(&self, records: u64) -> Result<(), TargetError> {
        let batch = self.options.volume_batch.max(1);
        let mut remaining = records;
        let mut bodies = Vec::new();
        while remaining > 0 {
            let size = remaining.min(batch);
            bodies.push(VolumeBatch { records: size });
            remaining -= size;
        }

        let requests = bodies
            .iter()
            .map(|body| self.send(self.client.post(&self.url).json(body)));
        Self::settle(join_all(requests).await)
    }

    async fn execute_operation(&self, worker: usize) -> Result<(), TargetError> {
        let request = self
            .client
            .get(&self.url)
            .header("x-stresskit-worker", worker.to_string());
        let status = self.send(request).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(TargetError::Operation(format!(
                "worker {worker} got HTTP {status}"
            )))
        }
    }
}
