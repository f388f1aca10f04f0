//! Seams between the harness and the system under test.

use async_trait::async_trait;

use crate::error::{SourceError, TargetError};
use crate::sample::PerformanceSnapshot;

/// Supplies the runtime signals sampled by the metrics collector.
///
/// Implementations must only observe the system under test.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Read the current metrics.
    async fn current_metrics(&self) -> Result<PerformanceSnapshot, SourceError>;
}

/// Cache layer of the system under test, reset around each scenario.
#[async_trait]
pub trait CacheControl: Send + Sync {
    async fn clear_cache(&self) -> Result<(), TargetError>;
}

/// Cache control for targets without a cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl CacheControl for NoopCache {
    async fn clear_cache(&self) -> Result<(), TargetError> {
        Ok(())
    }
}

/// The system under test, as seen by the scenario driver.
#[async_trait]
pub trait LoadTarget: Send + Sync {
    /// Apply one tick of load at the given level.
    async fn apply_load(&self, load: u32) -> Result<(), TargetError>;

    /// Push a chunk of `records` through the target.
    async fn process_volume(&self, records: u64) -> Result<(), TargetError>;

    /// Perform a single operation on behalf of a concurrency worker.
    async fn execute_operation(&self, worker: usize) -> Result<(), TargetError>;
}

/// A scenario exposed as an independently runnable test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// Test name, `stress::<scenario id>`
    pub name: String,
    pub scenario_id: String,
    pub description: String,
}

/// Test framework the orchestrator registers its scenarios with.
pub trait TestRegistrar {
    fn register(&mut self, case: TestCase);
}

impl TestRegistrar for Vec<TestCase> {
    fn register(&mut self, case: TestCase) {
        self.push(case);
    }
}
