//! Resource pressure applied by memory and cpu scenarios.
//!
//! Both pressures are RAII guards: dropping them releases every allocation
//! and stops every spinning worker, whichever way the scenario ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use stresskit_core::{HarnessError, HarnessResult};

/// Memory held on behalf of a memory scenario.
#[derive(Debug, Default)]
pub struct MemoryPressure {
    blocks: Vec<Vec<u8>>,
    held_bytes: usize,
}

impl MemoryPressure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate and fill `bytes` more memory so it is actually resident.
    ///
    /// An allocation the process cannot satisfy is reported as
    /// [`HarnessError::ResourcePressure`]; memory already held is kept.
    pub fn allocate(&mut self, bytes: usize) -> HarnessResult<()> {
        if bytes == 0 {
            return Ok(());
        }
        let mut block = Vec::new();
        if let Err(err) = block.try_reserve_exact(bytes) {
            warn!(
                bytes,
                held_bytes = self.held_bytes,
                error = %err,
                "Memory pressure allocation failed"
            );
            return Err(HarnessError::ResourcePressure(format!(
                "could not allocate {bytes} bytes on top of {} held: {err}",
                self.held_bytes
            )));
        }
        block.resize(bytes, 1u8);
        self.held_bytes += bytes;
        self.blocks.push(block);
        Ok(())
    }

    pub fn held_bytes(&self) -> usize {
        self.held_bytes
    }
}

impl Drop for MemoryPressure {
    fn drop(&mut self) {
        if self.held_bytes > 0 {
            debug!(bytes = self.held_bytes, "Releasing memory pressure");
        }
    }
}

/// CPU-bound spinners run on the blocking pool.
#[derive(Debug)]
pub struct CpuPressure {
    stop: Arc<AtomicBool>,
    workers: usize,
}

impl CpuPressure {
    pub fn new(workers: usize) -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            workers: workers.max(1),
        }
    }

    /// Spin every worker for `busy`, or until the guard is dropped.
    /// Returns the number of workers that completed their spin.
    pub async fn burn(&self, busy: Duration) -> usize {
        if busy.is_zero() {
            return 0;
        }

        let handles: Vec<_> = (0..self.workers)
            .map(|_| {
                let stop = Arc::clone(&self.stop);
                tokio::task::spawn_blocking(move || spin(busy, &stop))
            })
            .collect();

        let mut completed = 0;
        for handle in handles {
            if matches!(handle.await, Ok(true)) {
                completed += 1;
            }
        }
        completed
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Drop for CpuPressure {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Busy loop; returns false when stopped early.
fn spin(busy: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + busy;
    let mut acc: u64 = 0x9E37_79B9_7F4A_7C15;
    while Instant::now() < deadline {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        for _ in 0..1_000 {
            acc = acc.rotate_left(5) ^ acc.wrapping_mul(31);
        }
        std::hint::black_box(acc);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_pressure_accounts_allocations() {
        let mut pressure = MemoryPressure::new();
        pressure.allocate(3 * 4096).unwrap();
        pressure.allocate(0).unwrap();
        pressure.allocate(10).unwrap();
        assert_eq!(pressure.held_bytes(), 3 * 4096 + 10);
    }

    #[test]
    fn test_impossible_allocation_is_an_error() {
        let mut pressure = MemoryPressure::new();
        pressure.allocate(64).unwrap();

        let err = pressure.allocate(usize::MAX).unwrap_err();
        assert!(matches!(err, HarnessError::ResourcePressure(_)));
        assert_eq!(pressure.held_bytes(), 64);
    }

    #[tokio::test]
    async fn test_cpu_pressure_runs_every_worker() {
        let pressure = CpuPressure::new(2);
        let completed = pressure.burn(Duration::from_millis(20)).await;
        assert_eq!(completed, 2);
    }

    #[test]
    fn test_spin_stops_when_flagged() {
        let stop = AtomicBool::new(true);
        assert!(!spin(Duration::from_secs(60), &stop));
    }
}
