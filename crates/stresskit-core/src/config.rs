//! Configuration management for stresskit
//!
//! Configuration is layered:
//! - YAML configuration files
//! - Environment variable overrides
//! - Reasonable defaults
//! - Validation of harness settings and every scenario

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};
use crate::scenario::Scenario;

/// Root configuration: harness settings plus the scenario registry.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StresskitConfig {
    #[serde(default)]
    pub harness: HarnessConfig,

    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

impl StresskitConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. Config file specified by STRESSKIT_CONFIG env var
    /// 3. ./config/stresskit.yaml
    /// 4. Hardcoded defaults (lowest priority)
    pub fn load() -> HarnessResult<Self> {
        let mut builder = Self::set_defaults(Config::builder())?;

        if let Ok(config_path) = std::env::var("STRESSKIT_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        builder = builder.add_source(File::with_name("./config/stresskit").required(false));

        // Example: STRESSKIT__HARNESS__RECOVERY_PAUSE_SECS=5
        builder = builder.add_source(
            Environment::with_prefix("STRESSKIT")
                .separator("__")
                .try_parsing(true),
        );

        let config: StresskitConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file, environment overrides still apply.
    pub fn from_file<P: AsRef<Path>>(path: P) -> HarnessResult<Self> {
        let config: StresskitConfig = Self::set_defaults(Config::builder())?
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("STRESSKIT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        debug!(
            path = %path.as_ref().display(),
            scenarios = config.scenarios.len(),
            "Loaded stresskit configuration"
        );
        Ok(config)
    }

    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let defaults = HarnessConfig::default();
        builder
            .set_default("harness.sampling_interval_ms", defaults.sampling_interval_ms as i64)?
            .set_default("harness.tick_interval_ms", defaults.tick_interval_ms as i64)?
            .set_default("harness.recovery_pause_secs", defaults.recovery_pause_secs as i64)?
            .set_default("harness.retention_cap", defaults.retention_cap as i64)?
            .set_default(
                "harness.endurance_check_interval_secs",
                defaults.endurance_check_interval_secs as i64,
            )?
            .set_default("harness.volume_chunks", defaults.volume_chunks as i64)?
            .set_default("harness.spike_multiplier", defaults.spike_multiplier as i64)?
            .set_default("harness.operations_per_worker", defaults.operations_per_worker as i64)?
            .set_default("harness.pressure_steps", defaults.pressure_steps as i64)?
            .set_default(
                "harness.min_stability_samples",
                defaults.min_stability_samples as i64,
            )
    }

    /// Validate harness settings and every scenario.
    pub fn validate(&self) -> HarnessResult<()> {
        self.harness.validate()?;

        let mut seen = HashSet::new();
        for scenario in &self.scenarios {
            scenario.validate()?;
            if !seen.insert(scenario.id.as_str()) {
                return Err(HarnessError::invalid_scenario(
                    &scenario.id,
                    "duplicate scenario id",
                ));
            }
        }

        Ok(())
    }
}

/// Harness-level settings shared by every scenario.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Interval between metric samples (ms)
    pub sampling_interval_ms: u64,

    /// Length of one driver tick for ramp/sustain/endurance loops (ms)
    pub tick_interval_ms: u64,

    /// Pause between scenarios so the target can settle (seconds)
    pub recovery_pause_secs: u64,

    /// Maximum samples retained per run
    pub retention_cap: usize,

    /// How often an endurance run consults the detector (seconds)
    pub endurance_check_interval_secs: u64,

    /// Number of chunks a volume scenario is split into
    pub volume_chunks: u32,

    /// Parallel load applications fired by a spike
    pub spike_multiplier: u32,

    /// Operations performed by each concurrency worker
    pub operations_per_worker: u32,

    /// Sub-steps of a memory or cpu pressure scenario
    pub pressure_steps: u32,

    /// Samples needed before a stability analysis counts as conclusive
    pub min_stability_samples: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            sampling_interval_ms: 1000,
            tick_interval_ms: 1000,
            recovery_pause_secs: 30,
            retention_cap: 1000,
            endurance_check_interval_secs: 5,
            volume_chunks: 10,
            spike_multiplier: 10,
            operations_per_worker: 10,
            pressure_steps: 10,
            min_stability_samples: 2,
        }
    }
}

impl HarnessConfig {
    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn recovery_pause(&self) -> Duration {
        Duration::from_secs(self.recovery_pause_secs)
    }

    pub fn endurance_check_interval(&self) -> Duration {
        Duration::from_secs(self.endurance_check_interval_secs)
    }

    /// Validate configuration values
    pub fn validate(&self) -> HarnessResult<()> {
        let checks = [
            (self.sampling_interval_ms == 0, "harness.sampling_interval_ms must be > 0"),
            (self.tick_interval_ms == 0, "harness.tick_interval_ms must be > 0"),
            (self.retention_cap < 2, "harness.retention_cap must be >= 2"),
            (
                self.endurance_check_interval_secs == 0,
                "harness.endurance_check_interval_secs must be > 0",
            ),
            (self.volume_chunks == 0, "harness.volume_chunks must be > 0"),
            (self.spike_multiplier == 0, "harness.spike_multiplier must be > 0"),
            (self.pressure_steps == 0, "harness.pressure_steps must be > 0"),
        ];

        for (failed, message) in checks {
            if failed {
                return Err(HarnessError::Config(message.to_string()));
            }
        }

        Ok(())
    }
}
