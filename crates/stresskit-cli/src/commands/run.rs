use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use stresskit_core::{LoadTarget, MetricsSource, StresskitConfig};
use stresskit_harness::synthetic::{ScriptedTarget, SyntheticMetricsSource};
use stresskit_harness::telemetry::export_metrics;
use stresskit_harness::{
    HttpTarget, HttpTargetOptions, ProcessMetricsSource, ReportFormat, ReportWriter,
    RequestStats, StressHarness,
};
use tracing::{info, warn};

/// What the harness drives load against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// In-process target with a steady synthetic metrics source.
    Synthetic,
    Http(String),
}

impl TargetSpec {
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("synthetic") {
            TargetSpec::Synthetic
        } else {
            TargetSpec::Http(raw.to_string())
        }
    }
}

pub struct RunOptions {
    pub config: PathBuf,
    pub target: TargetSpec,
    pub pid: Option<u32>,
    pub memory_budget_mb: Option<u64>,
    pub only: Vec<String>,
    pub report_dir: PathBuf,
    pub format: ReportFormat,
    pub metrics_out: Option<PathBuf>,
}

/// Run the suite and write its report. Returns whether every scenario passed.
pub async fn execute(options: RunOptions) -> Result<bool> {
    let config = StresskitConfig::from_file(&options.config)
        .with_context(|| format!("failed to load {}", options.config.display()))?;
    let config = select_scenarios(config, &options.only)?;
    if config.scenarios.is_empty() {
        bail!("no scenarios configured in {}", options.config.display());
    }

    let (source, target) = build_endpoints(&options)?;
    let harness = StressHarness::from_config(config, source, target)?;

    let token = harness.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling stress run");
            token.cancel();
        }
    });

    let run = harness.run_suite().await?;

    let path = ReportWriter::new(options.format).write_suite(
        &options.report_dir,
        &run.summary,
        &run.results,
    )?;
    info!(
        report = %path.display(),
        passed = run.summary.passed,
        total = run.summary.total,
        "Stress run complete"
    );

    if let Some(metrics_path) = &options.metrics_out {
        let text = export_metrics().map_err(|e| anyhow!("failed to encode metrics: {e}"))?;
        std::fs::write(metrics_path, text)
            .with_context(|| format!("failed to write {}", metrics_path.display()))?;
    }

    Ok(run.summary.all_passed())
}

/// Keep only the requested scenarios, in configuration order.
fn select_scenarios(mut config: StresskitConfig, only: &[String]) -> Result<StresskitConfig> {
    if only.is_empty() {
        return Ok(config);
    }

    if let Some(missing) = only
        .iter()
        .find(|id| !config.scenarios.iter().any(|s| &s.id == *id))
    {
        bail!("scenario `{missing}` is not configured");
    }

    config.scenarios.retain(|s| only.contains(&s.id));
    Ok(config)
}

type Endpoints = (Arc<dyn MetricsSource>, Arc<dyn LoadTarget>);

fn build_endpoints(options: &RunOptions) -> Result<Endpoints> {
    match &options.target {
        TargetSpec::Synthetic => Ok((
            Arc::new(SyntheticMetricsSource::quiescent()),
            Arc::new(ScriptedTarget::new()),
        )),
        TargetSpec::Http(url) => {
            let stats = Arc::new(RequestStats::new());
            let target =
                HttpTarget::new(url.clone(), Arc::clone(&stats), HttpTargetOptions::default())?;

            let mut source = match options.pid {
                Some(pid) => ProcessMetricsSource::with_pid(stats, pid),
                None => ProcessMetricsSource::current(stats)?,
            };
            if let Some(mb) = options.memory_budget_mb {
                source = source.with_memory_budget(mb.saturating_mul(1024 * 1024));
            }

            Ok((Arc::new(source), Arc::new(target)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(file, "{body}").unwrap();
        file
    }

    const CONFIG: &str = "\
harness:
  recovery_pause_secs: 0
scenarios:
  - id: bulk
    name: Bulk volume
    kind: volume
    load:
      data_volume: 500
  - id: workers
    name: Workers
    kind: concurrency
    load:
      concurrency: 2
";

    #[test]
    fn test_target_spec_parse() {
        assert_eq!(TargetSpec::parse("Synthetic"), TargetSpec::Synthetic);
        assert_eq!(
            TargetSpec::parse("http://localhost:8080/health"),
            TargetSpec::Http("http://localhost:8080/health".to_string())
        );
    }

    #[test]
    fn test_select_scenarios_filters_and_rejects_unknown() {
        let file = write_config(CONFIG);
        let config = StresskitConfig::from_file(file.path()).unwrap();

        let selected = select_scenarios(config.clone(), &["workers".to_string()]).unwrap();
        assert_eq!(selected.scenarios.len(), 1);
        assert_eq!(selected.scenarios[0].id, "workers");

        assert!(select_scenarios(config, &["nope".to_string()]).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthetic_run_writes_report() {
        let file = write_config(CONFIG);
        let dir = tempfile::tempdir().unwrap();
        let metrics = dir.path().join("metrics.prom");

        let passed = execute(RunOptions {
            config: file.path().to_path_buf(),
            target: TargetSpec::Synthetic,
            pid: None,
            memory_budget_mb: None,
            only: Vec::new(),
            report_dir: dir.path().join("reports"),
            format: ReportFormat::Json,
            metrics_out: Some(metrics.clone()),
        })
        .await
        .unwrap();

        assert!(passed);
        let reports: Vec<_> = std::fs::read_dir(dir.path().join("reports"))
            .unwrap()
            .collect();
        assert_eq!(reports.len(), 1);
        let exported = std::fs::read_to_string(metrics).unwrap();
        assert!(exported.contains("stresskit_scenario_runs_total"));
    }
}
