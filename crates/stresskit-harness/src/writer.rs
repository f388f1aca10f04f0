//! Markdown and JSON rendering of stress results

use std::fmt::{self, Write as _};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use stresskit_core::{HarnessResult, StressTestResult, SuiteSummary};

/// Report format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Markdown,
    Json,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Markdown => "md",
            ReportFormat::Json => "json",
        }
    }
}

#[derive(Serialize)]
struct SuiteReport<'a> {
    summary: &'a SuiteSummary,
    results: &'a [StressTestResult],
}

/// Writes suite reports to disk.
pub struct ReportWriter {
    format: ReportFormat,
}

impl ReportWriter {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    /// Write the whole suite as `stress-<run id>.<ext>` under `dir`.
    pub fn write_suite(
        &self,
        dir: impl AsRef<Path>,
        summary: &SuiteSummary,
        results: &[StressTestResult],
    ) -> HarnessResult<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let path = dir.join(format!("stress-{}.{}", summary.run_id, self.format.extension()));
        fs::write(&path, self.render_suite(summary, results)?)?;

        info!(path = %path.display(), scenarios = results.len(), "Wrote stress report");
        Ok(path)
    }

    pub fn render_suite(
        &self,
        summary: &SuiteSummary,
        results: &[StressTestResult],
    ) -> HarnessResult<String> {
        match self.format {
            ReportFormat::Json => Ok(serde_json::to_string_pretty(&SuiteReport {
                summary,
                results,
            })?),
            ReportFormat::Markdown => Ok(render_markdown(summary, results)?),
        }
    }

    /// Render a single scenario result.
    pub fn render_result(&self, result: &StressTestResult) -> HarnessResult<String> {
        match self.format {
            ReportFormat::Json => Ok(serde_json::to_string_pretty(result)?),
            ReportFormat::Markdown => {
                let mut out = String::new();
                write_result(&mut out, result)?;
                Ok(out)
            }
        }
    }
}

fn status(passed: bool) -> &'static str {
    if passed {
        "✅ PASS"
    } else {
        "❌ FAIL"
    }
}

fn render_markdown(
    summary: &SuiteSummary,
    results: &[StressTestResult],
) -> Result<String, fmt::Error> {
    let mut out = format!(
        r#"# Stress Test Report: {}

**Status**: {}

---

## Summary

- **Scenarios**: {}
- **Passed**: {}
- **Average Score**: {:.3}

"#,
        summary.run_id,
        status(summary.all_passed()),
        summary.total,
        summary.passed,
        summary.average_score,
    );

    if !summary.breaking_points.is_empty() {
        writeln!(out, "## Breaking Points\n")?;
        writeln!(out, "| Scenario | Metric | Value | Threshold | Recoverability |")?;
        writeln!(out, "|----------|--------|-------|-----------|----------------|")?;
        for bp in &summary.breaking_points {
            writeln!(
                out,
                "| {} | {} | {:.3} | {:.3} | {} |",
                bp.scenario_id, bp.metric, bp.value, bp.threshold, bp.recoverability
            )?;
        }
        writeln!(out)?;
    }

    for result in results {
        write_result(&mut out, result)?;
    }

    Ok(out)
}

fn write_result(out: &mut String, result: &StressTestResult) -> fmt::Result {
    let peak = &result.peak_metrics;
    let avg = &result.average_metrics;
    let stability = &result.stability_analysis;

    write!(
        out,
        r#"---

## {} (`{}`)

- **Kind**: {}
- **Status**: {}
- **Score**: {:.3}
- **Duration**: {:.1} seconds
- **Samples**: {}

| Metric | Average | Peak |
|--------|---------|------|
| Response time | {:.2}ms | {:.2}ms |
| Throughput | {:.1} | {:.1} |
| Error rate | {:.4}% | {:.4}% |
| Memory | {:.1}% | {:.1}% |
| CPU | {:.1}% | {:.1}% |

### Stability

- **Overall**: {:.3}
- **Response time**: {:.3}
- **Throughput**: {:.3}
- **Memory**: {:.3}
- **Degradation**: {:.2}x
"#,
        result.scenario_name,
        result.scenario_id,
        result.kind,
        status(result.passed),
        result.score,
        result.duration_ms as f64 / 1000.0,
        result.timeline.len(),
        avg.response_time_ms,
        peak.response_time_ms,
        avg.throughput,
        peak.throughput,
        avg.error_rate * 100.0,
        peak.error_rate * 100.0,
        avg.memory_usage * 100.0,
        peak.memory_usage * 100.0,
        avg.cpu_usage * 100.0,
        peak.cpu_usage * 100.0,
        stability.overall_stability,
        stability.response_time_stability,
        stability.throughput_stability,
        stability.memory_stability,
        stability.performance_degradation,
    )?;
    if !stability.conclusive {
        writeln!(out, "- _Inconclusive: {} samples_", stability.sample_count)?;
    }
    writeln!(out)?;

    match &result.breaking_point {
        Some(bp) => {
            writeln!(
                out,
                "### Breaking Point\n\n{} reached {:.3} (limit {:.3}), {}\n",
                bp.metric, bp.value, bp.threshold, bp.recoverability
            )?;
            if let Some(cause) = &bp.root_cause {
                writeln!(out, "Root cause: {cause}\n")?;
            }
        }
        None => writeln!(out, "### Breaking Point\n\nNone reached\n")?,
    }

    if let Some(recovery) = &result.recovery {
        match recovery.recovered_after_ms {
            Some(ms) if recovery.recovered => {
                writeln!(out, "### Recovery\n\nrecovered after {ms} ms\n")?
            }
            _ => writeln!(
                out,
                "### Recovery\n\ndid not recover within {} ms\n",
                recovery.window_ms
            )?,
        }
    }

    if !result.recommendations.is_empty() {
        writeln!(out, "### Recommendations\n")?;
        for rec in &result.recommendations {
            writeln!(out, "- **[{:?}]** {}", rec.priority, rec.title)?;
            for action in &rec.actions {
                writeln!(out, "  - {action}")?;
            }
        }
        writeln!(out)?;
    }

    if !result.errors.is_empty() {
        writeln!(out, "### Errors\n")?;
        for error in &result.errors {
            writeln!(out, "- **{:?}**: {}", error.severity, error.message)?;
            for cause in &error.causes {
                writeln!(out, "  - caused by: {cause}")?;
            }
        }
        writeln!(out)?;
    }

    Ok(())
}
