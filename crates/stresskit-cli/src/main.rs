use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

use commands::run::{RunOptions, TargetSpec};
use stresskit_harness::ReportFormat;

#[derive(Parser, Debug)]
#[command(name = "stresskit")]
#[command(about = "Stress and breaking-point testing harness", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the configured scenarios and write a report
    Run {
        /// Scenario configuration file (YAML)
        #[arg(long, env = "STRESSKIT_CONFIG")]
        config: PathBuf,

        /// HTTP endpoint under test, or `synthetic` for a dry run
        #[arg(long)]
        target: String,

        /// Process to watch for memory and CPU (defaults to this process)
        #[arg(long)]
        pid: Option<u32>,

        /// Memory budget in MiB that memory usage is normalized against
        #[arg(long)]
        memory_budget_mb: Option<u64>,

        /// Only run these scenario ids (comma-separated)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,

        /// Directory reports are written to
        #[arg(long, default_value = "stress-reports")]
        report_dir: PathBuf,

        /// Report format
        #[arg(long, value_enum, default_value = "markdown")]
        format: FormatArg,

        /// Also write harness metrics in Prometheus text format to this file
        #[arg(long)]
        metrics_out: Option<PathBuf>,
    },

    /// List the scenarios in a configuration file
    List {
        /// Scenario configuration file (YAML)
        #[arg(long, env = "STRESSKIT_CONFIG")]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Markdown,
    Json,
}

impl From<FormatArg> for ReportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Markdown => ReportFormat::Markdown,
            FormatArg::Json => ReportFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_logging();

    match Cli::parse().command {
        Command::Run {
            config,
            target,
            pid,
            memory_budget_mb,
            only,
            report_dir,
            format,
            metrics_out,
        } => {
            let all_passed = commands::run::execute(RunOptions {
                config,
                target: TargetSpec::parse(&target),
                pid,
                memory_budget_mb,
                only,
                report_dir,
                format: format.into(),
                metrics_out,
            })
            .await?;

            Ok(if all_passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::List { config } => {
            commands::list::execute(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();
}
