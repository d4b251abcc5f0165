//! Harvest - run the analysis pipeline and collect its artifacts

mod config;
mod logging;
mod summary;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use harvest_core::application::constants::DEFAULT_KERNEL;
use harvest_core::application::{FileReconciler, Pipeline, UnitExecutor};
use harvest_core::domain::{ChangeDetection, ProtectedPaths};
use harvest_core::port::id_provider::UuidProvider;
use harvest_core::port::time_provider::SystemTimeProvider;
use harvest_infra_system::{SubprocessConfig, SubprocessRunner};

use config::{resolve_base_dir, PipelineLayout};
use summary::ProgressPrinter;

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Run analysis notebooks and scripts, harvesting charts and tables", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Project root holding the units, stage folders and archive
    #[arg(long, env = "HARVEST_BASE_DIR", default_value = ".")]
    base_dir: String,

    /// JSON job table replacing the built-in one
    #[arg(long, env = "HARVEST_CONFIG")]
    config: Option<PathBuf>,

    /// Python interpreter for script units
    #[arg(long, env = "HARVEST_PYTHON", default_value = "python3")]
    python: String,

    /// Jupyter launcher for notebook units
    #[arg(long, env = "HARVEST_JUPYTER", default_value = "jupyter")]
    jupyter: String,

    /// Kernel notebooks execute in
    #[arg(long, env = "HARVEST_KERNEL", default_value = DEFAULT_KERNEL)]
    kernel: String,

    /// Per-unit time limit in seconds (unbounded when omitted)
    #[arg(long, env = "HARVEST_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// How modified artifacts are detected: timestamp or content
    #[arg(long, env = "HARVEST_DETECT", default_value = "timestamp")]
    detect: ChangeDetection,

    /// Write the run report as JSON to this file
    #[arg(long, env = "HARVEST_REPORT")]
    report: Option<PathBuf>,

    /// Extra environment for every unit (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    env: Vec<(String, String)>,
}

fn parse_key_val(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Execute every job in order (default)
    Run,

    /// Show the job table without executing anything
    Jobs,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_format = std::env::var("HARVEST_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let log_dir = std::env::var_os("HARVEST_LOG_DIR").map(PathBuf::from);
    let _log_guard = logging::init(&log_format, log_dir.as_deref())?;

    let base_dir = resolve_base_dir(&cli.base_dir)?;
    let layout = PipelineLayout::load(cli.config.as_deref())?.resolve(&base_dir);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Jobs => {
            println!("{}", "Job table".cyan().bold());
            println!("{}", summary::plan_table(&layout.jobs, &base_dir));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run => {
            info!(
                version = harvest_core::VERSION,
                base_dir = %base_dir.display(),
                jobs = layout.jobs.len(),
                detection = ?cli.detect,
                "Harvest starting"
            );
            layout.bootstrap()?;

            // DI wiring
            let time_provider = Arc::new(SystemTimeProvider);
            let id_provider = Arc::new(UuidProvider);

            let runner = Arc::new(SubprocessRunner::new(
                time_provider.clone(),
                SubprocessConfig {
                    python: cli.python,
                    jupyter: cli.jupyter,
                    kernel: cli.kernel,
                    timeout: cli.timeout_secs.map(Duration::from_secs),
                },
            ));
            let reconciler = FileReconciler::new(
                ProtectedPaths::new(layout.protected_dirs.iter().cloned()),
                cli.detect,
            );
            let executor = Arc::new(UnitExecutor::new(
                runner,
                reconciler,
                layout.archive_dir.clone(),
                time_provider.clone(),
                id_provider.clone(),
            )
            .with_env(cli.env.into_iter().collect()));
            let pipeline = Pipeline::new(layout.jobs.clone(), executor, time_provider, id_provider)
                .with_observer(Arc::new(ProgressPrinter));

            let report = pipeline.run().await;
            summary::print_summary(&report, &base_dir);

            if let Some(path) = cli.report {
                let body = serde_json::to_string_pretty(&report)?;
                std::fs::write(&path, body)
                    .with_context(|| format!("Failed to write report {}", path.display()))?;
            }

            Ok(if report.has_failures() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}
