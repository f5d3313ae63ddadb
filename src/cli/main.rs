//! Background Removal Intake CLI
//!
//! Command-line front-end for the job controller: takes one image, shows
//! progress while the service works, and downloads the result.

use super::config::CliConfigBuilder;
use crate::{
    artifact::ArtifactInfo,
    config::{IntakeConfig, ServiceConfig},
    controller::{JobController, JobSnapshot, JobState},
    services::{ConsoleProgressReporter, FileIOService},
    tracing_config::{spans, TracingConfig, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;

/// Background removal intake tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "imgly-bgremove-intake")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image (PNG, JPEG or WebP, at most 10MB)
    #[arg(value_name = "INPUT", required_unless_present = "show_limits")]
    pub input: Option<PathBuf>,

    /// Directory the result is downloaded to [default: user download directory]
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Background removal service [default: from config, else mock]
    #[arg(short, long, value_enum)]
    pub service: Option<CliService>,

    /// Endpoint of the HTTP service
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Request timeout of the HTTP service in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Simulated delay per mock progress step in milliseconds
    #[arg(long, value_name = "MS")]
    pub mock_delay_ms: Option<u64>,

    /// Make the mock service fail
    #[arg(long)]
    pub mock_fail: bool,

    /// Print a JSON summary of the finished job on stdout
    #[arg(long)]
    pub json: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Show accepted file types and size limit, then exit
    #[arg(long)]
    pub show_limits: bool,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliService {
    Mock,
    Http,
}

/// Machine-readable outcome printed with `--json`
#[derive(Debug, Serialize)]
struct JobSummary {
    state: JobState,
    generation: u64,
    source_name: Option<String>,
    dimensions: Option<(u32, u32)>,
    artifact: Option<ArtifactInfo>,
    download_path: Option<PathBuf>,
    notice: Option<&'static str>,
}

impl JobSummary {
    fn new(snapshot: JobSnapshot, download_path: Option<PathBuf>, notice: Option<&'static str>) -> Self {
        Self {
            state: snapshot.state,
            generation: snapshot.generation,
            source_name: snapshot.source_name,
            dimensions: snapshot.preview.and_then(|p| p.dimensions),
            artifact: snapshot.artifact,
            download_path,
            notice,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = uuid::Uuid::new_v4().to_string();
    TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(TracingFormat::Console)
        .with_session_id(session_id.clone())
        .init()
        .context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    if cli.show_limits {
        show_limits(&config);
        return Ok(());
    }

    let Some(input) = cli.input.clone() else {
        anyhow::bail!("An input file is required");
    };

    let controller = JobController::from_config(config)
        .context("Failed to create job controller")?
        .with_reporter(Arc::new(ConsoleProgressReporter::new(cli.verbose >= 2)));

    let span = spans::session(&session_id, service_name(&controller.config().service));
    run_job(&cli, &controller, &input).instrument(span).await
}

fn service_name(service: &ServiceConfig) -> &'static str {
    match service {
        ServiceConfig::Mock { .. } => "mock",
        ServiceConfig::Http { .. } => "http",
    }
}

async fn run_job(cli: &Cli, controller: &JobController, input: &Path) -> Result<()> {
    let raw = FileIOService::load_raw(input)
        .instrument(spans::file_intake(input))
        .await
        .context("Failed to read input")?;

    if let Err(e) = controller.intake(raw) {
        eprintln!("❌ {}", e.notice());
        print_summary(cli, controller.snapshot(), None, Some(e.notice()))?;
        return Err(e).context("Input file rejected");
    }

    let bar = progress_bar(cli.no_progress);
    let renderer = tokio::spawn(render_progress(controller.subscribe(), bar.clone()));

    let outcome = tokio::select! {
        outcome = controller.process() => outcome,
        _ = tokio::signal::ctrl_c() => {
            controller.reset();
            renderer.abort();
            bar.abandon_with_message("cancelled");
            anyhow::bail!("Cancelled by user");
        },
    };
    renderer.abort();

    let result = match outcome {
        Ok(info) => {
            bar.finish_with_message("done");
            tracing::info!(url = %info.url, size_bytes = info.size_bytes, "Result ready");
            let path = controller
                .download(cli.output_dir.as_deref())
                .await
                .context("Failed to download result")?;
            if let Some(path) = &path {
                println!("✅ Saved {}", path.display());
            }
            print_summary(cli, controller.snapshot(), path, None)
        },
        Err(e) => {
            bar.abandon_with_message(controller.snapshot().status_label);
            eprintln!("❌ {}", e.notice());
            print_summary(cli, controller.snapshot(), None, Some(e.notice()))?;
            Err(e).context("Background removal failed")
        },
    };

    controller.reset();
    result
}

fn progress_bar(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar.enable_steady_tick(std::time::Duration::from_millis(120));
    bar
}

async fn render_progress(mut updates: watch::Receiver<JobSnapshot>, bar: ProgressBar) {
    while updates.changed().await.is_ok() {
        let snapshot = updates.borrow_and_update().clone();
        bar.set_position(u64::from(snapshot.progress_percent));
        bar.set_message(snapshot.status_label);
    }
}

fn print_summary(
    cli: &Cli,
    snapshot: JobSnapshot,
    download_path: Option<PathBuf>,
    notice: Option<&'static str>,
) -> Result<()> {
    if cli.json {
        let summary = JobSummary::new(snapshot, download_path, notice);
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
        );
    }
    Ok(())
}

fn show_limits(config: &IntakeConfig) {
    println!("📋 Intake limits");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    let types: Vec<&str> = config.allowed_types.iter().map(|t| t.as_str()).collect();
    println!("  • Accepted types: {}", types.join(", "));
    println!(
        "  • Maximum size: {} bytes ({:.1} MB)",
        config.max_file_size,
        config.max_file_size as f64 / 1_048_576.0
    );
    println!(
        "  • Download name: {}_<unix millis>.png",
        config.download_prefix
    );
    println!(
        "  • Download directory: {}",
        config.resolve_download_dir().display()
    );
    match &config.service {
        ServiceConfig::Mock { step_delay_ms, fail } => {
            println!("  • Service: mock (step delay {}ms, fail: {})", step_delay_ms, fail);
        },
        ServiceConfig::Http {
            endpoint,
            timeout_secs,
        } => {
            println!("  • Service: http {} (timeout {}s)", endpoint, timeout_secs);
        },
    }
}
