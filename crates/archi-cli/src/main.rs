//! archi: run architecture analysis batches from the command line.
//!
//! Loads configuration from an optional TOML file plus `ARCHI_*`
//! environment overrides, wires the HTTP collection gateway, the
//! configured analyzer and the file report sink, then submits a batch and
//! shows its progress until the task finishes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use archi_pipeline::collector::http::HttpCollectionGateway;
use archi_pipeline::collector::CollectionGateway;
use archi_pipeline::report::FileReportSink;
use archi_pipeline::{
    analyzer, logging, PipelineConfig, PipelineOrchestrator, ReportFormat, TaskResult,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

/// Architecture analysis pipeline driver
#[derive(Parser)]
#[command(name = "archi")]
#[command(about = "Collect, analyze and report on application architecture", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short, global = true, env = "ARCHI_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a batch of applications
    Run {
        /// Application identifiers
        ids: Vec<String>,

        /// Read additional identifiers from a file, one per line
        #[arg(long)]
        ids_file: Option<PathBuf>,

        /// Report format (markdown, json, html); defaults to the configured one
        #[arg(long, short)]
        format: Option<ReportFormat>,

        /// Inventory service base URL, overrides the configuration
        #[arg(long)]
        endpoint: Option<String>,

        /// Directory for the report, overrides the configuration
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Do not register the task for progress polling
        #[arg(long)]
        no_track: bool,

        /// Print the full task result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe the inventory service health endpoint
    Health {
        /// Inventory service base URL, overrides the configuration
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    logging::init(&config.logging);

    match cli.command {
        Commands::Run {
            ids,
            ids_file,
            format,
            endpoint,
            output_dir,
            no_track,
            json,
        } => {
            let mut config = config;
            if let Some(endpoint) = endpoint {
                config.collector.endpoint = Some(endpoint);
            }
            if let Some(output_dir) = output_dir {
                config.report.output_dir = output_dir;
            }
            let ids = gather_ids(ids, ids_file)?;
            let format = format.unwrap_or(config.report.default_format);
            let track = config.processing.enable_progress_tracking && !no_track;
            tracing::debug!(app_count = ids.len(), %format, track, "starting run command");
            let result = run(config, ids, format, track).await?;
            print_result(&result, json)?;
            if !result.success {
                std::process::exit(1);
            }
        },
        Commands::Health { endpoint } => {
            let mut config = config;
            if let Some(endpoint) = endpoint {
                config.collector.endpoint = Some(endpoint);
            }
            let gateway = HttpCollectionGateway::new(&config.collector)?;
            if gateway.health_check().await {
                println!("{} {}", "healthy".green().bold(), gateway.endpoint());
            } else {
                println!("{} {}", "unhealthy".red().bold(), gateway.endpoint());
                std::process::exit(1);
            }
        },
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        },
    }
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config
        .with_env_overrides()
        .context("applying ARCHI_* environment overrides")
}

fn gather_ids(mut ids: Vec<String>, ids_file: Option<PathBuf>) -> Result<Vec<String>> {
    if let Some(path) = ids_file {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading identifiers from {}", path.display()))?;
        ids.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }
    if ids.is_empty() {
        bail!("no application identifiers given; pass them as arguments or with --ids-file");
    }
    Ok(ids)
}

async fn run(
    config: PipelineConfig,
    ids: Vec<String>,
    format: ReportFormat,
    track: bool,
) -> Result<TaskResult> {
    let gateway = Arc::new(HttpCollectionGateway::new(&config.collector)?);
    let analyzer = analyzer::from_config(&config.analyzer)?;
    let sink = Arc::new(FileReportSink::new(config.report.output_dir.clone()));
    let orchestrator = PipelineOrchestrator::new(config, gateway, analyzer, sink);

    let handle = orchestrator.submit(ids, format, track);
    tracing::debug!(task_id = handle.task_id(), "task submitted");
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos:>3}% {wide_msg}")?
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    bar.set_message(format!("task {}", handle.task_id()));

    while !handle.is_finished() {
        if let Some(progress) = orchestrator.get_progress(handle.task_id()) {
            bar.set_position((progress.progress * 100.0).round() as u64);
            bar.set_message(format!("{}: {}", progress.stage, progress.message));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let result = handle.wait().await;
    bar.finish_and_clear();
    if !result.success {
        tracing::warn!(
            task_id = %result.task_id,
            error = result.error_message.as_deref().unwrap_or("unknown error"),
            "analysis task failed"
        );
    }
    Ok(result)
}

fn print_result(result: &TaskResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    if result.success {
        println!("{} task {}", "✓".green().bold(), result.task_id);
        if let Some(analysis) = &result.analysis {
            println!("  architecture: {}", analysis.architecture_type);
            println!("  quality:      {}/10", analysis.quality_score);
        }
        println!("  records:      {}", result.records.len());
        if let Some(location) = &result.report_location {
            println!("  report:       {location}");
        }
    } else {
        println!("{} task {}", "✗".red().bold(), result.task_id);
        println!(
            "  error:        {}",
            result.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    println!("  elapsed:      {:.2}s", result.elapsed_secs());
    Ok(())
}
