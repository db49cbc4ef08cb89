use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use airfeed_core::{
    filter_file, publish, CycleWorkspace, FilterStats, HttpSource, PipelineConfig, RefreshConfig,
    RefreshPipeline, Scheduler,
};
use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Periodically refresh a filtered copy of a remote CSV dataset", long_about = None)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Default)]
struct Overrides {
    /// TOML file with source, output and rule settings
    #[arg(long, global = true, env = "AIRFEED_CONFIG")]
    config: Option<PathBuf>,
    /// Path of the published dataset
    #[arg(short, long, global = true, env = "AIRFEED_OUTPUT")]
    output: Option<PathBuf>,
    /// URL of the remote CSV
    #[arg(long, global = true, env = "AIRFEED_SOURCE_URL")]
    source_url: Option<String>,
    /// Download timeout in seconds
    #[arg(long, global = true, env = "AIRFEED_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,
    /// Directory for in-progress downloads
    #[arg(long, global = true, env = "AIRFEED_STAGING_DIR")]
    staging_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, filter and publish once; exits non-zero on failure
    RunOnce,
    /// Refresh now and then every interval until interrupted
    RunContinuous(ContinuousArgs),
    /// Filter a local raw CSV and publish the result
    Filter(FilterArgs),
    /// Print the effective selection and projection rules
    Rules,
}

#[derive(Args, Debug)]
struct ContinuousArgs {
    /// Hours between refreshes
    #[arg(long)]
    interval_hours: Option<f64>,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Raw CSV to filter (left untouched)
    #[arg(short, long)]
    input: PathBuf,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.overrides)?;

    match cli.command {
        Command::RunOnce => handle_run_once(&config).await,
        Command::RunContinuous(args) => handle_run_continuous(config, args).await,
        Command::Filter(args) => handle_filter(&config, args).await,
        Command::Rules => {
            let text = toml::to_string_pretty(&config.rules).context("failed to render rules")?;
            println!("{text}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(overrides: &Overrides) -> Result<RefreshConfig> {
    let mut config = match &overrides.config {
        Some(path) => RefreshConfig::from_toml_file(path)?,
        None => RefreshConfig::default(),
    };

    if let Some(output) = &overrides.output {
        config.output_path = output.clone();
    }
    if let Some(url) = &overrides.source_url {
        config.source_url = url.clone();
    }
    if let Some(timeout) = overrides.timeout_secs {
        config.timeout_secs = timeout;
    }
    if let Some(dir) = &overrides.staging_dir {
        config.staging_dir = Some(dir.clone());
    }

    config.validate()?;
    Ok(config)
}

fn build_scheduler(config: &RefreshConfig) -> Result<Scheduler> {
    let source = HttpSource::new(config.source_url.clone(), config.timeout())
        .context("failed to build HTTP client")?;
    let pipeline = RefreshPipeline::new(Arc::new(source), PipelineConfig::from(config));
    Ok(Scheduler::new(pipeline, config.interval()))
}

async fn handle_run_once(config: &RefreshConfig) -> Result<ExitCode> {
    let mut scheduler = build_scheduler(config)?;
    match scheduler.run_once().await {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(_) => Ok(ExitCode::FAILURE),
    }
}

async fn handle_run_continuous(mut config: RefreshConfig, args: ContinuousArgs) -> Result<ExitCode> {
    if let Some(hours) = args.interval_hours {
        config.interval_hours = hours;
        config.validate()?;
    }

    let mut scheduler = build_scheduler(&config)?;
    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    let state = scheduler.run_continuous(cancel).await;
    info!(
        cycles = state.cycles_run,
        last_success = ?state.last_success,
        "program stopped"
    );
    Ok(ExitCode::SUCCESS)
}

async fn handle_filter(config: &RefreshConfig, args: FilterArgs) -> Result<ExitCode> {
    let workspace = CycleWorkspace::new(&config.staging_dir(), &config.output_path);
    let result = filter_and_publish(config, &workspace, args.input).await;
    workspace.cleanup().await;

    match result {
        Ok(stats) => {
            info!(
                rows_kept = stats.rows_kept,
                total_rows = stats.total_rows_seen,
                path = %config.output_path.display(),
                "filter complete"
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "filter failed; published dataset left unchanged");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn filter_and_publish(
    config: &RefreshConfig,
    workspace: &CycleWorkspace,
    input: PathBuf,
) -> Result<FilterStats> {
    let candidate = workspace.candidate_path().to_path_buf();
    let rules = config.rules.clone();
    let display = input.display().to_string();

    let stats = tokio::task::spawn_blocking(move || filter_file(&input, &candidate, &rules))
        .await
        .map_err(|err| anyhow!("filter task aborted: {err}"))?
        .with_context(|| format!("failed to filter {display}"))?;

    publish(workspace.candidate_path(), &config.output_path)
        .await
        .context("failed to publish filtered dataset")?;
    Ok(stats)
}

fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown requested; stopping after the current cycle");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "could not install SIGTERM handler; listening for Ctrl-C only");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c() => {}
        _ = terminate => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    ctrl_c().await;
}

/// Resolves on Ctrl-C. If the handler cannot be installed it never resolves.
async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
