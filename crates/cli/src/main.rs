mod metrics;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chronos_core::{
    load_config, load_config_from_env, validate_config, Config, HttpUploadBackend, InputObject,
    JobStatusPoller, PollOutcome, UploadBackend, UploadError, UploadOrchestrator, UploadProgress,
};

/// Config file used when `--config` is not given and the file exists.
const DEFAULT_CONFIG_FILE: &str = "chronos.toml";

/// How often upload progress is logged.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
#[command(name = "chronos", version, about = "Upload videos in parts and track their processing")]
struct Cli {
    /// Path to a TOML config file (default: ./chronos.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Write Prometheus metrics to this file when the command ends
    #[arg(long, global = true)]
    metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a video and wait for its processing task
    Upload {
        /// File to upload
        file: PathBuf,

        /// Override the media type guessed from the file extension
        #[arg(long)]
        media_type: Option<String>,

        /// Exit after commit without waiting for processing
        #[arg(long)]
        no_wait: bool,
    },
    /// Track an existing processing task
    Status {
        task_id: String,

        /// Query once and print the observation
        #[arg(long)]
        once: bool,
    },
    /// Check that the control plane is reachable
    Health,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    if let Err(e) = run(cli).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    // stdout is reserved for command output
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load(cli.config.as_deref())?;
    let backend = Arc::new(
        HttpUploadBackend::new(&config.control_plane)
            .context("Failed to create control plane client")?,
    );

    // Ctrl-C cancels whatever is in flight
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            warn!("Interrupt received, cancelling");
            cancel.cancel();
        });
    }

    let result = match cli.command {
        Command::Upload {
            file,
            media_type,
            no_wait,
        } => upload(&config, backend, &file, media_type, no_wait, &cancel).await,
        Command::Status { task_id, once } => status(&config, backend, &task_id, once, &cancel).await,
        Command::Health => health(backend.as_ref()).await,
    };

    if let Some(path) = &cli.metrics_file {
        if let Err(e) = metrics::write_metrics_file(path) {
            warn!("{:#}", e);
        }
    }
    result
}

/// Load and validate configuration.
fn load(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?
        }
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            info!("Loading configuration from {}", DEFAULT_CONFIG_FILE);
            load_config(Path::new(DEFAULT_CONFIG_FILE))
                .with_context(|| format!("Failed to load config from {}", DEFAULT_CONFIG_FILE))?
        }
        None => load_config_from_env().context("Failed to load config from environment")?,
    };

    validate_config(&config).context("Configuration validation failed")?;
    info!("Control plane: {}", config.control_plane.url);
    Ok(config)
}

async fn upload(
    config: &Config,
    backend: Arc<HttpUploadBackend>,
    file: &Path,
    media_type: Option<String>,
    no_wait: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut object = InputObject::from_path(file)
        .await
        .with_context(|| format!("Failed to open {:?}", file))?;
    if let Some(media_type) = media_type {
        object = object.with_media_type(media_type);
    }

    let orchestrator = UploadOrchestrator::new(config.upload.clone(), backend.clone());
    let progress = UploadProgress::new();

    let upload = orchestrator.upload_with_progress(&object, &progress, cancel);
    tokio::pin!(upload);
    let mut ticker = tokio::time::interval(PROGRESS_LOG_INTERVAL);
    let result = loop {
        tokio::select! {
            result = &mut upload => break result,
            _ = ticker.tick() => {
                if progress.total_parts() > 0 {
                    info!(
                        completed = progress.completed_parts(),
                        total = progress.total_parts(),
                        "Uploading {:.0}%",
                        progress.fraction() * 100.0
                    );
                }
            }
        }
    };

    let receipt = match result {
        Ok(receipt) => receipt,
        Err(UploadError::Cancelled {
            session: Some(session),
        }) => {
            match orchestrator
                .abort(&session.object_key, &session.upload_id)
                .await
            {
                Ok(()) => info!(upload_id = %session.upload_id, "Released cancelled upload"),
                Err(e) => warn!(
                    upload_id = %session.upload_id,
                    "Failed to release cancelled upload: {}", e
                ),
            }
            bail!("upload cancelled");
        }
        Err(e) => return Err(e.into()),
    };

    println!("{}", serde_json::to_string_pretty(&receipt)?);
    if no_wait {
        return Ok(());
    }

    let poller = JobStatusPoller::new(config.poller.clone(), backend);
    report_outcome(watch_task(&poller, &receipt.task_id, cancel).await)
}

async fn status(
    config: &Config,
    backend: Arc<HttpUploadBackend>,
    task_id: &str,
    once: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let poller = JobStatusPoller::new(config.poller.clone(), backend);

    if once {
        let observation = poller
            .observe(task_id)
            .await
            .with_context(|| format!("Failed to query task {}", task_id))?;
        println!("{}", serde_json::to_string_pretty(&observation)?);
        return Ok(());
    }

    report_outcome(watch_task(&poller, task_id, cancel).await)
}

/// Watch a task, logging each change of status text.
async fn watch_task(
    poller: &JobStatusPoller,
    task_id: &str,
    cancel: &CancellationToken,
) -> PollOutcome {
    let mut last_detail: Option<String> = None;
    poller
        .watch(task_id, cancel, |observation| {
            if last_detail.as_deref() != Some(observation.detail.as_str()) {
                info!(
                    task_id = %observation.task_id,
                    state = %observation.state,
                    "{}",
                    observation.detail
                );
                last_detail = Some(observation.detail.clone());
            }
        })
        .await
}

fn report_outcome(outcome: PollOutcome) -> Result<()> {
    match outcome {
        PollOutcome::Succeeded { detail } => {
            println!("{}", detail);
            Ok(())
        }
        other => bail!("processing {}", other),
    }
}

async fn health(backend: &dyn UploadBackend) -> Result<()> {
    backend
        .health()
        .await
        .context("Control plane health check failed")?;
    println!("ok");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
