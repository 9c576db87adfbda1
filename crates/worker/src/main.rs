//! # Conveyor Worker
//!
//! Demo worker binary. Loads TOML configuration, wires the pipeline engine
//! to the control plane, keeps the registration heartbeat alive for the
//! duration of a run, and records runs in the audit log when one is
//! configured.

mod demo;
mod logging;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use conveyor_core::{
    AuditLog, ConfigError, Context, ControlPlane, ControlPlaneClient, IdentityStore,
    LifecycleHandle, Pipeline, WorkerConfig, WorkerLifecycle,
};
use serde_json::json;

const DEFAULT_INPUT: &str = r#"{"x": 5, "y": "a"}"#;

/// How long `run` waits for the first health verdict before starting anyway.
const STARTUP_WAIT: Duration = Duration::from_secs(5);

#[derive(Parser, Clone)]
#[command(author, version, about = "Conveyor - Pipeline Worker Runtime")]
struct Args {
    /// Path to the worker configuration file
    #[arg(short, long, global = true, default_value = "conveyor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Run the demo pipeline once (default)
    Run {
        /// Initial run input as a JSON object
        #[arg(short, long, default_value = DEFAULT_INPUT)]
        input: String,
    },
    /// List the workers known to the control plane
    Dashboard,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    let _log_guard = logging::init().context("Failed to initialize logging")?;

    let config = load_config(&args.config).await?;

    match args.command.unwrap_or(CliCommand::Run {
        input: DEFAULT_INPUT.to_string(),
    }) {
        CliCommand::Run { input } => run_once(&config, &input).await,
        CliCommand::Dashboard => show_dashboard(&config).await,
    }
}

/// Load configuration, falling back to defaults when the file is absent.
async fn load_config(path: &Path) -> Result<WorkerConfig> {
    match WorkerConfig::load(path).await {
        Ok(config) => Ok(config),
        Err(ConfigError::Read { source, .. }) if source.kind() == ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "No config file found, using defaults");
            Ok(WorkerConfig::default())
        }
        Err(e) => Err(e).context("Failed to load worker configuration"),
    }
}

async fn run_once(config: &WorkerConfig, input: &str) -> Result<()> {
    let initial: Context = serde_json::from_str(input)
        .context("Run input must be a JSON object, e.g. '{\"x\": 5}'")?;

    let pipeline = Arc::new(demo::build_pipeline(config)?);
    tracing::info!(
        name = %config.name,
        steps = pipeline.steps().len(),
        telemetry = config.pipeline_use,
        "Starting Conveyor worker"
    );

    let mut lifecycle = spawn_lifecycle(config, &pipeline)?;
    if let Some(handle) = lifecycle.as_mut() {
        // Registration happens on the spawned heartbeat; wait for the first
        // verdict so this run carries telemetry. A dead control plane delays
        // the run by at most the wait, never blocks it.
        if tokio::time::timeout(STARTUP_WAIT, handle.started())
            .await
            .is_err()
        {
            tracing::warn!("No health verdict from the control plane yet, running unreported");
        }
    }

    let audit = match &config.audit_db_name {
        Some(db) => Some(AuditLog::open(db).context("Failed to open audit log")?),
        None => None,
    };

    let entry = match &audit {
        Some(log) => Some(
            log.begin(&initial.to_value())
                .await
                .context("Failed to record audit entry")?,
        ),
        None => None,
    };

    let result = pipeline.run(initial).await;

    match &result {
        Ok(data) => {
            if let Some(mut entry) = entry {
                entry.set_output(data.to_value());
                entry.finish();
            }
            println!("{}", serde_json::to_string_pretty(&data.to_value())?);
        }
        Err(e) => {
            if let Some(mut entry) = entry {
                entry.set_details(json!({ "error": e.to_string() }));
                entry.finish();
            }
            tracing::error!("Pipeline run failed: {}", e);
        }
    }

    if let Some(handle) = lifecycle {
        handle.shutdown().await;
    }
    if let Some(log) = audit {
        log.close().await.context("Failed to flush audit log")?;
    }

    result.map(|_| ()).map_err(Into::into)
}

/// Start the registration heartbeat when the control plane is configured.
fn spawn_lifecycle(
    config: &WorkerConfig,
    pipeline: &Arc<Pipeline>,
) -> Result<Option<LifecycleHandle>> {
    let Some(control) = pipeline.control() else {
        return Ok(None);
    };
    let lifecycle = WorkerLifecycle::new(
        Arc::clone(pipeline),
        control,
        IdentityStore::new(&config.worker_id_file),
        &config.name,
        &config.version,
    );
    Ok(Some(lifecycle.spawn()?))
}

async fn show_dashboard(config: &WorkerConfig) -> Result<()> {
    let api = config
        .api_config()
        .context("Control plane is disabled; set pipeline_use = true in the config")?;
    let client = ControlPlaneClient::new(&api)?;
    let workers = client.dashboard().await?;
    println!("{}", serde_json::to_string_pretty(&workers)?);
    Ok(())
}
