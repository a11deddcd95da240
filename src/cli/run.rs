use crate::config::{load_config, SYSTEM_CONFIG_PATH};
use crate::export::InfluxExporterFactory;
use crate::pipeline::{run_watcher, watch_directory, Dispatcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::parse::ConfigError),

    #[error("line grammar error: {0}")]
    Grammar(#[from] crate::source::parser::ParseError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("signal handler error: {0}")]
    Signal(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/gkle/config.yml");
            eprintln!("  {}", SYSTEM_CONFIG_PATH);
            eprintln!("\nUse --config <path> to specify a config file, or run 'gkle config init' to generate one.");
            std::process::exit(1);
        }
    };

    run_exporter(&config_path).await.map_err(|e| e.into())
}

async fn run_exporter(config_path: &Path) -> Result<(), RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(config_path)?;

    let exporters = Arc::new(InfluxExporterFactory::new(config.influxdb.clone()));
    let dispatcher = Dispatcher::from_config(&config, exporters)?;

    info!(
        log_dir = %config.gk_log_dir.display(),
        checkpoint = %config.checkpoint_path.display(),
        influxdb = %config.influxdb.url,
        "Starting gatekeeper log exporter"
    );

    // Keep the watcher alive for the lifetime of the drain task.
    let (watcher, events) = watch_directory(&config.gk_log_dir)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handle = tokio::spawn(run_watcher(
        dispatcher,
        events,
        shutdown_rx,
        config.drain_on_startup,
    ));

    let finished = tokio::select! {
        signal = shutdown_signal() => {
            signal?;
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
            None
        }
        result = &mut handle => Some(result),
    };

    // A pass in progress runs to completion before the task sees shutdown.
    let result = match finished {
        Some(result) => result,
        None => handle.await,
    };
    drop(watcher);

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(error = %e, "Watcher stopped");
            return Err(e.into());
        }
        Err(e) => {
            error!(error = %e, "Watcher task join error");
            return Err(e.into());
        }
    }

    info!("Shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
