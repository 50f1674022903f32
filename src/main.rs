use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use netwatch::{MonitorConfig, StatusBoard, api, engine, utils};

#[tokio::main]
async fn main() -> Result<()> {
    utils::setup_console();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into()))
        .with_ansi(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("NETWATCH_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));
    let config = if config_path.exists() {
        MonitorConfig::load(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?
    } else {
        info!("{} not found, running with defaults", config_path.display());
        MonitorConfig::default().validated()?
    };

    let shutdown = CancellationToken::new();
    let board = StatusBoard::new();

    if let Some(port) = config.api_port {
        let board = board.clone();
        tokio::spawn(async move {
            if let Err(e) = api::start_server(port, board).await {
                error!("Status API failed: {}", e);
            }
        });
    }

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received. Stopping netwatch...");
        signal_token.cancel();
    });

    engine::run(config, shutdown, Some(board))
        .await
        .context("netwatch could not start")?;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    let mut term = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            error!("SIGTERM handler unavailable: {}", e);
            let _ = signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = signal::ctrl_c().await;
}
