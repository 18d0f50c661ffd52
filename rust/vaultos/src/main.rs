//! vaultosd: periodic expiry sweeper for vaultOS sessions.
//!
//! Loads `~/.config/vaultos/config.toml`, connects to the local engine and
//! removes expired ephemeral sessions every `sweep.interval_secs` until
//! Ctrl-C. The fleet status is logged whenever it changes.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use vaultos::logging::init_logging_with_default;
use vaultos::{Config, DockerEngine, SessionManager, SystemStatus};

#[tokio::main]
async fn main() {
    init_logging_with_default("info");

    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    let engine = DockerEngine::connect().await?;
    let manager = SessionManager::from_config(Arc::new(engine), &config);

    sweep_loop(&manager, &config).await
}

async fn sweep_loop(manager: &SessionManager, config: &Config) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(config.sweep_interval());
    let mut last_status: Option<SystemStatus> = None;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    info!(interval = ?config.sweep_interval(), "Sweeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match manager.sweep().await {
                    Ok(survivors) => debug!(remaining = survivors.len(), "Sweep done"),
                    Err(e) => warn!(error = %e, "Sweep failed"),
                }
                let status = manager.system_status().await;
                if last_status.as_ref() != Some(&status) {
                    info!(
                        connected = status.connected,
                        engine = %status.engine_version,
                        total = status.total,
                        running = status.running,
                        stopped = status.stopped,
                        "Fleet status"
                    );
                    last_status = Some(status);
                }
            }
            result = &mut shutdown => {
                result?;
                info!("Interrupted, stopping sweeper");
                return Ok(());
            }
        }
    }
}
