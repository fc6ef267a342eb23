//! stenod: stenotype machine daemon
//!
//! Runs the configured steno machine and provides:
//! - Stroke and machine state notifications over a Unix socket
//! - Keyboard emulation commands from the translation engine
//! - Optional stroke logging

use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stenod::config::Config;
use stenod::events::{self, EventFanout, MachineEvent};
use stenod::ipc::{Daemon, Server};
use stenod::lifecycle::ShutdownSignal;
use stenod::machine::MachineRegistry;
use stenod::platform;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "stenod starting");

    // Load configuration
    let mut config = Config::load().context("failed to load configuration")?;
    config.ensure_dirs().context("failed to create data directory")?;
    info!(?config.socket_path, "configuration loaded");

    let registry = MachineRegistry::builtin();
    config.settings.check_machine_type(&registry);
    let settings = &config.settings;
    info!(
        machine = %settings.machine_type,
        system = %settings.system,
        "machine selected"
    );

    let keymap = registry.keymap(
        &settings.machine_type,
        &settings.system,
        settings.keymap(&settings.machine_type),
    );

    // Driver -> fanout -> IPC subscribers
    let (event_tx, event_rx) = events::channel();
    let (subscribers, _) = broadcast::channel::<MachineEvent>(256);
    let mut fanout = EventFanout::new(settings.log_strokes, subscribers.clone());

    let driver = registry.create_driver(
        &settings.machine_type,
        &settings.machine_options,
        keymap,
        event_tx,
    )?;
    let driver = Arc::new(Mutex::new(driver));

    let output = platform::spawn_key_output().context("failed to start key output thread")?;
    let daemon = Arc::new(Daemon::new(
        Arc::clone(&driver),
        output,
        settings.system.clone(),
    ));
    let server = Server::new(&config.socket_path, daemon, subscribers)?;

    if settings.auto_start {
        if let Err(e) = driver.lock().start_capture() {
            error!(%e, "failed to start capture");
        }
    }

    let shutdown = ShutdownSignal::new();

    info!("daemon initialized, entering main loop");

    tokio::select! {
        _ = events::dispatch(event_rx, &mut fanout) => {
            info!("machine event channel closed");
        }

        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        _ = async {
            if let Err(e) = shutdown.wait().await {
                error!(?e, "failed to register signal handlers");
                std::future::pending::<()>().await;
            }
        } => {
            info!("shutdown signal received");
        }
    }

    info!("shutting down...");

    let stopping = Arc::clone(&driver);
    tokio::task::spawn_blocking(move || stopping.lock().stop_capture())
        .await
        .context("failed to stop capture")?;
    server.shutdown().await;

    info!("stenod stopped");

    Ok(())
}
