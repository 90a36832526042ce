//! CleanSweep - background host for the organizing engine.
//!
//! # Overview
//!
//! This binary runs the engine without a window. It initializes:
//! - Logging infrastructure (file rotation + console output)
//! - Tokio runtime (scan worker, debounce coordinator, status timers)
//! - Settings and engine tunables
//! - The [`OrganizerEngine`], which starts monitoring when setup is complete
//!
//! # Execution Flow
//!
//! 1. Resolve `<data dir>/CleanSweep/` for settings, tunables and logs
//! 2. Initialize logging → `<data dir>/CleanSweep/logs/cleansweep.<date>`
//! 3. Load `engine.yaml` and `CLEANSWEEP_*` overrides
//! 4. Bootstrap the engine; on first run install the default rules
//! 5. Wait for Ctrl+C
//! 6. Stop monitoring, log metrics, shut the runtime down with a 5s timeout

use anyhow::{Context, Result};
use cleansweep::services::{AutostartRegistrar, DisabledAutostart, XdgAutostart};
use cleansweep::{APP_NAME, EngineConfig, OrganizerEngine, SettingsStore, StateChange, VERSION};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn main() -> Result<()> {
    let store = SettingsStore::from_app_data_dir().context("Failed to locate settings directory")?;
    let log_dir = store.settings_dir().join("logs");

    let _log_guard = cleansweep::logging::setup_logging_with_console(
        &log_dir,
        "cleansweep",
        cfg!(debug_assertions),
        true,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let config = EngineConfig::load(Some(store.settings_dir())).unwrap_or_else(|e| {
        tracing::warn!("Ignoring engine configuration: {}", e);
        EngineConfig::default()
    });

    let autostart: Arc<dyn AutostartRegistrar> = match XdgAutostart::for_current_exe() {
        Ok(registrar) => Arc::new(registrar),
        Err(e) => {
            tracing::warn!("Autostart unavailable: {}", e);
            Arc::new(DisabledAutostart)
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("cleansweep-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let engine = OrganizerEngine::bootstrap(store, config, autostart, runtime.handle().clone());

    if engine.is_first_run() {
        tracing::info!("First run: installing default rules");
        engine.load_default_rules();
        engine.complete_first_run_setup();
    }

    runtime.spawn(log_state_changes(engine.subscribe()));

    tracing::info!(
        "Watching {} ({}), press Ctrl+C to exit",
        engine.watched_folder(),
        engine.snapshot().rules_summary()
    );
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("Failed to listen for Ctrl+C")?;

    tracing::info!("Shutdown requested");
    engine.stop_monitoring();
    engine.metrics().log_summary();
    drop(engine);

    runtime.shutdown_timeout(Duration::from_secs(5));

    tracing::info!("Application shutdown complete");
    Ok(())
}

/// Mirror engine state changes into the log
async fn log_state_changes(mut changes: broadcast::Receiver<StateChange>) {
    loop {
        match changes.recv().await {
            // Errors are already logged at warn by the engine
            Ok(StateChange::StatusChanged { status: Some(status) }) if !status.is_error => {
                tracing::info!("{}", status.text);
            }
            Ok(StateChange::MonitoringChanged { is_monitoring }) => {
                tracing::info!(is_monitoring, "Monitoring changed");
            }
            Ok(change) => tracing::trace!("State change: {:?}", change),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("State listener lagged, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
