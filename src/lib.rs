pub mod access;
pub mod collaborators;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod headless;
pub mod log_access;
pub mod models;
pub mod platform;
pub mod queue;
pub mod settings;
pub mod triggers;
mod utils;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

pub use collaborators::Collaborators;
pub use config::EngineConfig;
pub use engine::NotificationEngine;
pub use settings::SettingsStore;

use headless::{LogPresenter, NeverSuppressed, NoGeometry};
use platform::SystemAppRegistry;

const SETTINGS_FILE: &str = "settings.json";

/// Initialize logging (reads RUST_LOG env var). Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}

fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("notif-hud")
        .join(SETTINGS_FILE)
}

/// Headless entry point: capture notifications and log them until Ctrl-C.
pub fn run() -> Result<()> {
    init_logging();
    log::info!("notif-hud starting up...");

    let config = EngineConfig::from_env();
    let settings = Arc::new(SettingsStore::new(settings_path())?);

    let collaborators = Collaborators {
        presenter: Arc::new(LogPresenter::default()),
        geometry: Arc::new(NoGeometry),
        suppression: Arc::new(NeverSuppressed),
        registry: Arc::new(SystemAppRegistry::new()),
        settings,
        pre_signal: None,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("notif-hud-rt")
        .build()
        .context("failed to build async runtime")?;

    runtime.block_on(async move {
        let engine = NotificationEngine::new(config, collaborators);
        log::info!("reading notifications from {}", engine.config().log_path.display());

        engine.start_monitoring().await;
        if !engine.has_access() {
            log::warn!(
                "grant Full Disk Access to this binary; retrying every {:?}",
                engine.config().recovery_interval()
            );
        }

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;

        log::info!("shutting down");
        engine.stop_monitoring().await;
        Ok(())
    })
}
