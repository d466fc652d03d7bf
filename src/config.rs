use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::platform;

pub const DEFAULT_OWN_IDENTIFIER: &str = "dev.notifhud.app";

/// Tunables for the ingestion engine. Millisecond fields so the struct can be
/// loaded from a JSON file as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Host notification log (SQLite). Its `-wal` sibling is watched as well.
    pub log_path: PathBuf,

    /// Slow backstop poll
    pub poll_interval_ms: u64,
    /// Quiet period after the last wake-up before the log is read
    pub debounce_ms: u64,
    /// Max records decoded per check
    pub batch_size: usize,

    pub auto_dismiss_ms: u64,
    /// Gap between hiding one banner and showing the next, so the hide
    /// animation finishes first
    pub settle_delay_ms: u64,
    pub recovery_interval_ms: u64,

    /// Our own sender identifier; never shown.
    pub own_identifier: String,
    pub ignored_senders: Vec<String>,

    pub watch_store: bool,
    pub watch_wal: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_path: platform::default_log_path(),
            poll_interval_ms: 2_000,
            debounce_ms: 50,
            batch_size: 10,
            auto_dismiss_ms: 5_000,
            settle_delay_ms: 250,
            recovery_interval_ms: 3_000,
            own_identifier: DEFAULT_OWN_IDENTIFIER.into(),
            ignored_senders: vec![
                "com.apple.notificationcenterui".into(),
                "com.apple.UserNotificationCenter".into(),
            ],
            watch_store: true,
            watch_wal: true,
        }
    }
}

impl EngineConfig {
    /// Defaults with `NOTIF_HUD_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("NOTIF_HUD_LOG_PATH") {
            if !path.trim().is_empty() {
                config.log_path = PathBuf::from(path);
            }
        }

        let debug_mode = std::env::var("NOTIF_HUD_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            config.poll_interval_ms = 500;
        }

        if let Some(ms) = std::env::var("NOTIF_HUD_POLL_MS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
        {
            config.poll_interval_ms = ms;
        }

        config
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn auto_dismiss(&self) -> Duration {
        Duration::from_millis(self.auto_dismiss_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_millis(self.recovery_interval_ms)
    }

    /// Own identifier first, then the configured extras.
    pub fn ignore_list(&self) -> Vec<String> {
        std::iter::once(self.own_identifier.clone())
            .chain(self.ignored_senders.iter().cloned())
            .collect()
    }
}
