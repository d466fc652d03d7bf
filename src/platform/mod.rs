//! Host-specific pieces: where the notification log lives, how to send the
//! user to the privacy settings, and the default application registry.

mod app_registry;

use std::path::PathBuf;
#[cfg(target_os = "macos")]
use std::process::Command;

#[cfg(target_os = "macos")]
use anyhow::{bail, Context};
use anyhow::Result;

pub use app_registry::SystemAppRegistry;

#[cfg(target_os = "macos")]
const FULL_DISK_ACCESS_URL: &str =
    "x-apple.systempreferences:com.apple.preference.security?Privacy_AllFiles";

/// Known locations of the host notification log, most recent layout first.
pub fn log_path_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(home) = dirs::home_dir() {
        candidates.push(
            home.join("Library")
                .join("Group Containers")
                .join("group.com.apple.usernoted")
                .join("db2")
                .join("db"),
        );
    }

    #[cfg(target_os = "macos")]
    if let Some(user_dir) = darwin_user_dir() {
        candidates.push(
            user_dir
                .join("com.apple.notificationcenter")
                .join("db2")
                .join("db"),
        );
    }

    candidates
}

/// First candidate that exists, else the first candidate, else a relative
/// fallback that will simply fail the access probe.
pub fn default_log_path() -> PathBuf {
    let candidates = log_path_candidates();
    candidates
        .iter()
        .find(|path| path.exists())
        .or_else(|| candidates.first())
        .cloned()
        .unwrap_or_else(|| PathBuf::from("db2").join("db"))
}

#[cfg(target_os = "macos")]
fn darwin_user_dir() -> Option<PathBuf> {
    let output = Command::new("getconf").arg("DARWIN_USER_DIR").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let raw = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!raw.is_empty()).then(|| PathBuf::from(raw))
}

/// Open the host's privacy pane where the user grants log access.
pub fn open_access_settings() -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        let status = Command::new("open")
            .arg(FULL_DISK_ACCESS_URL)
            .status()
            .context("failed to launch System Settings")?;
        if !status.success() {
            bail!("`open` exited with {status}");
        }
        Ok(())
    }

    #[cfg(not(target_os = "macos"))]
    {
        anyhow::bail!("access settings are only available on macOS")
    }
}
