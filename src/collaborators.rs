//! Contracts for the parts of the host application the engine talks to but
//! does not own: the banner surface, pointer geometry, focus/do-not-disturb,
//! the application registry and the settings store.

use std::sync::Arc;

use anyhow::Result;

use crate::models::{Notification, SenderIcon};
use crate::triggers::WakeHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// A notification captured from the host log.
    Notification,
    /// A banner injected by another in-process feature.
    Reminder,
}

/// The on-screen banner. Calls arrive from the engine's tasks; implementations
/// forward them to their UI thread.
pub trait Presenter: Send + Sync {
    fn show(&self, kind: SurfaceKind, notification: &Notification);
    fn dismiss(&self);
    /// True while any surface owned by the presenter is on screen, including
    /// ones the engine did not ask for.
    fn is_visible(&self) -> bool;
    fn play_chime(&self) {}
}

pub trait Geometry: Send + Sync {
    /// Whether the pointer is inside the hit-zone of the shown banner on the
    /// active display. `None` when the position cannot be determined.
    fn pointer_in_zone(&self, shown: &Notification) -> Option<bool>;
}

/// Do-not-disturb / focus mode.
pub trait Suppression: Send + Sync {
    fn is_active(&self) -> bool;
}

/// A running instance of a registered application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningApp {
    pub identifier: String,
    pub pid: u32,
}

pub trait AppRegistry: Send + Sync {
    /// Properly-cased identifier for `raw` when the registry knows an
    /// equivalent spelling (case differences, aliases).
    fn canonical_identifier(&self, _raw: &str) -> Option<String> {
        None
    }
    fn display_name(&self, identifier: &str) -> Option<String>;
    fn icon(&self, identifier: &str) -> Option<SenderIcon>;
    fn running_process(&self, identifier: &str) -> Option<RunningApp>;
    /// Bring the application forward (launching it if needed).
    fn activate(&self, identifier: &str) -> Result<()>;
}

/// Externally mutable feature switches. Read on every decision.
pub trait SettingsSource: Send + Sync {
    fn installed(&self) -> bool;
    fn enabled(&self) -> bool;
    fn show_preview(&self) -> bool;
    fn chime_enabled(&self) -> bool {
        true
    }

    /// Installed and enabled.
    fn feature_active(&self) -> bool {
        self.installed() && self.enabled()
    }
}

/// Low-latency "a record is about to land" signal from the host, typically a
/// lightweight inter-process notification that fires before the log file
/// changes.
pub trait PreSignal: Send + Sync {
    fn arm(&self, wake: WakeHandle) -> Result<()>;
    fn disarm(&self);
}

#[derive(Clone)]
pub struct Collaborators {
    pub presenter: Arc<dyn Presenter>,
    pub geometry: Arc<dyn Geometry>,
    pub suppression: Arc<dyn Suppression>,
    pub registry: Arc<dyn AppRegistry>,
    pub settings: Arc<dyn SettingsSource>,
    pub pre_signal: Option<Arc<dyn PreSignal>>,
}
