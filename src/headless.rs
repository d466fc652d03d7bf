//! Collaborators for running the engine without a UI: banners go to the log.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::collaborators::{Geometry, Presenter, Suppression, SurfaceKind};
use crate::models::Notification;

/// Prints every banner instead of drawing it.
#[derive(Default)]
pub struct LogPresenter {
    visible: AtomicBool,
}

impl Presenter for LogPresenter {
    fn show(&self, kind: SurfaceKind, notification: &Notification) {
        self.visible.store(true, Ordering::SeqCst);
        log::info!(
            "[{kind:?}] {} | {} | {} | {}",
            notification.source_name,
            notification.title.as_deref().unwrap_or(""),
            notification.subtitle.as_deref().unwrap_or(""),
            notification.body.as_deref().unwrap_or("")
        );
    }

    fn dismiss(&self) {
        if self.visible.swap(false, Ordering::SeqCst) {
            log::info!("[banner] hidden");
        }
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    fn play_chime(&self) {
        log::info!("[banner] chime");
    }
}

/// No pointer; the interaction flag alone decides.
pub struct NoGeometry;

impl Geometry for NoGeometry {
    fn pointer_in_zone(&self, _shown: &Notification) -> Option<bool> {
        None
    }
}

pub struct NeverSuppressed;

impl Suppression for NeverSuppressed {
    fn is_active(&self) -> bool {
        false
    }
}
