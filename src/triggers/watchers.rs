use std::ffi::OsString;
use std::path::Path;

use notify::event::EventKind;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use super::{TriggerSource, WakeHandle};

const ENABLE_LOGS: bool = false;

use crate::log_debug;

/// Watch one file through its parent directory, so a file that does not
/// exist yet (the WAL before the first write) still wakes once it appears.
/// Wakes on anything but pure access events that touch that file name.
/// Returns `None` when the directory cannot be watched.
pub(super) fn watch_file(
    path: &Path,
    source: TriggerSource,
    wake: WakeHandle,
) -> Option<RecommendedWatcher> {
    let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
        log_debug!("{source:?} watcher skipped; {} has no parent", path.display());
        return None;
    };
    if !dir.is_dir() {
        log_debug!("{source:?} watcher skipped; {} does not exist", dir.display());
        return None;
    }
    let name: OsString = name.to_owned();

    let mut watcher =
        match notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
            match res {
                Ok(event) if matches!(event.kind, EventKind::Access(_)) => {}
                Ok(event) => {
                    if event
                        .paths
                        .iter()
                        .any(|changed| changed.file_name() == Some(name.as_os_str()))
                    {
                        wake.wake(source);
                    }
                }
                // Backends report overflow and similar trouble as errors; a
                // spurious check is harmless.
                Err(_) => wake.wake(source),
            }
        }) {
            Ok(watcher) => watcher,
            Err(err) => {
                log::warn!("failed to create {source:?} watcher: {err}");
                return None;
            }
        };

    if let Err(err) = watcher.watch(dir, RecursiveMode::NonRecursive) {
        log::warn!("failed to watch {}: {err}", dir.display());
        return None;
    }

    log_debug!("{source:?} watcher on {}", path.display());
    Some(watcher)
}
