//! Fan-in of every "the log may have changed" signal into one debounced
//! check request.
//!
//! Sources push [`TriggerSource`] values onto a bounded channel. A single
//! coalescing task restarts its quiet-period deadline on every wake-up and,
//! once the deadline passes, asks the consumer for one check. Bursts of
//! several wake-ups per delivered notification collapse into one log read.

mod debounce;
mod watchers;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::RecommendedWatcher;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::collaborators::PreSignal;

pub use debounce::debounce_loop;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const WAKE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TriggerSource {
    /// Fixed-interval backstop
    Poll,
    /// The log's main database file changed
    Store,
    /// The write-ahead log changed; usually earlier than `Store`
    WriteAheadLog,
    /// Host hint that a record is imminent
    PreSignal,
    /// The previous read filled a whole batch
    CatchUp,
}

/// Cloneable handle used by sources (including external ones) to request a
/// check. Never blocks; a full channel already guarantees a pending check.
#[derive(Clone)]
pub struct WakeHandle {
    tx: mpsc::Sender<TriggerSource>,
}

impl WakeHandle {
    pub fn wake(&self, source: TriggerSource) {
        if let Err(mpsc::error::TrySendError::Closed(_)) = self.tx.try_send(source) {
            log::trace!("wake from {source:?} after triggers were disarmed");
        }
    }
}

#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub poll_interval: Duration,
    pub debounce: Duration,
    pub watch_store: bool,
    pub watch_wal: bool,
}

/// Files whose changes mean "new records may exist".
#[derive(Debug, Clone)]
pub struct WatchPaths {
    pub store: PathBuf,
    pub wal: PathBuf,
}

impl WatchPaths {
    pub fn for_log(log_path: &Path) -> Self {
        let mut wal = log_path.as_os_str().to_owned();
        wal.push("-wal");
        Self {
            store: log_path.to_path_buf(),
            wal: PathBuf::from(wal),
        }
    }
}

struct ArmedSources {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    // Dropping a watcher unregisters it.
    watchers: Vec<RecommendedWatcher>,
    pre_signal: Option<Arc<dyn PreSignal>>,
    wake: WakeHandle,
    sources: Vec<TriggerSource>,
}

pub struct TriggerFanIn {
    config: TriggerConfig,
    armed: Option<ArmedSources>,
}

impl TriggerFanIn {
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            config,
            armed: None,
        }
    }

    /// Arm every available source. Each debounced burst sends one `()` on
    /// `checks`. Returns false, changing nothing, when already armed.
    pub fn arm(
        &mut self,
        paths: &WatchPaths,
        pre_signal: Option<Arc<dyn PreSignal>>,
        checks: mpsc::Sender<()>,
    ) -> bool {
        if self.armed.is_some() {
            log_debug!("triggers already armed; ignoring");
            return false;
        }

        let cancel = CancellationToken::new();
        let (wake_tx, wake_rx) = mpsc::channel(WAKE_CHANNEL_CAPACITY);
        let wake = WakeHandle { tx: wake_tx };

        let mut tasks = Vec::new();
        let mut sources = Vec::new();

        tasks.push(tokio::spawn(debounce_loop(
            wake_rx,
            self.config.debounce,
            checks,
            cancel.clone(),
        )));

        tasks.push(tokio::spawn(poll_loop(
            wake.clone(),
            self.config.poll_interval,
            cancel.clone(),
        )));
        sources.push(TriggerSource::Poll);

        let mut watchers = Vec::new();
        if self.config.watch_store {
            if let Some(watcher) =
                watchers::watch_file(&paths.store, TriggerSource::Store, wake.clone())
            {
                watchers.push(watcher);
                sources.push(TriggerSource::Store);
            }
        }
        if self.config.watch_wal {
            if let Some(watcher) =
                watchers::watch_file(&paths.wal, TriggerSource::WriteAheadLog, wake.clone())
            {
                watchers.push(watcher);
                sources.push(TriggerSource::WriteAheadLog);
            }
        }

        let pre_signal = match pre_signal {
            Some(signal) => match signal.arm(wake.clone()) {
                Ok(()) => {
                    sources.push(TriggerSource::PreSignal);
                    Some(signal)
                }
                Err(err) => {
                    log_warn!("pre-signal unavailable: {err:#}");
                    None
                }
            },
            None => None,
        };

        log_info!("triggers armed: {sources:?}");

        self.armed = Some(ArmedSources {
            cancel,
            tasks,
            watchers,
            pre_signal,
            wake,
            sources,
        });
        true
    }

    /// Cancel every source and the pending debounce. No-op when not armed.
    pub fn disarm(&mut self) {
        let Some(armed) = self.armed.take() else {
            return;
        };

        armed.cancel.cancel();
        for task in armed.tasks {
            task.abort();
        }
        if let Some(signal) = armed.pre_signal {
            signal.disarm();
        }
        drop(armed.watchers);

        log_info!("triggers disarmed");
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    pub fn armed_sources(&self) -> Vec<TriggerSource> {
        self.armed
            .as_ref()
            .map(|armed| armed.sources.clone())
            .unwrap_or_default()
    }

    pub fn wake_handle(&self) -> Option<WakeHandle> {
        self.armed.as_ref().map(|armed| armed.wake.clone())
    }
}

impl Drop for TriggerFanIn {
    fn drop(&mut self) {
        self.disarm();
    }
}

async fn poll_loop(wake: WakeHandle, every: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => wake.wake(TriggerSource::Poll),
            _ = cancel.cancelled() => break,
        }
    }
}
