//! Tracks whether the notification log is readable and drives the retry loop
//! that restarts ingestion once it is.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::log_access::{self, AccessError};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessState {
    /// Not probed yet
    Unknown,
    Granted,
    Denied,
}

struct Recovery {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct MonitorInner {
    path: PathBuf,
    state: watch::Sender<AccessState>,
    recovery: Mutex<Option<Recovery>>,
}

#[derive(Clone)]
pub struct AccessMonitor {
    inner: Arc<MonitorInner>,
}

impl AccessMonitor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (state, _) = watch::channel(AccessState::Unknown);
        Self {
            inner: Arc::new(MonitorInner {
                path: path.into(),
                state,
                recovery: Mutex::new(None),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Open the log, run a trivial query and record the outcome. Runs on the
    /// blocking pool.
    pub async fn probe(&self) -> bool {
        let path = self.inner.path.clone();
        let outcome = tokio::task::spawn_blocking(move || log_access::probe(&path)).await;

        let granted = match outcome {
            Ok(Ok(())) => true,
            Ok(Err(AccessError::Missing(path))) => {
                log_debug!("probe: no log at {}", path.display());
                false
            }
            Ok(Err(err)) => {
                log_debug!("probe failed: {err}");
                false
            }
            Err(join_err) => {
                log_warn!("access probe task failed: {join_err}");
                false
            }
        };
        self.mark(granted);
        granted
    }

    /// Record an access observation made elsewhere. Returns true when the
    /// state changed.
    pub fn mark(&self, granted: bool) -> bool {
        let next = if granted {
            AccessState::Granted
        } else {
            AccessState::Denied
        };
        let changed = self.inner.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            log_info!("notification log access: {next:?}");
        }
        changed
    }

    pub fn state(&self) -> AccessState {
        *self.inner.state.borrow()
    }

    pub fn has_access(&self) -> bool {
        self.state() == AccessState::Granted
    }

    pub fn subscribe(&self) -> watch::Receiver<AccessState> {
        self.inner.state.subscribe()
    }

    /// Re-probe every `interval` until access returns and `on_granted`
    /// reports the pipeline running, or until `wants` says retrying is
    /// pointless. Returns false, changing nothing, when a loop is already live.
    pub fn arm_recovery<W, G, Fut>(&self, interval: Duration, wants: W, on_granted: G) -> bool
    where
        W: Fn() -> bool + Send + Sync + 'static,
        G: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let mut slot = self.recovery_slot();
        if slot.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            log_debug!("recovery already armed");
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(recovery_loop(
            self.clone(),
            interval,
            wants,
            on_granted,
            cancel.clone(),
        ));
        *slot = Some(Recovery { cancel, handle });
        log_info!("access recovery armed (every {interval:?})");
        true
    }

    pub fn disarm_recovery(&self) {
        if let Some(recovery) = self.recovery_slot().take() {
            recovery.cancel.cancel();
            recovery.handle.abort();
            log_debug!("access recovery disarmed");
        }
    }

    pub fn recovery_armed(&self) -> bool {
        self.recovery_slot()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    fn recovery_slot(&self) -> MutexGuard<'_, Option<Recovery>> {
        self.inner
            .recovery
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn recovery_loop<W, G, Fut>(
    monitor: AccessMonitor,
    interval: Duration,
    wants: W,
    on_granted: G,
    cancel: CancellationToken,
) where
    W: Fn() -> bool,
    G: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if !wants() {
            log_info!("access recovery stopped: monitoring no longer wanted");
            return;
        }
        if !monitor.probe().await {
            continue;
        }
        if on_granted().await {
            log_info!("access recovered; ingestion resumed");
            return;
        }
        log_warn!("access granted but ingestion did not start; retrying");
    }
}
