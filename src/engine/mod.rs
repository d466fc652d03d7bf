//! The notification engine: wires log access, triggers, decoding and the
//! presentation queue together behind start/stop.

mod ingest;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::access::{AccessMonitor, AccessState};
use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use crate::decoder::{RecordDecoder, SeenSender, SeenSenders};
use crate::log_access::LogAccess;
use crate::models::{Cursor, Notification, NotificationId, NotificationText, Origin};
use crate::platform;
use crate::queue::{PresentationQueue, QueueTiming};
use crate::triggers::{TriggerConfig, TriggerFanIn, WatchPaths};

use ingest::{Ingest, IngestExit};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Sender name shown on banners injected by in-process features.
pub const SYNTHETIC_SOURCE_NAME: &str = "Notif HUD";

struct Pipeline {
    generation: u64,
    log: LogAccess,
    triggers: TriggerFanIn,
    ingest: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Pipeline {
    async fn shutdown(mut self) {
        self.cancel.cancel();
        self.triggers.disarm();
        self.ingest.abort();

        let log = self.log;
        if let Err(err) = tokio::task::spawn_blocking(move || log.close()).await {
            log_error!("failed to close notification log: {err}");
        }
    }
}

struct EngineInner {
    config: EngineConfig,
    collaborators: Collaborators,
    queue: PresentationQueue,
    decoder: Arc<RecordDecoder>,
    access: AccessMonitor,
    /// Monitoring was requested and not stopped since.
    wanted: AtomicBool,
    generations: AtomicU64,
    pipeline: Mutex<Option<Pipeline>>,
}

impl EngineInner {
    fn wants_monitoring(&self) -> bool {
        self.wanted.load(Ordering::SeqCst) && self.collaborators.settings.feature_active()
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.access.disarm_recovery();
        if let Some(pipeline) = self.pipeline.get_mut().take() {
            pipeline.cancel.cancel();
            pipeline.ingest.abort();
        }
    }
}

/// Owned by the application's composition root. Cheap to clone; clones share
/// one engine.
#[derive(Clone)]
pub struct NotificationEngine {
    inner: Arc<EngineInner>,
}

impl NotificationEngine {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        let queue = PresentationQueue::new(
            &collaborators,
            QueueTiming {
                auto_dismiss: config.auto_dismiss(),
                settle_delay: config.settle_delay(),
            },
        );
        let decoder = RecordDecoder::new(
            config.ignore_list(),
            collaborators.registry.clone(),
            SeenSenders::new(),
        );
        let access = AccessMonitor::new(config.log_path.clone());

        Self {
            inner: Arc::new(EngineInner {
                config,
                collaborators,
                queue,
                decoder: Arc::new(decoder),
                access,
                wanted: AtomicBool::new(false),
                generations: AtomicU64::new(0),
                pipeline: Mutex::new(None),
            }),
        }
    }

    fn from_weak(weak: &Weak<EngineInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // ---- lifecycle ----

    /// Probe access and, when readable, open the log at its latest record and
    /// arm every trigger. Without access a recovery loop keeps retrying.
    /// Calling this while running is a no-op.
    pub async fn start_monitoring(&self) {
        self.inner.wanted.store(true, Ordering::SeqCst);

        if !self.inner.collaborators.settings.feature_active() {
            log_info!("start requested but notification capture is disabled");
            return;
        }

        let mut slot = self.inner.pipeline.lock().await;
        if slot.is_some() {
            log_debug!("monitoring already running");
            return;
        }

        if !self.inner.access.probe().await {
            drop(slot);
            log_warn!(
                "no access to notification log at {}",
                self.inner.config.log_path.display()
            );
            self.arm_recovery();
            return;
        }

        if let Err(err) = self.start_pipeline(&mut slot).await {
            drop(slot);
            log_warn!("failed to start monitoring: {err:#}");
            self.inner.access.mark(false);
            self.arm_recovery();
        }
    }

    /// Tear down triggers, close the log, cancel every timer and empty the
    /// queue. Safe before start and when called repeatedly.
    pub async fn stop_monitoring(&self) {
        self.inner.wanted.store(false, Ordering::SeqCst);
        self.inner.access.disarm_recovery();

        let pipeline = self.inner.pipeline.lock().await.take();
        match pipeline {
            Some(pipeline) => {
                pipeline.shutdown().await;
                log_info!("monitoring stopped");
            }
            None => log_debug!("stop requested while not monitoring"),
        }

        self.inner.queue.dismiss_all().await;
    }

    /// Probe now. Starts ingestion when access came back, tears it down when
    /// access went away. Returns the probe result.
    pub async fn recheck_access(&self) -> bool {
        let granted = self.inner.access.probe().await;
        let mut slot = self.inner.pipeline.lock().await;

        if granted {
            if slot.is_none() && self.inner.wants_monitoring() {
                match self.start_pipeline(&mut slot).await {
                    Ok(()) => self.inner.access.disarm_recovery(),
                    Err(err) => log_warn!("access granted but start failed: {err:#}"),
                }
            }
            return granted;
        }

        let running = slot.take();
        drop(slot);
        if let Some(pipeline) = running {
            pipeline.shutdown().await;
            log_warn!("lost access to notification log; ingestion paused");
        }
        if self.inner.wants_monitoring() {
            self.arm_recovery();
        }
        granted
    }

    /// The host application came to the foreground.
    pub async fn on_host_focus(&self) {
        self.recheck_access().await;
    }

    /// Settings changed outside the engine. Enabling starts monitoring;
    /// disabling stops it and clears the queue.
    pub async fn on_settings_changed(&self) {
        if self.inner.collaborators.settings.feature_active() {
            self.start_monitoring().await;
        } else if self.inner.wanted.load(Ordering::SeqCst) || self.is_monitoring().await {
            log_info!("notification capture disabled");
            self.stop_monitoring().await;
        }
    }

    pub fn open_access_settings(&self) -> Result<()> {
        platform::open_access_settings()
    }

    async fn start_pipeline(&self, slot: &mut Option<Pipeline>) -> Result<()> {
        let config = &self.inner.config;
        let path = config.log_path.clone();
        let log = tokio::task::spawn_blocking(move || LogAccess::open(&path))
            .await
            .context("log open task failed")??;
        let latest = log
            .latest_id()
            .await
            .context("failed to read latest record id")?;

        let (checks_tx, checks_rx) = mpsc::channel(1);
        let mut triggers = TriggerFanIn::new(TriggerConfig {
            poll_interval: config.poll_interval(),
            debounce: config.debounce(),
            watch_store: config.watch_store,
            watch_wal: config.watch_wal,
        });
        triggers.arm(
            &WatchPaths::for_log(&config.log_path),
            self.inner.collaborators.pre_signal.clone(),
            checks_tx,
        );

        let generation = self.inner.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let ingest = Ingest {
            log: log.clone(),
            decoder: self.inner.decoder.clone(),
            queue: self.inner.queue.clone(),
            cursor: Cursor::at(latest),
            batch_size: config.batch_size.max(1),
            checks: checks_rx,
            wake: triggers.wake_handle(),
            cancel: cancel.clone(),
        };

        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            if ingest.run().await == IngestExit::AccessLost {
                if let Some(engine) = Self::from_weak(&weak) {
                    tokio::spawn(engine.handle_access_lost(generation));
                }
            }
        });

        *slot = Some(Pipeline {
            generation,
            log,
            triggers,
            ingest: handle,
            cancel,
        });
        self.inner.access.mark(true);
        log_info!("monitoring started from record {latest}");
        Ok(())
    }

    // Boxed: this future restarts the pipeline that spawns it.
    fn handle_access_lost(self, generation: u64) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            let pipeline = {
                let mut slot = self.inner.pipeline.lock().await;
                match slot.as_ref() {
                    Some(pipeline) if pipeline.generation == generation => slot.take(),
                    _ => None,
                }
            };
            let Some(pipeline) = pipeline else {
                return;
            };
            self.inner.access.mark(false);
            pipeline.shutdown().await;
            log_warn!("lost access to notification log; ingestion paused");

            if self.inner.wants_monitoring() {
                self.arm_recovery();
            }
        })
    }

    fn arm_recovery(&self) {
        let weak = Arc::downgrade(&self.inner);
        let wants = {
            let weak = weak.clone();
            move || weak.upgrade().is_some_and(|inner| inner.wants_monitoring())
        };
        let on_granted = move || {
            let weak = weak.clone();
            async move {
                match Self::from_weak(&weak) {
                    Some(engine) => engine.resume_after_recovery().await,
                    None => true,
                }
            }
        };
        self.inner
            .access
            .arm_recovery(self.inner.config.recovery_interval(), wants, on_granted);
    }

    /// True once nothing is left for the recovery loop to do.
    async fn resume_after_recovery(&self) -> bool {
        let mut slot = self.inner.pipeline.lock().await;
        if slot.is_some() || !self.inner.wants_monitoring() {
            return true;
        }
        match self.start_pipeline(&mut slot).await {
            Ok(()) => true,
            Err(err) => {
                log_warn!("restart after recovery failed: {err:#}");
                false
            }
        }
    }

    // ---- actions ----

    pub async fn dismiss_current_only(&self) {
        self.inner.queue.dismiss_current().await;
    }

    pub async fn dismiss_all(&self) {
        self.inner.queue.dismiss_all().await;
    }

    pub async fn set_user_interacting(&self, interacting: bool) {
        self.inner.queue.set_user_interacting(interacting).await;
    }

    /// Show a banner that did not come from the log. Bypasses the enabled and
    /// suppression gates; chimes only when asked to.
    pub async fn inject_synthetic(
        &self,
        title: Option<String>,
        subtitle: Option<String>,
        body: Option<String>,
        play_chime: bool,
    ) -> NotificationId {
        let notification = Notification::new(
            self.inner.config.own_identifier.clone(),
            SYNTHETIC_SOURCE_NAME,
            NotificationText {
                title,
                subtitle,
                body,
            },
            None,
            Origin::Synthetic,
        );
        let id = notification.id();
        self.inner.queue.admit(notification, true).await;

        if play_chime && self.inner.collaborators.settings.chime_enabled() {
            self.inner.collaborators.presenter.play_chime();
        }
        id
    }

    /// Bring the sender of the shown notification forward, then dismiss it.
    pub async fn activate_current(&self) -> Result<()> {
        let Some(shown) = self.inner.queue.current_unredacted().await else {
            return Ok(());
        };

        if !shown.is_synthetic() {
            let registry = self.inner.collaborators.registry.clone();
            let identifier = shown.source_id.clone();
            tokio::task::spawn_blocking(move || {
                if let Some(running) = registry.running_process(&identifier) {
                    log::debug!("activating {} (pid {})", running.identifier, running.pid);
                }
                registry.activate(&identifier)
            })
            .await
            .context("activation task failed")??;
        }

        self.inner.queue.dismiss_current().await;
        Ok(())
    }

    pub async fn resume_backlog(&self) {
        self.inner.queue.resume_backlog().await;
    }

    // ---- observables ----

    pub async fn current_notification(&self) -> Option<Notification> {
        self.inner.queue.current().await
    }

    pub async fn queue_count(&self) -> usize {
        self.inner.queue.queue_count().await
    }

    pub fn has_access(&self) -> bool {
        self.inner.access.has_access()
    }

    pub fn access_state(&self) -> AccessState {
        self.inner.access.state()
    }

    pub fn subscribe_access(&self) -> watch::Receiver<AccessState> {
        self.inner.access.subscribe()
    }

    pub fn seen_senders(&self) -> Vec<SeenSender> {
        self.inner.decoder.seen_senders().snapshot()
    }

    pub async fn is_monitoring(&self) -> bool {
        self.inner.pipeline.lock().await.is_some()
    }

    pub fn recovery_armed(&self) -> bool {
        self.inner.access.recovery_armed()
    }

    #[cfg(test)]
    async fn log_reads(&self) -> Option<u64> {
        self.inner
            .pipeline
            .lock()
            .await
            .as_ref()
            .map(|pipeline| pipeline.log.reads())
    }

    #[cfg(test)]
    async fn wake_handle(&self) -> Option<crate::triggers::WakeHandle> {
        self.inner
            .pipeline
            .lock()
            .await
            .as_ref()
            .and_then(|pipeline| pipeline.triggers.wake_handle())
    }
}
