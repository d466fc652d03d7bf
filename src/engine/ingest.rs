use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::decoder::RecordDecoder;
use crate::log_access::{self, LogAccess};
use crate::models::{Cursor, Notification, RawRecord};
use crate::queue::PresentationQueue;
use crate::triggers::{TriggerSource, WakeHandle};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IngestExit {
    Cancelled,
    AccessLost,
}

/// The single consumer of debounced checks. Owns the cursor, so reads are
/// serial and the cursor only moves forward.
pub(crate) struct Ingest {
    pub log: LogAccess,
    pub decoder: Arc<RecordDecoder>,
    pub queue: PresentationQueue,
    pub cursor: Cursor,
    pub batch_size: usize,
    pub checks: mpsc::Receiver<()>,
    pub wake: Option<WakeHandle>,
    pub cancel: CancellationToken,
}

impl Ingest {
    pub async fn run(mut self) -> IngestExit {
        log_debug!("ingest loop started at cursor {}", self.cursor.position());

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return IngestExit::Cancelled,
                check = self.checks.recv() => {
                    if check.is_none() {
                        return IngestExit::Cancelled;
                    }
                }
            }

            if let Some(exit) = self.check_once().await {
                return exit;
            }
        }
    }

    async fn check_once(&mut self) -> Option<IngestExit> {
        // An open connection keeps reading a log that was moved away, so
        // absence of the path is checked on every pass.
        if !self.log.path().exists() {
            log_warn!("notification log disappeared from {}", self.log.path().display());
            return Some(IngestExit::AccessLost);
        }

        let records = self
            .log
            .read_since(self.cursor.position(), self.batch_size)
            .await;

        if records.is_empty() {
            if self.log.consecutive_failures() > 0 && !self.still_readable().await {
                return Some(IngestExit::AccessLost);
            }
            return None;
        }

        let full_batch = records.len() >= self.batch_size;
        let cursor = &mut self.cursor;
        let fresh: Vec<RawRecord> = records
            .into_iter()
            .filter(|record| cursor.advance(record.id))
            .collect();

        let notifications = self.decode(fresh).await;
        if !notifications.is_empty() {
            let offered = notifications.len();
            let admitted = self.queue.admit_batch(notifications, false).await;
            log_debug!(
                "{admitted}/{offered} notification(s) admitted; cursor at {}",
                self.cursor.position()
            );
        }

        if full_batch {
            if let Some(wake) = &self.wake {
                wake.wake(TriggerSource::CatchUp);
            }
        }
        None
    }

    async fn decode(&self, records: Vec<RawRecord>) -> Vec<Notification> {
        if records.is_empty() {
            return Vec::new();
        }
        let decoder = self.decoder.clone();
        let decoded = tokio::task::spawn_blocking(move || {
            records
                .iter()
                .filter_map(|record| decoder.decode(record))
                .collect::<Vec<_>>()
        })
        .await;

        match decoded {
            Ok(notifications) => notifications,
            Err(err) => {
                log_error!("decode task failed: {err}");
                Vec::new()
            }
        }
    }

    async fn still_readable(&self) -> bool {
        let path = self.log.path().to_path_buf();
        matches!(
            tokio::task::spawn_blocking(move || log_access::probe(&path)).await,
            Ok(Ok(()))
        )
    }
}
