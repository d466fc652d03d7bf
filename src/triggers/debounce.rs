use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::TriggerSource;

/// Collapse wake-ups into checks: every wake pushes the deadline out by
/// `quiet`; when the deadline passes with no further wake, one check is sent.
///
/// `checks` is expected to have capacity 1. If a check is already queued the
/// consumer has not started on it yet, so dropping the new one loses nothing.
pub async fn debounce_loop(
    mut wakes: mpsc::Receiver<TriggerSource>,
    quiet: Duration,
    checks: mpsc::Sender<()>,
    cancel: CancellationToken,
) {
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            wake = wakes.recv() => match wake {
                Some(source) => {
                    log::trace!("wake from {source:?}; check rescheduled");
                    deadline = Some(Instant::now() + quiet);
                }
                None => break,
            },
            _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                match checks.try_send(()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(())) => {
                        log::trace!("check already pending; coalesced");
                    }
                    Err(mpsc::error::TrySendError::Closed(())) => break,
                }
            }
        }
    }
}
