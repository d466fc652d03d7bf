//! The presentation queue: one shown banner, a FIFO backlog, and the timers
//! that move between them.

mod deferred;
pub mod state;

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::collaborators::{
    Collaborators, Geometry, Presenter, SettingsSource, Suppression, SurfaceKind,
};
use crate::models::Notification;

pub use deferred::{DeferredTasks, TimerKey};
pub use state::{Admission, Dismissal, QueuePhase, QueueState};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

#[derive(Debug, Clone, Copy)]
pub struct QueueTiming {
    pub auto_dismiss: Duration,
    pub settle_delay: Duration,
}

impl Default for QueueTiming {
    fn default() -> Self {
        Self {
            auto_dismiss: Duration::from_secs(5),
            settle_delay: Duration::from_millis(250),
        }
    }
}

struct QueueCore {
    state: QueueState,
    timers: DeferredTasks,
}

struct QueueInner {
    core: Mutex<QueueCore>,
    timing: QueueTiming,
    presenter: Arc<dyn Presenter>,
    geometry: Arc<dyn Geometry>,
    suppression: Arc<dyn Suppression>,
    settings: Arc<dyn SettingsSource>,
}

/// Owns [`QueueState`] and every timer that mutates it. All mutation happens
/// under one lock, and presenter calls are made while holding it so the
/// presenter sees show/hide in the same order the state changed.
#[derive(Clone)]
pub struct PresentationQueue {
    inner: Arc<QueueInner>,
}

impl PresentationQueue {
    pub fn new(collaborators: &Collaborators, timing: QueueTiming) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                core: Mutex::new(QueueCore {
                    state: QueueState::new(),
                    timers: DeferredTasks::default(),
                }),
                timing,
                presenter: collaborators.presenter.clone(),
                geometry: collaborators.geometry.clone(),
                suppression: collaborators.suppression.clone(),
                settings: collaborators.settings.clone(),
            }),
        }
    }

    fn from_weak(weak: &Weak<QueueInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Admit a batch in arrival order. Unless `bypass_gates`, the whole batch
    /// is dropped when the feature is off or suppression is active; both are
    /// read fresh for every batch. Returns how many were admitted.
    pub async fn admit_batch(&self, batch: Vec<Notification>, bypass_gates: bool) -> usize {
        if batch.is_empty() {
            return 0;
        }

        if !bypass_gates {
            if !self.inner.settings.feature_active() {
                log_debug!("dropping {} notification(s): feature disabled", batch.len());
                return 0;
            }
            if self.inner.suppression.is_active() {
                log_debug!("dropping {} notification(s): suppression active", batch.len());
                return 0;
            }
        }

        let mut core = self.inner.core.lock().await;
        let mut admitted = 0;
        for notification in batch {
            let surface_busy = core.state.slot_free() && self.inner.presenter.is_visible();
            let id = notification.id();
            match core.state.admit(notification, surface_busy) {
                Admission::ShowNow => {
                    if let Some(shown) = core.state.current().cloned() {
                        self.present(&shown);
                    }
                    self.arm_auto_dismiss(&mut core);
                    log_debug!("notification {id} shown immediately");
                }
                Admission::Backlogged(position) => {
                    log_debug!("notification {id} queued at position {position}");
                }
            }
            admitted += 1;
        }
        if core.state.is_blocked() && !core.timers.is_scheduled(TimerKey::Resume) {
            self.schedule_resume(&mut core);
        }
        admitted
    }

    pub async fn admit(&self, notification: Notification, bypass_gates: bool) -> bool {
        self.admit_batch(vec![notification], bypass_gates).await == 1
    }

    /// Hide the shown banner; the backlog head follows after the settle delay.
    pub async fn dismiss_current(&self) {
        let mut core = self.inner.core.lock().await;
        self.dismiss_locked(&mut core);
    }

    /// Force reset: no timers, nothing shown, nothing waiting.
    pub async fn dismiss_all(&self) {
        let mut core = self.inner.core.lock().await;
        core.timers.cancel_all();
        let dropped = core.state.waiting();
        core.state.clear();
        self.inner.presenter.dismiss();
        if dropped > 0 {
            log_info!("dismissed all; dropped {dropped} queued notification(s)");
        }
    }

    /// The presenter reports the user engaging with (or leaving) the banner.
    /// Either way the auto-dismiss countdown restarts on the same timer.
    pub async fn set_user_interacting(&self, interacting: bool) {
        let mut core = self.inner.core.lock().await;
        core.state.user_interacting = interacting;
        if core.state.current().is_some() {
            self.arm_auto_dismiss(&mut core);
        }
    }

    /// Show the backlog head if the slot is free and no other surface is up.
    /// While one is, the resume timer keeps retrying on its own.
    pub async fn resume_backlog(&self) {
        let mut core = self.inner.core.lock().await;
        self.resume_locked(&mut core);
    }

    /// The shown notification, redacted when previews are off.
    pub async fn current(&self) -> Option<Notification> {
        let core = self.inner.core.lock().await;
        core.state.current().map(|n| self.for_display(n))
    }

    /// The shown notification as captured, for activation.
    pub(crate) async fn current_unredacted(&self) -> Option<Notification> {
        self.inner.core.lock().await.state.current().cloned()
    }

    pub async fn queue_count(&self) -> usize {
        self.inner.core.lock().await.state.waiting()
    }

    pub async fn phase(&self) -> QueuePhase {
        self.inner.core.lock().await.state.phase()
    }

    pub async fn backlog(&self) -> Vec<Notification> {
        let core = self.inner.core.lock().await;
        core.state.backlog().map(|n| self.for_display(n)).collect()
    }

    pub async fn live_timers(&self) -> usize {
        self.inner.core.lock().await.timers.live_count()
    }

    fn for_display(&self, notification: &Notification) -> Notification {
        if self.inner.settings.show_preview() {
            notification.clone()
        } else {
            notification.redacted()
        }
    }

    fn present(&self, notification: &Notification) {
        let kind = if notification.is_synthetic() {
            SurfaceKind::Reminder
        } else {
            SurfaceKind::Notification
        };
        self.inner
            .presenter
            .show(kind, &self.for_display(notification));
    }

    fn dismiss_locked(&self, core: &mut QueueCore) {
        core.timers.cancel(TimerKey::AutoDismiss);
        match core.state.begin_dismiss() {
            Dismissal::Advance => {
                self.inner.presenter.dismiss();
                self.schedule_settle(core);
            }
            Dismissal::Cleared => self.inner.presenter.dismiss(),
            Dismissal::Nothing => log::trace!("dismiss with nothing shown"),
        }
    }

    fn resume_locked(&self, core: &mut QueueCore) {
        if !core.state.is_blocked() {
            return;
        }
        if self.inner.presenter.is_visible() {
            self.schedule_resume(core);
            return;
        }
        core.timers.cancel(TimerKey::Resume);
        if let Some(next) = core.state.promote_head().cloned() {
            self.present(&next);
            self.arm_auto_dismiss(core);
        }
    }

    fn arm_auto_dismiss(&self, core: &mut QueueCore) {
        let generation = core.timers.reserve(TimerKey::AutoDismiss);
        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.timing.auto_dismiss;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(queue) = Self::from_weak(&weak) {
                queue.on_auto_dismiss(generation).await;
            }
        });
        core.timers.attach(TimerKey::AutoDismiss, generation, handle);
    }

    async fn on_auto_dismiss(&self, generation: u64) {
        let mut core = self.inner.core.lock().await;
        if !core.timers.is_current(TimerKey::AutoDismiss, generation) {
            return;
        }
        core.timers.finish(TimerKey::AutoDismiss, generation);

        let Some(shown) = core.state.current().cloned() else {
            return;
        };

        // Geometry is authoritative when it can answer; a stale interaction
        // flag is overwritten by it on every tick.
        let engaged = self
            .inner
            .geometry
            .pointer_in_zone(&shown)
            .unwrap_or(core.state.user_interacting);
        core.state.user_interacting = engaged;

        if engaged {
            log::trace!("pointer on banner; auto-dismiss postponed");
            self.arm_auto_dismiss(&mut core);
        } else {
            self.dismiss_locked(&mut core);
        }
    }

    fn schedule_settle(&self, core: &mut QueueCore) {
        let generation = core.timers.reserve(TimerKey::Settle);
        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.timing.settle_delay;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(queue) = Self::from_weak(&weak) {
                queue.on_settled(generation).await;
            }
        });
        core.timers.attach(TimerKey::Settle, generation, handle);
    }

    fn schedule_resume(&self, core: &mut QueueCore) {
        let generation = core.timers.reserve(TimerKey::Resume);
        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.timing.settle_delay;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(queue) = Self::from_weak(&weak) {
                queue.on_resume(generation).await;
            }
        });
        core.timers.attach(TimerKey::Resume, generation, handle);
    }

    async fn on_resume(&self, generation: u64) {
        let mut core = self.inner.core.lock().await;
        if !core.timers.is_current(TimerKey::Resume, generation) {
            return;
        }
        core.timers.finish(TimerKey::Resume, generation);
        self.resume_locked(&mut core);
    }

    async fn on_settled(&self, generation: u64) {
        let mut core = self.inner.core.lock().await;
        if !core.timers.is_current(TimerKey::Settle, generation) {
            return;
        }
        core.timers.finish(TimerKey::Settle, generation);

        if let Some(next) = core.state.complete_advance().cloned() {
            self.present(&next);
            self.arm_auto_dismiss(&mut core);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotificationText, Origin};
    use crate::test_support::{notification, Harness, PresenterEvent};
    use tokio::time::sleep;

    fn queue(harness: &Harness) -> PresentationQueue {
        PresentationQueue::new(&harness.collaborators(), QueueTiming::default())
    }

    async fn current_title(queue: &PresentationQueue) -> Option<String> {
        queue.current().await.and_then(|n| n.title)
    }

    async fn backlog_titles(queue: &PresentationQueue) -> Vec<String> {
        queue
            .backlog()
            .await
            .into_iter()
            .filter_map(|n| n.title)
            .collect()
    }

    fn show(title: &str) -> PresenterEvent {
        PresenterEvent::Show(SurfaceKind::Notification, Some(title.to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn second_admission_waits_then_follows_after_settle() {
        let harness = Harness::new();
        let queue = queue(&harness);

        queue.admit(notification("A"), false).await;
        queue.admit(notification("B"), false).await;
        assert_eq!(current_title(&queue).await.as_deref(), Some("A"));
        assert_eq!(backlog_titles(&queue).await, vec!["B"]);
        assert_eq!(queue.phase().await, QueuePhase::ShowingWithBacklog);

        queue.dismiss_current().await;
        assert!(queue.current().await.is_none());
        assert_eq!(queue.phase().await, QueuePhase::Advancing);
        assert_eq!(
            harness.presenter.events(),
            vec![show("A"), PresenterEvent::Dismiss]
        );

        sleep(Duration::from_millis(260)).await;
        assert_eq!(current_title(&queue).await.as_deref(), Some("B"));
        assert!(backlog_titles(&queue).await.is_empty());
        assert_eq!(harness.presenter.shown_titles(), vec!["A", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn backlog_is_fifo_without_dedup() {
        let harness = Harness::new();
        let queue = queue(&harness);
        let batch = ["1", "2", "3", "2", "4"].map(notification).to_vec();
        assert_eq!(queue.admit_batch(batch, false).await, 5);

        assert_eq!(current_title(&queue).await.as_deref(), Some("1"));
        assert_eq!(backlog_titles(&queue).await, vec!["2", "3", "2", "4"]);
        assert_eq!(queue.queue_count().await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_admissions_show_exactly_one() {
        let harness = Harness::new();
        let queue = queue(&harness);

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.admit(notification(&i.to_string()), false).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap());
        }

        assert_eq!(harness.presenter.shown_titles().len(), 1);
        assert!(queue.current().await.is_some());
        assert_eq!(queue.queue_count().await, 19);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_dismiss_fires_when_pointer_is_away() {
        let harness = Harness::new();
        harness.geometry.set(Some(false));
        let queue = queue(&harness);

        queue.admit(notification("A"), false).await;
        sleep(Duration::from_millis(4_900)).await;
        assert!(queue.current().await.is_some());

        sleep(Duration::from_millis(200)).await;
        assert!(queue.current().await.is_none());
        assert_eq!(queue.phase().await, QueuePhase::Idle);
        assert_eq!(queue.live_timers().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_dismiss_reschedules_while_pointer_is_on_banner() {
        let harness = Harness::new();
        harness.geometry.set(Some(true));
        let queue = queue(&harness);

        queue.admit(notification("A"), false).await;
        sleep(Duration::from_millis(12_000)).await;
        assert_eq!(current_title(&queue).await.as_deref(), Some("A"));
        assert_eq!(queue.live_timers().await, 1);

        harness.geometry.set(Some(false));
        sleep(Duration::from_millis(5_100)).await;
        assert!(queue.current().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_interaction_flag_is_healed_by_geometry() {
        let harness = Harness::new();
        harness.geometry.set(Some(false));
        let queue = queue(&harness);

        queue.admit(notification("A"), false).await;
        queue.set_user_interacting(true).await;
        sleep(Duration::from_millis(5_100)).await;
        assert!(queue.current().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn interaction_flag_holds_when_geometry_is_unknown() {
        let harness = Harness::new();
        let queue = queue(&harness);

        queue.admit(notification("A"), false).await;
        queue.set_user_interacting(true).await;
        sleep(Duration::from_millis(11_000)).await;
        assert!(queue.current().await.is_some());

        queue.set_user_interacting(false).await;
        sleep(Duration::from_millis(4_000)).await;
        assert!(queue.current().await.is_some());
        sleep(Duration::from_millis(1_100)).await;
        assert!(queue.current().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_pending_timer() {
        let harness = Harness::new();
        let queue = queue(&harness);

        queue.admit(notification("A"), false).await;
        sleep(Duration::from_millis(3_000)).await;
        queue.set_user_interacting(false).await;
        assert_eq!(queue.live_timers().await, 1);

        // the original 5s deadline passes without effect
        sleep(Duration::from_millis(2_500)).await;
        assert!(queue.current().await.is_some());

        sleep(Duration::from_millis(2_600)).await;
        assert!(queue.current().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn admission_during_advance_queues_behind_the_pending_item() {
        let harness = Harness::new();
        let queue = queue(&harness);

        queue.admit(notification("A"), false).await;
        queue.admit(notification("B"), false).await;
        queue.dismiss_current().await;
        sleep(Duration::from_millis(100)).await;
        queue.admit(notification("C"), false).await;
        assert_eq!(queue.queue_count().await, 2);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(current_title(&queue).await.as_deref(), Some("B"));
        assert_eq!(backlog_titles(&queue).await, vec!["C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn gates_are_checked_per_batch() {
        let harness = Harness::new();
        let queue = queue(&harness);

        harness.settings.set_enabled(false);
        assert_eq!(queue.admit_batch(vec![notification("off")], false).await, 0);

        harness.settings.set_enabled(true);
        harness.suppression.set(true);
        assert_eq!(queue.admit_batch(vec![notification("dnd")], false).await, 0);
        assert!(queue.current().await.is_none());

        assert!(queue.admit(notification("bypass"), true).await);
        assert_eq!(current_title(&queue).await.as_deref(), Some("bypass"));

        harness.suppression.set(false);
        assert!(queue.admit(notification("after"), false).await);
        assert_eq!(backlog_titles(&queue).await, vec!["after"]);
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_all_cancels_timers_and_empties_queue() {
        let harness = Harness::new();
        let queue = queue(&harness);

        queue.admit(notification("A"), false).await;
        queue.admit(notification("B"), false).await;
        queue.admit(notification("C"), false).await;
        queue.dismiss_current().await;
        queue.dismiss_all().await;

        assert_eq!(queue.live_timers().await, 0);
        sleep(Duration::from_secs(20)).await;
        assert!(queue.current().await.is_none());
        assert_eq!(queue.queue_count().await, 0);
        assert_eq!(harness.presenter.shown_titles(), vec!["A"]);
        assert_eq!(harness.presenter.events().last(), Some(&PresenterEvent::Dismiss));
    }

    #[tokio::test(start_paused = true)]
    async fn competing_surface_defers_until_resumed() {
        let harness = Harness::new();
        let queue = queue(&harness);

        harness.presenter.set_competing(true);
        queue.admit(notification("A"), false).await;
        assert!(queue.current().await.is_none());
        assert_eq!(queue.queue_count().await, 1);

        queue.resume_backlog().await;
        assert!(queue.current().await.is_none());

        harness.presenter.set_competing(false);
        queue.resume_backlog().await;
        assert_eq!(current_title(&queue).await.as_deref(), Some("A"));
    }

    #[tokio::test(start_paused = true)]
    async fn admission_after_surface_clears_shows_the_stranded_head_first() {
        let harness = Harness::new();
        let queue = queue(&harness);

        harness.presenter.set_competing(true);
        queue.admit(notification("A"), false).await;
        assert_eq!(queue.phase().await, QueuePhase::Blocked);

        harness.presenter.set_competing(false);
        queue.admit(notification("B"), false).await;
        assert_eq!(current_title(&queue).await.as_deref(), Some("A"));
        assert_eq!(backlog_titles(&queue).await, vec!["B"]);
        assert_eq!(harness.presenter.shown_titles(), vec!["A"]);
        assert_eq!(queue.phase().await, QueuePhase::ShowingWithBacklog);
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_backlog_is_retried_without_the_host() {
        let harness = Harness::new();
        let queue = queue(&harness);

        harness.presenter.set_competing(true);
        queue.admit_batch(vec![notification("A"), notification("B")], false).await;
        sleep(Duration::from_secs(3)).await;
        assert!(queue.current().await.is_none());
        assert_eq!(queue.phase().await, QueuePhase::Blocked);
        assert_eq!(queue.live_timers().await, 1);

        harness.presenter.set_competing(false);
        sleep(Duration::from_millis(300)).await;
        assert_eq!(current_title(&queue).await.as_deref(), Some("A"));
        assert_eq!(backlog_titles(&queue).await, vec!["B"]);
        assert_eq!(harness.presenter.shown_titles(), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn previews_off_redacts_what_the_presenter_sees() {
        let harness = Harness::new();
        harness.settings.set_show_preview(false);
        let queue = queue(&harness);

        queue.admit(notification("A"), false).await;
        let shown = harness.presenter.last_shown().unwrap();
        assert_eq!(shown.title.as_deref(), Some("A"));
        assert!(shown.body.is_none());
        assert!(queue.current().await.unwrap().body.is_none());
        assert!(queue.current_unredacted().await.unwrap().body.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn synthetic_notifications_use_the_reminder_surface() {
        let harness = Harness::new();
        let queue = queue(&harness);
        let reminder = Notification::new(
            "dev.notifhud.app",
            "Reminders",
            NotificationText {
                title: Some("Stretch".into()),
                ..NotificationText::default()
            },
            None,
            Origin::Synthetic,
        );
        queue.admit(reminder, true).await;
        assert_eq!(
            harness.presenter.events(),
            vec![PresenterEvent::Show(SurfaceKind::Reminder, Some("Stretch".into()))]
        );
    }
}
