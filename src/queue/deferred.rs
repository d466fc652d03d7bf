use std::collections::HashMap;

use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    AutoDismiss,
    Settle,
    Resume,
}

struct Slot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// At most one live task per key. Scheduling a key aborts its previous task
/// and bumps the key's generation; a task that already woke up checks its
/// generation before touching state, so the newest schedule always wins.
#[derive(Default)]
pub struct DeferredTasks {
    slots: HashMap<TimerKey, Slot>,
}

impl DeferredTasks {
    /// Abort whatever is scheduled under `key` and reserve a new generation
    /// for the task about to be spawned.
    pub fn reserve(&mut self, key: TimerKey) -> u64 {
        let slot = self.slots.entry(key).or_insert(Slot {
            generation: 0,
            handle: None,
        });
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
        slot.generation += 1;
        slot.generation
    }

    pub fn attach(&mut self, key: TimerKey, generation: u64, handle: JoinHandle<()>) {
        match self.slots.get_mut(&key) {
            Some(slot) if slot.generation == generation => slot.handle = Some(handle),
            _ => handle.abort(),
        }
    }

    pub fn is_current(&self, key: TimerKey, generation: u64) -> bool {
        self.slots
            .get(&key)
            .is_some_and(|slot| slot.generation == generation && slot.handle.is_some())
    }

    /// Called by a task that fired, so the slot no longer counts as live.
    pub fn finish(&mut self, key: TimerKey, generation: u64) {
        if let Some(slot) = self.slots.get_mut(&key) {
            if slot.generation == generation {
                slot.handle = None;
            }
        }
    }

    pub fn cancel(&mut self, key: TimerKey) {
        if let Some(slot) = self.slots.get_mut(&key) {
            slot.generation += 1;
            if let Some(handle) = slot.handle.take() {
                handle.abort();
            }
        }
    }

    pub fn cancel_all(&mut self) {
        let keys: Vec<TimerKey> = self.slots.keys().copied().collect();
        for key in keys {
            self.cancel(key);
        }
    }

    pub fn is_scheduled(&self, key: TimerKey) -> bool {
        self.slots
            .get(&key)
            .is_some_and(|slot| slot.handle.as_ref().is_some_and(|h| !h.is_finished()))
    }

    pub fn live_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.handle.as_ref().is_some_and(|h| !h.is_finished()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sleeper() -> JoinHandle<()> {
        tokio::spawn(tokio::time::sleep(Duration::from_secs(60)))
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_the_previous_task() {
        let mut tasks = DeferredTasks::default();
        let first = tasks.reserve(TimerKey::AutoDismiss);
        tasks.attach(TimerKey::AutoDismiss, first, sleeper());

        let second = tasks.reserve(TimerKey::AutoDismiss);
        tasks.attach(TimerKey::AutoDismiss, second, sleeper());

        assert!(!tasks.is_current(TimerKey::AutoDismiss, first));
        assert!(tasks.is_current(TimerKey::AutoDismiss, second));
        tokio::task::yield_now().await;
        assert_eq!(tasks.live_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_invalidates_generation() {
        let mut tasks = DeferredTasks::default();
        let generation = tasks.reserve(TimerKey::Settle);
        tasks.attach(TimerKey::Settle, generation, sleeper());
        tasks.cancel_all();

        assert!(!tasks.is_current(TimerKey::Settle, generation));
        assert!(!tasks.is_scheduled(TimerKey::Settle));
        assert_eq!(tasks.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_attach_is_aborted() {
        let mut tasks = DeferredTasks::default();
        let stale = tasks.reserve(TimerKey::AutoDismiss);
        let fresh = tasks.reserve(TimerKey::AutoDismiss);
        tasks.attach(TimerKey::AutoDismiss, stale, sleeper());
        assert!(!tasks.is_scheduled(TimerKey::AutoDismiss));
        tasks.attach(TimerKey::AutoDismiss, fresh, sleeper());
        assert!(tasks.is_scheduled(TimerKey::AutoDismiss));
    }
}
