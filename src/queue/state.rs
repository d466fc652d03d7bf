use std::collections::VecDeque;

use serde::Serialize;

use crate::models::Notification;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QueuePhase {
    Idle,
    Showing,
    ShowingWithBacklog,
    /// Between hiding one banner and showing the next.
    Advancing,
    /// Nothing shown, but the backlog is waiting for another surface to go
    /// away.
    Blocked,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    ShowNow,
    /// Appended at this zero-based backlog position.
    Backlogged(usize),
}

#[derive(Debug, PartialEq, Eq)]
pub enum Dismissal {
    /// The backlog head has been set aside and will be shown after the
    /// settle delay.
    Advance,
    /// Nothing queued; the slot is now empty.
    Cleared,
    /// Nothing was on screen.
    Nothing,
}

/// One shown slot plus a FIFO backlog. Pure data; the timing lives in
/// [`super::PresentationQueue`].
#[derive(Debug, Default)]
pub struct QueueState {
    current: Option<Notification>,
    /// Popped from the backlog, waiting out the settle delay.
    pending_next: Option<Notification>,
    backlog: VecDeque<Notification>,
    pub user_interacting: bool,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> QueuePhase {
        match (&self.current, &self.pending_next) {
            (None, Some(_)) => QueuePhase::Advancing,
            (Some(_), _) if !self.backlog.is_empty() => QueuePhase::ShowingWithBacklog,
            (Some(_), _) => QueuePhase::Showing,
            (None, None) if !self.backlog.is_empty() => QueuePhase::Blocked,
            (None, None) => QueuePhase::Idle,
        }
    }

    /// Nothing shown, nothing about to be shown, nothing waiting.
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.pending_next.is_none() && self.backlog.is_empty()
    }

    /// No banner shown and none about to be.
    pub fn slot_free(&self) -> bool {
        self.current.is_none() && self.pending_next.is_none()
    }

    /// The slot is free yet something is waiting.
    pub fn is_blocked(&self) -> bool {
        self.slot_free() && !self.backlog.is_empty()
    }

    pub fn current(&self) -> Option<&Notification> {
        self.current.as_ref()
    }

    pub fn backlog(&self) -> impl Iterator<Item = &Notification> {
        self.backlog.iter()
    }

    /// Everything waiting to be shown, including a notification mid-advance.
    pub fn waiting(&self) -> usize {
        self.backlog.len() + usize::from(self.pending_next.is_some())
    }

    /// Take the slot when it is free and no other surface is up; otherwise
    /// append. A free slot goes to the backlog head before the new arrival,
    /// so nothing already waiting is ever overtaken.
    pub fn admit(&mut self, notification: Notification, surface_busy: bool) -> Admission {
        if !self.slot_free() || surface_busy {
            self.backlog.push_back(notification);
            return Admission::Backlogged(self.backlog.len() - 1);
        }

        let next = match self.backlog.pop_front() {
            Some(head) => {
                self.backlog.push_back(notification);
                head
            }
            None => notification,
        };
        self.current = Some(next);
        self.user_interacting = false;
        Admission::ShowNow
    }

    /// Clear the slot. The backlog head is moved aside before the slot is
    /// emptied so an admission racing the advance cannot jump ahead of it.
    pub fn begin_dismiss(&mut self) -> Dismissal {
        if self.current.is_none() {
            return Dismissal::Nothing;
        }
        self.user_interacting = false;
        match self.backlog.pop_front() {
            Some(next) => {
                self.pending_next = Some(next);
                self.current = None;
                Dismissal::Advance
            }
            None => {
                self.current = None;
                Dismissal::Cleared
            }
        }
    }

    /// Finish an advance started by [`Self::begin_dismiss`].
    pub fn complete_advance(&mut self) -> Option<&Notification> {
        let next = self.pending_next.take()?;
        self.current = Some(next);
        self.current.as_ref()
    }

    /// Show the backlog head when the slot is empty. Used after a competing
    /// surface went away.
    pub fn promote_head(&mut self) -> Option<&Notification> {
        if self.current.is_some() || self.pending_next.is_some() {
            return None;
        }
        let head = self.backlog.pop_front()?;
        self.user_interacting = false;
        self.current = Some(head);
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.pending_next = None;
        self.backlog.clear();
        self.user_interacting = false;
    }
}
