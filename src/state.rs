//! Process-wide run flag and command cursor.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// State shared by the scan loop and the command listener.
#[derive(Debug)]
pub struct BotRunState {
    running: AtomicBool,
    last_update_id: AtomicI64,
    owner_id: Option<i64>,
}

impl BotRunState {
    /// Starts in the running state with a zero cursor.
    pub fn new(owner_id: Option<i64>) -> Self {
        Self {
            running: AtomicBool::new(true),
            last_update_id: AtomicI64::new(0),
            owner_id,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Sets the run flag and returns the previous value.
    pub fn set_running(&self, running: bool) -> bool {
        self.running.swap(running, Ordering::AcqRel)
    }

    /// `true` only when an owner is configured and `user_id` matches it.
    pub fn is_owner(&self, user_id: Option<i64>) -> bool {
        matches!((self.owner_id, user_id), (Some(owner), Some(user)) if owner == user)
    }

    pub fn last_update_id(&self) -> i64 {
        self.last_update_id.load(Ordering::Acquire)
    }

    /// Moves the cursor forward; never moves it backwards.
    pub fn advance_cursor(&self, update_id: i64) {
        self.last_update_id.fetch_max(update_id, Ordering::AcqRel);
    }

    /// Clears the cursor after the update channel rejected it.
    pub fn reset_cursor(&self) {
        self.last_update_id.store(0, Ordering::Release);
    }

    /// Offset for the next `getUpdates` call.
    pub fn next_offset(&self) -> Option<i64> {
        match self.last_update_id() {
            0 => None,
            id => Some(id + 1),
        }
    }
}
