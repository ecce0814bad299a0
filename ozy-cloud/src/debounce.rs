//! Save debouncing.
//!
//! Every local edit pushes the earliest allowed save time forward by the
//! grace period, so a burst of edits produces one save after the burst ends.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct SaveDebounce {
    grace: Duration,
    min_save_time: Option<Instant>,
}

impl SaveDebounce {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            min_save_time: None,
        }
    }

    /// Records a local mutation at `now`.
    pub fn record_mutation(&mut self, now: Instant) {
        self.min_save_time = Some(now + self.grace);
    }

    /// True while the grace period after the last mutation has not elapsed.
    pub fn is_pending(&self, now: Instant) -> bool {
        self.min_save_time.is_some_and(|t| now < t)
    }

    pub fn min_save_time(&self) -> Option<Instant> {
        self.min_save_time
    }

    pub fn reset(&mut self) {
        self.min_save_time = None;
    }
}
