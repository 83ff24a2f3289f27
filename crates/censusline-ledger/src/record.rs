//! Usage record: call count within one quota window

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Calls made since `window_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub window_start: DateTime<Utc>,
    pub call_count: u64,
}

impl UsageRecord {
    /// Empty record whose window opens at `now`.
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            call_count: 0,
        }
    }

    /// When this window closes. `None` if the window overflows the calendar.
    pub fn window_end(&self, window: Duration) -> Option<DateTime<Utc>> {
        chrono::Duration::from_std(window)
            .ok()
            .and_then(|w| self.window_start.checked_add_signed(w))
    }

    pub fn is_expired(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.window_end(window).is_some_and(|end| now >= end)
    }

    /// This record, or a fresh one if the window has elapsed.
    pub fn rolled(self, now: DateTime<Utc>, window: Duration) -> Self {
        if self.is_expired(now, window) {
            Self::fresh(now)
        } else {
            self
        }
    }
}
