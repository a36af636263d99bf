//! Rolling per-minute and per-hour send quotas.
//!
//! The tracker never reads the clock itself: every decision is made against
//! the instant passed in, so the engine controls time and tests can use
//! synthetic instants.
//!
//! # Example
//!
//! ```text
//! max_per_minute: 3, max_per_hour: 100, batch_size: 2
//! t=0s   try_advance(remaining=5) -> Proceed(2)   record x2
//! t=1s   try_advance(remaining=3) -> Proceed(1)   record x1
//! t=2s   try_advance(remaining=2) -> Wait(58s)
//! t=60s  try_advance(remaining=2) -> Proceed(2)   minute window reset
//! ```

use std::time::Duration;

use papillon_common::config::RateLimitPolicy;
use tokio::time::Instant;

pub const MINUTE: Duration = Duration::from_secs(60);
pub const HOUR: Duration = Duration::from_secs(60 * 60);

/// Answer to "may the next batch go out now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Send up to this many messages before asking again.
    Proceed(usize),
    /// No quota left; ask again after this long.
    Wait(Duration),
}

/// Send counters for the current minute and hour windows.
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    max_per_minute: u32,
    max_per_hour: u32,
    batch_size: u32,
    minute_count: u32,
    minute_window_start: Instant,
    hour_count: u32,
    hour_window_start: Instant,
}

impl QuotaTracker {
    /// Starts both windows at `now` with zero sends recorded.
    #[must_use]
    pub const fn new(policy: &RateLimitPolicy, now: Instant) -> Self {
        Self {
            max_per_minute: policy.max_per_minute,
            max_per_hour: policy.max_per_hour,
            batch_size: policy.batch_size,
            minute_count: 0,
            minute_window_start: now,
            hour_count: 0,
            hour_window_start: now,
        }
    }

    /// Decides how many of the `remaining` messages may go out now.
    ///
    /// A window resets as soon as the time since it opened is `>=` its length,
    /// so a caller woken exactly at the end of a returned wait is admitted.
    ///
    /// When nothing may be sent, the wait is the rest of the hour window if
    /// the hour quota is spent, otherwise the rest of the minute window. A
    /// limit of zero therefore yields a full-window wait, never a zero wait.
    pub fn try_advance(&mut self, now: Instant, remaining: usize) -> Admission {
        if remaining == 0 {
            return Admission::Proceed(0);
        }

        let minute_elapsed = now.saturating_duration_since(self.minute_window_start);
        if minute_elapsed >= MINUTE {
            self.minute_count = 0;
            self.minute_window_start = now;
        }

        let hour_elapsed = now.saturating_duration_since(self.hour_window_start);
        if hour_elapsed >= HOUR {
            self.hour_count = 0;
            self.hour_window_start = now;
        }

        let minute_room = self.max_per_minute.saturating_sub(self.minute_count);
        let hour_room = self.max_per_hour.saturating_sub(self.hour_count);
        let room = self.batch_size.min(minute_room).min(hour_room);
        let allowed = usize::try_from(room).unwrap_or(usize::MAX).min(remaining);

        if allowed > 0 {
            return Admission::Proceed(allowed);
        }

        if hour_room == 0 {
            Admission::Wait(HOUR - now.saturating_duration_since(self.hour_window_start))
        } else {
            Admission::Wait(MINUTE - now.saturating_duration_since(self.minute_window_start))
        }
    }

    /// Charges one attempt, successful or not, to both windows.
    pub const fn record_send(&mut self) {
        self.minute_count = self.minute_count.saturating_add(1);
        self.hour_count = self.hour_count.saturating_add(1);
    }

    #[must_use]
    pub const fn minute_count(&self) -> u32 {
        self.minute_count
    }

    #[must_use]
    pub const fn hour_count(&self) -> u32 {
        self.hour_count
    }
}
