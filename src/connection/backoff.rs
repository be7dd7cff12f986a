//! Exponential backoff between connect attempts

use std::time::Duration;

pub const DEFAULT_BACKOFF_FLOOR: Duration = Duration::from_secs(1);
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Doubling backoff bounded by `[floor, cap]`
///
/// `next_delay` hands out the current interval and doubles it for the
/// following failure, so the sequence from a fresh state is
/// floor, 2·floor, 4·floor, … until it sticks at `cap`.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffState {
    floor: Duration,
    current_interval: Duration,
    cap: Duration,
}

impl BackoffState {
    /// Create a backoff starting at `floor`
    ///
    /// A floor above the cap is clamped to the cap.
    pub fn new(floor: Duration, cap: Duration) -> Self {
        let floor = floor.min(cap);
        Self {
            floor,
            current_interval: floor,
            cap,
        }
    }

    /// Delay to sleep after a failed attempt; advances the state
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_interval;
        self.current_interval = self.current_interval.saturating_mul(2).min(self.cap);
        delay
    }

    /// Restore the floor after a successful connect
    pub fn reset(&mut self) {
        self.current_interval = self.floor;
    }

    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    pub fn floor(&self) -> Duration {
        self.floor
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_FLOOR, DEFAULT_BACKOFF_CAP)
    }
}
