//! A monotonic stopwatch used to detect a silent sonar connection.

use std::time::{Duration, Instant};

/// Tracks the time elapsed since the last message of interest, independent
/// of wall-clock time (so NTP adjustments don't cause a false liveness
/// timeout).
#[derive(Debug, Clone)]
pub struct Stopwatch {
    last_reset: Instant,
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Stopwatch {
    /// Starts a stopwatch ticking from now.
    #[must_use]
    pub fn new() -> Self {
        Self { last_reset: Instant::now() }
    }

    /// Resets the elapsed time to zero.
    pub fn reset(&mut self) {
        self.last_reset = Instant::now();
    }

    /// Time elapsed since the last [`Self::reset`] (or construction).
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.last_reset.elapsed()
    }

    /// `true` iff more than `limit` has elapsed since the last reset.
    #[must_use]
    pub fn has_elapsed(&self, limit: Duration) -> bool {
        self.elapsed() > limit
    }
}
