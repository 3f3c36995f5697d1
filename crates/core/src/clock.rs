// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Simulated clock.
//!
//! Time is measured in seconds since the start of the simulation run. The
//! clock is anchored on the tokio instant at which it was created; on a
//! paused runtime every `sleep` is a discrete-event step and `now()` reads
//! the virtual time.

use std::time::Duration;
use tokio::time::Instant;

/// Clock handle shared by every service and executor of one simulation.
#[derive(Debug, Clone)]
pub struct SimClock {
    start: Instant,
}

impl SimClock {
    /// Anchor a new clock at the current (virtual) instant.
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    /// Current simulated date in seconds since the simulation started.
    pub fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Advance simulated time by `seconds`. Non-positive and non-finite
    /// durations return immediately.
    pub async fn sleep(&self, seconds: f64) {
        if seconds > 0.0 && seconds.is_finite() {
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        }
    }

    /// Sleep until the simulated date `date`, if it is still in the future.
    pub async fn sleep_until(&self, date: f64) {
        let now = self.now();
        if date > now {
            self.sleep(date - now).await;
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
