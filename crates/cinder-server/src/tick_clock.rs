//! Fixed-rate tick scheduling.
//!
//! Wall-clock time is accumulated and spent in whole ticks, so a slow tick
//! is followed by catch-up ticks rather than a permanently lower rate.

use std::time::{Duration, Instant};

use tracing::warn;

/// Longest stretch of wall-clock time accounted for in one call. Anything
/// beyond it is dropped instead of being replayed as a burst of ticks.
pub const MAX_CATCH_UP: Duration = Duration::from_millis(250);

/// Accumulator-based tick clock.
#[derive(Debug, Clone)]
pub struct TickClock {
    step: Duration,
    previous: Instant,
    accumulator: Duration,
    tick_count: u64,
}

impl TickClock {
    /// Creates a clock running at `tick_rate` ticks per second, starting now.
    pub fn new(tick_rate: u32) -> Self {
        Self::starting_at(tick_rate, Instant::now())
    }

    /// Creates a clock whose first interval starts at `start`.
    pub fn starting_at(tick_rate: u32, start: Instant) -> Self {
        Self {
            step: Duration::from_secs(1) / tick_rate.max(1),
            previous: start,
            accumulator: Duration::ZERO,
            tick_count: 0,
        }
    }

    /// Duration of one tick.
    pub fn step(&self) -> Duration {
        self.step
    }

    /// Ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Accounts for the time elapsed until `now` and calls `update` once per
    /// whole tick owed. Returns the number of ticks run.
    pub fn advance(&mut self, now: Instant, mut update: impl FnMut(u64)) -> u32 {
        let mut elapsed = now.saturating_duration_since(self.previous);
        self.previous = now;

        if elapsed > MAX_CATCH_UP {
            warn!(
                "tick loop fell {:.1}ms behind, skipping ahead",
                (elapsed - MAX_CATCH_UP).as_secs_f64() * 1000.0
            );
            elapsed = MAX_CATCH_UP;
        }
        self.accumulator += elapsed;

        let mut ran = 0;
        while self.accumulator >= self.step {
            update(self.tick_count);
            self.tick_count += 1;
            self.accumulator -= self.step;
            ran += 1;
        }
        ran
    }

    /// Time left until the next tick is owed, measured from `now`.
    pub fn time_until_next(&self, now: Instant) -> Duration {
        let since = now.saturating_duration_since(self.previous);
        self.step
            .saturating_sub(self.accumulator)
            .saturating_sub(since)
    }
}
