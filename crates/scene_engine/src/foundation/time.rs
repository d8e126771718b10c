//! Time management utilities
//!
//! The update thread runs game logic at a fixed step. [`FixedStepTimer`]
//! accumulates real elapsed time and reports how many ticks are due, which is
//! the part of a "time manager" this core needs.

use std::time::{Duration, Instant};

/// Accumulating fixed-step timer for the update thread
pub struct FixedStepTimer {
    step: Duration,
    last: Instant,
    accumulator: Duration,
    tick_count: u64,
    max_ticks_per_advance: u32,
}

impl FixedStepTimer {
    /// Create a timer ticking `rate_hz` times per second
    pub fn new(rate_hz: u32) -> Self {
        let rate_hz = rate_hz.max(1);
        Self {
            step: Duration::from_secs_f64(1.0 / f64::from(rate_hz)),
            last: Instant::now(),
            accumulator: Duration::ZERO,
            tick_count: 0,
            max_ticks_per_advance: 8,
        }
    }

    /// Fixed step length in seconds
    pub fn step_seconds(&self) -> f32 {
        self.step.as_secs_f32()
    }

    /// Fixed step length
    pub fn step(&self) -> Duration {
        self.step
    }

    /// Total number of ticks handed out so far
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Sample the clock and return the number of ticks that are due
    pub fn advance(&mut self) -> u32 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last);
        self.last = now;
        self.advance_by(elapsed)
    }

    /// Feed an explicit elapsed duration (used by tests and replay)
    ///
    /// At most `max_ticks_per_advance` ticks are reported; the excess backlog is
    /// dropped so a long stall does not cause a spiral of catch-up updates.
    pub fn advance_by(&mut self, elapsed: Duration) -> u32 {
        self.accumulator += elapsed;

        let mut ticks = 0;
        while self.accumulator >= self.step {
            self.accumulator -= self.step;
            ticks += 1;
            if ticks == self.max_ticks_per_advance {
                log::debug!("Fixed-step backlog dropped: {:?}", self.accumulator);
                self.accumulator = Duration::ZERO;
                break;
            }
        }

        self.tick_count += u64::from(ticks);
        ticks
    }

    /// Time left until the next tick is due
    pub fn until_next_tick(&self) -> Duration {
        self.step.saturating_sub(self.accumulator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_step_accumulates() {
        let mut timer = FixedStepTimer::new(10);

        assert_eq!(timer.advance_by(Duration::from_millis(50)), 0);
        assert_eq!(timer.advance_by(Duration::from_millis(60)), 1);
        assert_eq!(timer.advance_by(Duration::from_millis(200)), 2);
        assert_eq!(timer.tick_count(), 3);
    }

    #[test]
    fn test_fixed_step_caps_backlog() {
        let mut timer = FixedStepTimer::new(100);

        assert_eq!(timer.advance_by(Duration::from_secs(5)), 8);
        assert_eq!(timer.advance_by(Duration::ZERO), 0);
    }
}
