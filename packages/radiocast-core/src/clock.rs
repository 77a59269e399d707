//! Frame-paced scheduling with a cumulative time budget.
//!
//! OS timers typically have multi-millisecond granularity and positive
//! jitter, while MPEG frames are ~26ms apart. [`PaceClock`] tracks an
//! absolute budget against a monotonic origin instead of sleeping per frame,
//! so individual sleep overshoot never accumulates; a brief bounded
//! busy-wait absorbs the residual sub-millisecond gap.

use std::time::{Duration, Instant};

use crate::protocol_constants::DEFAULT_BUSY_WAIT_CEILING_MS;

/// Cumulative time-budget tracker that releases work at real-time speed.
///
/// Usage: after emitting a frame, `add_time(frame_duration_ms)` then
/// `wait().await`. Over any run of N iterations the total elapsed time
/// tracks the summed durations to within a fraction of a percent.
pub struct PaceClock {
    /// Monotonic origin captured at construction (or the last `reset`).
    t0: Instant,
    /// Accumulated budget in milliseconds since `t0`.
    target_ms: f64,
    /// Largest gap closed by spinning rather than sleeping.
    busy_wait_ceiling: Duration,
}

impl PaceClock {
    /// Creates a clock with the default busy-wait ceiling.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ceiling(Duration::from_millis(DEFAULT_BUSY_WAIT_CEILING_MS))
    }

    /// Creates a clock with an explicit busy-wait ceiling.
    ///
    /// On a single-threaded cooperative runtime the spin blocks other work,
    /// so the ceiling bounds how long that can last.
    #[must_use]
    pub fn with_ceiling(busy_wait_ceiling: Duration) -> Self {
        Self {
            t0: Instant::now(),
            target_ms: 0.0,
            busy_wait_ceiling,
        }
    }

    /// Extends the budget by `dt_ms` milliseconds.
    pub fn add_time(&mut self, dt_ms: f64) {
        self.target_ms += dt_ms;
    }

    /// Time remaining until the budget is spent; zero when already behind.
    #[must_use]
    pub fn delay(&self) -> Duration {
        let elapsed_ms = self.t0.elapsed().as_secs_f64() * 1000.0;
        let remaining_ms = self.target_ms - elapsed_ms;
        if remaining_ms <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(remaining_ms / 1000.0)
        }
    }

    /// Blocks cooperatively until the budget is spent.
    ///
    /// Sleeps for all but the busy-wait ceiling, then spins out the residual
    /// gap. Returns immediately when already behind.
    pub async fn wait(&self) {
        let delay = self.delay();
        if delay > self.busy_wait_ceiling {
            tokio::time::sleep(delay - self.busy_wait_ceiling).await;
        }
        while self.delay() > Duration::ZERO {
            std::hint::spin_loop();
        }
    }

    /// Restarts the origin and zeroes the budget.
    pub fn reset(&mut self) {
        self.t0 = Instant::now();
        self.target_ms = 0.0;
    }
}

impl Default for PaceClock {
    fn default() -> Self {
        Self::new()
    }
}
