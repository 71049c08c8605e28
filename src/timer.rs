use std::time::{Duration, Instant};

use crate::state::EPSILON;

/// Accumulating wall-clock for the search driver.
///
/// The clock survives across repeated `explore` calls: elapsed time keeps
/// accumulating over start/stop cycles, and the optional limit is checked
/// against the total.
#[derive(Clone)]
pub struct Timer {
    start: Instant,
    accumulated: Duration,
    limit: Option<Duration>,
}

impl Default for Timer {
    fn default() -> Self {
        Self {
            start: Instant::now(),
            accumulated: Duration::ZERO,
            limit: None,
        }
    }
}

impl Timer {
    /// Creates a timer with the given limit in seconds; a limit below the
    /// comparison tolerance disables the check.
    pub fn with_limit(limit: f64) -> Self {
        Self {
            start: Instant::now(),
            accumulated: Duration::ZERO,
            limit: (limit >= EPSILON).then(|| Duration::from_secs_f64(limit)),
        }
    }

    /// Starts (or restarts) the running segment.
    pub fn start(&mut self) {
        self.start = Instant::now();
    }

    /// Stops the running segment, folding it into the accumulated total.
    pub fn stop(&mut self) {
        self.accumulated += self.start.elapsed();
    }

    /// Returns the accumulated time plus the running segment.
    pub fn elapsed(&self) -> Duration {
        self.accumulated + self.start.elapsed()
    }

    /// Returns whether the limit has been reached. Always false without a
    /// limit.
    pub fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|limit| self.elapsed() >= limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_limit_never_reached() {
        let timer = Timer::default();

        assert!(!timer.limit_reached());
    }

    #[test]
    fn test_zero_limit_is_disabled() {
        let timer = Timer::with_limit(0.0);

        assert!(!timer.limit_reached());
    }

    #[test]
    fn test_tiny_limit_is_reached() {
        let timer = Timer::with_limit(1e-4);

        std::thread::sleep(Duration::from_millis(1));
        assert!(timer.limit_reached());
    }

    #[test]
    fn test_accumulation_across_segments() {
        let mut timer = Timer::default();

        std::thread::sleep(Duration::from_millis(1));
        timer.stop();
        let first = timer.accumulated;

        timer.start();
        std::thread::sleep(Duration::from_millis(1));
        timer.stop();

        assert!(timer.accumulated > first);
        assert!(timer.elapsed() >= timer.accumulated);
    }
}
