use rand::Rng;
use std::ops::RangeInclusive;
use std::thread;
use std::time::Duration;

/// Randomised delays used to look less like a bot. Bounds are in seconds
/// except for the jitter factor.
#[derive(Debug, Clone)]
pub struct Pacing {
    /// Wait after navigation for dynamic content to settle.
    pub settle: RangeInclusive<f64>,
    /// Number of human-ish scroll actions after the page settles.
    pub scrolls: u32,
    /// Pixels per scroll.
    pub scroll_distance: RangeInclusive<i64>,
    pub scroll_pause: RangeInclusive<f64>,
    /// Bounded wait for a readiness selector.
    pub ready_timeout: Duration,
    pub between_targets: RangeInclusive<f64>,
    /// Base time between rounds, scaled by `jitter`.
    pub interval: Duration,
    pub jitter: RangeInclusive<f64>,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            settle: 3.0..=5.0,
            scrolls: 3,
            scroll_distance: 300..=1000,
            scroll_pause: 0.1..=0.9,
            ready_timeout: Duration::from_secs(15),
            between_targets: 0.2..=0.9,
            interval: Duration::from_secs(3 * 60),
            jitter: 0.8..=1.2,
        }
    }
}

impl Pacing {
    /// No waiting at all.
    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            settle: 0.0..=0.0,
            scrolls: 0,
            scroll_distance: 0..=0,
            scroll_pause: 0.0..=0.0,
            ready_timeout: Duration::ZERO,
            between_targets: 0.0..=0.0,
            interval: Duration::ZERO,
            jitter: 1.0..=1.0,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Base interval scaled by a random jitter factor.
    pub fn next_round_delay(&self) -> Duration {
        self.interval.mul_f64(uniform(&self.jitter))
    }

    pub fn scroll_amount(&self) -> i64 {
        rand::thread_rng().gen_range(self.scroll_distance.clone())
    }
}

pub fn uniform(range: &RangeInclusive<f64>) -> f64 {
    rand::thread_rng().gen_range(range.clone())
}

/// Sleep for a random number of seconds in `range`.
pub fn pause(range: &RangeInclusive<f64>) {
    let secs = uniform(range);
    if secs > 0.0 {
        thread::sleep(Duration::from_secs_f64(secs));
    }
}
