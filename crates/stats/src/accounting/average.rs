use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

/// Mean duration over every sample ever added, plus the sample count.
///
/// The naive `(avg * n + d) / (n + 1)` multiplies a large average by a large
/// count; instead each step adds `d / n` and subtracts `avg / n` with the new
/// count. Both divisions truncate to whole microseconds, so a small bias builds
/// up over very long runs. That bias is accepted.
#[derive(Debug, Default)]
pub struct RollingAverage {
    inner: Mutex<AverageState>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AverageState {
    /// Stored as whole microseconds.
    pub average: Duration,
    pub samples: u64,
}

impl RollingAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sample(&self, delta: Duration) {
        let mut s = self.inner.lock();
        s.samples += 1;
        let n = u128::from(s.samples);
        let avg = s.average.as_micros();
        let delta_part = delta.as_micros() / n;
        let old_part = avg / n;
        // avg >= avg / n, so the subtraction cannot go below zero.
        let next = avg + delta_part - old_part;
        s.average = Duration::from_micros(next as u64);
    }

    pub fn snapshot(&self) -> AverageState {
        *self.inner.lock()
    }

    pub fn samples(&self) -> u64 {
        self.inner.lock().samples
    }

    /// Swap in a fresh state, returning the previous one.
    pub fn take(&self) -> AverageState {
        std::mem::take(&mut *self.inner.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sample_is_the_average() {
        let a = RollingAverage::new();
        a.add_sample(Duration::from_secs(42));
        let s = a.snapshot();
        assert_eq!(s.samples, 1);
        assert_eq!(s.average, Duration::from_secs(42));
    }

    #[test]
    fn exact_mean_for_evenly_divisible_samples() {
        let a = RollingAverage::new();
        for secs in [10, 20, 30, 40] {
            a.add_sample(Duration::from_secs(secs));
        }
        let s = a.snapshot();
        assert_eq!(s.samples, 4);
        let diff = s.average.as_micros().abs_diff(25_000_000);
        assert!(diff <= 4, "average {:?} too far from 25s", s.average);
    }

    #[test]
    fn zero_duration_samples_pull_the_average_down() {
        let a = RollingAverage::new();
        a.add_sample(Duration::from_secs(10));
        a.add_sample(Duration::ZERO);
        assert_eq!(a.snapshot().average, Duration::from_secs(5));
    }

    #[test]
    fn take_resets_state() {
        let a = RollingAverage::new();
        a.add_sample(Duration::from_secs(1));
        let old = a.take();
        assert_eq!(old.samples, 1);
        assert_eq!(a.snapshot(), AverageState::default());
    }
}
