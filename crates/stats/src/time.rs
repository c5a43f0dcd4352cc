use std::ops::{Add, Sub};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock instant with microsecond resolution (microseconds since the Unix epoch).
///
/// Lifecycle timestamps come from the session model as wall-clock values and are
/// compared against the externally owned interval start, so a monotonic `Instant`
/// does not fit here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const fn from_micros(us: i64) -> Self {
        Self(us)
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * 1_000_000)
    }

    pub fn now() -> Self {
        let since = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(since.as_micros() as i64)
    }

    pub const fn as_micros(&self) -> i64 {
        self.0
    }

    /// Whole seconds, rounded towards negative infinity.
    pub const fn as_secs(&self) -> i64 {
        self.0.div_euclid(1_000_000)
    }

    /// `self - earlier`, or `None` when `earlier` is after `self`.
    pub fn checked_since(&self, earlier: Timestamp) -> Option<Duration> {
        let diff = self.0.checked_sub(earlier.0)?;
        u64::try_from(diff).ok().map(Duration::from_micros)
    }

    /// `self - earlier`, clamped to zero.
    pub fn saturating_since(&self, earlier: Timestamp) -> Duration {
        self.checked_since(earlier).unwrap_or_default()
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(rhs.as_micros() as i64))
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0.saturating_sub(rhs.as_micros() as i64))
    }
}

/// `secs.micros` with six fractional digits, the format every duration is exported in.
pub fn format_duration(d: Duration) -> String {
    format!("{}.{:06}", d.as_secs(), d.subsec_micros())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_round_down_for_negative_values() {
        assert_eq!(Timestamp::from_micros(1_500_000).as_secs(), 1);
        assert_eq!(Timestamp::from_micros(-1).as_secs(), -1);
    }

    #[test]
    fn since_refuses_reversed_order() {
        let a = Timestamp::from_secs(10);
        let b = Timestamp::from_secs(12);
        assert_eq!(b.checked_since(a), Some(Duration::from_secs(2)));
        assert_eq!(a.checked_since(b), None);
        assert_eq!(a.saturating_since(b), Duration::ZERO);
    }

    #[test]
    fn duration_format_pads_micros() {
        assert_eq!(format_duration(Duration::from_micros(3_000_042)), "3.000042");
        assert_eq!(format_duration(Duration::ZERO), "0.000000");
    }
}
