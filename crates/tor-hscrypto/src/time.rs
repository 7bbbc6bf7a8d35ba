//! Time periods, as used to drive v3 onion-service key blinding and HSDir
//! placement.
//!
//! A time period is a 24-hour epoch offset by 12 hours:
//! `(unix_seconds + 12h) / 24h`, rounded down (spec.md §3 "Time period").
//! The offset keeps a period's boundary away from UTC midnight, so that a
//! service and its clients agree on the period even if their clocks are a
//! few hours apart.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The offset applied before dividing into periods.
const ROTATION_OFFSET: Duration = Duration::from_secs(12 * 60 * 60);

/// The default period length used throughout this core (24 hours); the
/// live Tor network's `hsdir-interval` consensus parameter can vary this,
/// but the core treats it as fixed, matching the spec's single formula.
pub const DEFAULT_LENGTH: Duration = Duration::from_secs(24 * 60 * 60);

/// A 24-hour epoch (offset by 12h) used to derive the onion service blinded
/// key and its HSDir ring position.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimePeriod {
    /// Index of this period since the (offset) unix epoch.
    interval_num: u64,
    /// The length of one period, in seconds.
    length_in_sec: u32,
}

impl TimePeriod {
    /// Construct the time period of length `length` that contains `when`.
    pub fn new(length: Duration, when: SystemTime) -> Self {
        let since_epoch = when
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .saturating_add(ROTATION_OFFSET);
        let length_secs = length.as_secs().max(1);
        TimePeriod {
            interval_num: since_epoch.as_secs() / length_secs,
            length_in_sec: length_secs.min(u64::from(u32::MAX)) as u32,
        }
    }

    /// Construct the time period of the default (24h) length containing
    /// `when`.
    pub fn from_time(when: SystemTime) -> Self {
        Self::new(DEFAULT_LENGTH, when)
    }

    /// Build a `TimePeriod` directly from its raw interval number and
    /// length; used when the length is already known (e.g. re-deriving a
    /// period from a descriptor's own fields).
    pub fn from_parts(interval_num: u64, length_in_sec: u32) -> Self {
        TimePeriod {
            interval_num,
            length_in_sec,
        }
    }

    /// Return the raw interval number.
    pub fn interval_num(&self) -> u64 {
        self.interval_num
    }

    /// Return the period's length, in seconds.
    pub fn length_in_sec(&self) -> u32 {
        self.length_in_sec
    }

    /// Return the period after this one, or `None` on overflow.
    pub fn next(&self) -> Option<Self> {
        self.interval_num.checked_add(1).map(|n| TimePeriod {
            interval_num: n,
            length_in_sec: self.length_in_sec,
        })
    }

    /// Return the period before this one, or `None` if this is period 0.
    pub fn prev(&self) -> Option<Self> {
        self.interval_num.checked_sub(1).map(|n| TimePeriod {
            interval_num: n,
            length_in_sec: self.length_in_sec,
        })
    }

    /// Return true if this period contains `when`.
    pub fn contains(&self, when: SystemTime) -> bool {
        *self == TimePeriod::new(Duration::from_secs(u64::from(self.length_in_sec)), when)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deterministic_for_identical_time() {
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let a = TimePeriod::from_time(t);
        let b = TimePeriod::from_time(t);
        assert_eq!(a, b);
        assert!(a.contains(t));
    }

    #[test]
    fn rotation_offset_moves_the_boundary() {
        // Exactly at a day boundary (ignoring the 12h offset), the period
        // should not flip until 12h past midnight.
        let day = 1_700_000_000 / 86_400 * 86_400;
        let midnight = UNIX_EPOCH + Duration::from_secs(day);
        let just_before_flip = midnight + Duration::from_secs(12 * 60 * 60 - 1);
        let just_after_flip = midnight + Duration::from_secs(12 * 60 * 60);
        assert_ne!(
            TimePeriod::from_time(just_before_flip),
            TimePeriod::from_time(just_after_flip)
        );
    }

    #[test]
    fn next_prev_are_inverses() {
        let t = TimePeriod::from_time(UNIX_EPOCH + Duration::from_secs(1_700_000_000));
        assert_eq!(t.next().unwrap().prev().unwrap(), t);
    }
}
