//! Weekly time ranges for time-gated blocking rules
//!
//! A [`WeeklyRanges`] is a named set of intervals over the minutes of a week
//! in local time. Rules carrying a ` @<range-name>` gate are only enforced
//! while the current instant falls inside the referenced range.
//!
//! The catalog itself is built by the host configuration layer; this module
//! only answers membership queries.
//!
//! # Example
//!
//! ```
//! use nameblock::WeeklyRanges;
//!
//! // Monday 09:00-17:00
//! let ranges = WeeklyRanges::new([(9 * 60, 17 * 60)]);
//! assert!(ranges.contains(12 * 60));      // Monday noon
//! assert!(!ranges.contains(1440 + 600));  // Tuesday 10:00
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, Local, Timelike};

/// Number of minutes in a week
pub const MINUTES_PER_WEEK: u32 = 7 * 24 * 60;

/// Catalog of named weekly ranges, shared between the loader and the rules
/// that reference them
pub type WeeklyRangesCatalog = HashMap<String, Arc<WeeklyRanges>>;

/// A set of time-of-week intervals in local time
///
/// Intervals are half-open `[start, end)` in minute-of-week, where minute 0
/// is Monday 00:00. An interval whose start is greater than its end wraps
/// across the Sunday/Monday boundary. After construction the stored
/// intervals are sorted, non-overlapping and wrap-free, so membership is a
/// binary search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyRanges {
    /// Sorted, non-overlapping half-open intervals
    intervals: Vec<(u32, u32)>,
}

impl WeeklyRanges {
    /// Compile a set of `(start_minute, end_minute)` intervals
    ///
    /// Wrapping intervals are split at the week boundary; overlapping and
    /// adjacent intervals are merged. Values at or above
    /// [`MINUTES_PER_WEEK`] are reduced modulo the week length. Degenerate
    /// intervals with `start == end` are dropped.
    #[must_use]
    pub fn new(intervals: impl IntoIterator<Item = (u32, u32)>) -> Self {
        let mut flat: Vec<(u32, u32)> = Vec::new();
        for (start, end) in intervals {
            let start = start % MINUTES_PER_WEEK;
            let end = if end == MINUTES_PER_WEEK { end } else { end % MINUTES_PER_WEEK };
            if start == end {
                continue;
            }
            if start < end {
                flat.push((start, end));
            } else {
                // Wraps past Sunday midnight
                flat.push((start, MINUTES_PER_WEEK));
                if end > 0 {
                    flat.push((0, end));
                }
            }
        }

        flat.sort_unstable();
        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(flat.len());
        for (start, end) in flat {
            match merged.last_mut() {
                Some((_, prev_end)) if start <= *prev_end => {
                    *prev_end = (*prev_end).max(end);
                }
                _ => merged.push((start, end)),
            }
        }

        Self { intervals: merged }
    }

    /// Whether a minute-of-week falls inside any interval
    #[must_use]
    pub fn contains(&self, minute_of_week: u32) -> bool {
        let minute = minute_of_week % MINUTES_PER_WEEK;
        let idx = self.intervals.partition_point(|&(start, _)| start <= minute);
        idx > 0 && minute < self.intervals[idx - 1].1
    }

    /// Whether the given instant falls inside any interval
    ///
    /// Pure in the instant: two calls with the same argument always agree.
    /// The caller decides the time zone; the engine passes local time.
    #[must_use]
    pub fn matches_at<T: Datelike + Timelike>(&self, instant: &T) -> bool {
        let minute =
            instant.weekday().num_days_from_monday() * 1440 + instant.hour() * 60 + instant.minute();
        self.contains(minute)
    }

    /// Whether the current local time falls inside any interval
    #[must_use]
    pub fn matches_now(&self) -> bool {
        self.matches_at(&Local::now())
    }

    /// Whether the range contains no minutes at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Number of stored intervals after compilation
    #[must_use]
    pub fn interval_count(&self) -> usize {
        self.intervals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn workdays_9_to_17() -> WeeklyRanges {
        WeeklyRanges::new((0..5).map(|day| (day * 1440 + 9 * 60, day * 1440 + 17 * 60)))
    }

    #[test]
    fn test_empty() {
        let ranges = WeeklyRanges::new([]);
        assert!(ranges.is_empty());
        assert!(!ranges.contains(0));
        assert!(!ranges.matches_now());
    }

    #[test]
    fn test_basic_membership() {
        // Tuesday 10:00-11:00
        let ranges = WeeklyRanges::new([(1440 + 600, 1440 + 660)]);
        assert!(ranges.contains(1440 + 600));
        assert!(ranges.contains(1440 + 659));
        assert!(!ranges.contains(1440 + 660)); // half-open
        assert!(!ranges.contains(1440 + 599));
        assert!(!ranges.contains(600)); // Monday 10:00
    }

    #[test]
    fn test_wrapping_interval() {
        // Sunday 22:00 to Monday 06:00
        let ranges = WeeklyRanges::new([(6 * 1440 + 22 * 60, 6 * 60)]);
        assert_eq!(ranges.interval_count(), 2);
        assert!(ranges.contains(6 * 1440 + 23 * 60)); // Sunday 23:00
        assert!(ranges.contains(0)); // Monday 00:00
        assert!(ranges.contains(5 * 60)); // Monday 05:00
        assert!(!ranges.contains(6 * 60)); // Monday 06:00
        assert!(!ranges.contains(6 * 1440 + 21 * 60)); // Sunday 21:00
    }

    #[test]
    fn test_overlapping_intervals_merge() {
        let ranges = WeeklyRanges::new([(100, 200), (150, 300), (300, 400)]);
        assert_eq!(ranges.interval_count(), 1);
        assert!(ranges.contains(100));
        assert!(ranges.contains(399));
        assert!(!ranges.contains(400));
    }

    #[test]
    fn test_degenerate_interval_dropped() {
        let ranges = WeeklyRanges::new([(500, 500)]);
        assert!(ranges.is_empty());
    }

    #[test]
    fn test_out_of_range_minutes_reduced() {
        let ranges = WeeklyRanges::new([(MINUTES_PER_WEEK + 10, MINUTES_PER_WEEK + 20)]);
        assert!(ranges.contains(15));
        assert!(ranges.contains(MINUTES_PER_WEEK + 15));
    }

    #[test]
    fn test_full_week() {
        let ranges = WeeklyRanges::new([(0, MINUTES_PER_WEEK)]);
        assert!(ranges.contains(0));
        assert!(ranges.contains(MINUTES_PER_WEEK - 1));
    }

    #[test]
    fn test_matches_at_weekday() {
        let ranges = workdays_9_to_17();

        // 2025-01-01 is a Wednesday
        let wed_noon = NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert!(ranges.matches_at(&wed_noon));

        // 2025-01-04 is a Saturday
        let sat_noon = NaiveDate::from_ymd_opt(2025, 1, 4)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert!(!ranges.matches_at(&sat_noon));
    }

    #[test]
    fn test_matches_at_boundaries() {
        let ranges = workdays_9_to_17();

        let mon = NaiveDate::from_ymd_opt(2024, 12, 30).unwrap(); // a Monday
        assert!(ranges.matches_at(&mon.and_hms_opt(9, 0, 0).unwrap()));
        assert!(ranges.matches_at(&mon.and_hms_opt(16, 59, 59).unwrap()));
        assert!(!ranges.matches_at(&mon.and_hms_opt(17, 0, 0).unwrap()));
        assert!(!ranges.matches_at(&mon.and_hms_opt(8, 59, 59).unwrap()));
    }

    #[test]
    fn test_matches_at_is_pure() {
        let ranges = workdays_9_to_17();
        let instant = NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        for _ in 0..10 {
            assert!(ranges.matches_at(&instant));
        }
    }

    #[test]
    fn test_catalog_lookup_is_case_sensitive() {
        let mut catalog = WeeklyRangesCatalog::new();
        catalog.insert("work-hours".to_string(), Arc::new(workdays_9_to_17()));

        assert!(catalog.get("work-hours").is_some());
        assert!(catalog.get("Work-Hours").is_none());
    }
}
