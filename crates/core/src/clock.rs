//! Calendar-day boundary helpers.
//!
//! Every day comparison in the workspace goes through this module so that a
//! single reference timezone (UTC) governs duplicate detection, streak
//! decisions, and analytics windows alike. Mixing local and UTC day
//! boundaries is the classic correctness bug in this domain; keeping one
//! key function makes it unrepresentable.

use chrono::{DateTime, Datelike, Utc};

/// Calendar-day key for an instant: whole days since the common era, taken
/// in UTC. Two instants share a key iff they fall on the same UTC date.
pub fn day_key(at: DateTime<Utc>) -> i64 {
    i64::from(at.date_naive().num_days_from_ce())
}

/// Signed number of calendar days from `from_key` to `to_key`.
pub fn days_between(from_key: i64, to_key: i64) -> i64 {
    to_key - from_key
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn same_utc_date_same_key() {
        assert_eq!(
            day_key(at(2025, 3, 10, 0, 0)),
            day_key(at(2025, 3, 10, 23, 59))
        );
    }

    #[test]
    fn midnight_crossing_is_one_day() {
        // 23:59 followed by 00:01 is ~2 minutes of wall clock but exactly
        // one calendar day apart.
        let before = at(2025, 3, 10, 23, 59);
        let after = at(2025, 3, 11, 0, 1);
        assert_eq!(days_between(day_key(before), day_key(after)), 1);
    }

    #[test]
    fn month_and_year_boundaries() {
        assert_eq!(
            days_between(day_key(at(2025, 1, 31, 12, 0)), day_key(at(2025, 2, 1, 12, 0))),
            1
        );
        assert_eq!(
            days_between(day_key(at(2024, 12, 31, 23, 0)), day_key(at(2025, 1, 1, 1, 0))),
            1
        );
    }

    #[test]
    fn delta_is_signed() {
        let a = day_key(at(2025, 3, 10, 8, 0));
        let b = day_key(at(2025, 3, 14, 8, 0));
        assert_eq!(days_between(a, b), 4);
        assert_eq!(days_between(b, a), -4);
    }
}
