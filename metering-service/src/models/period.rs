//! Billing-period bucketing for usage counters.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// Counter bucketing period.
///
/// Projects and publications count against a calendar month; task creation
/// is throttled per ISO week. Keeping the two flavors in one tagged type
/// prevents a weekly counter from ever being addressed with a monthly key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Monthly { year: i32, month: u32 },
    Weekly { iso_year: i32, iso_week: u32 },
}

impl Period {
    /// Calendar-month bucket containing `now`, UTC.
    pub fn month_of(now: DateTime<Utc>) -> Self {
        Period::Monthly {
            year: now.year(),
            month: now.month(),
        }
    }

    /// ISO-week bucket containing `now`, UTC.
    pub fn week_of(now: DateTime<Utc>) -> Self {
        let iso = now.iso_week();
        Period::Weekly {
            iso_year: iso.year(),
            iso_week: iso.week(),
        }
    }

    /// Storage key: `YYYY-MM` for months, `YYYY-Www` for ISO weeks.
    pub fn key(&self) -> String {
        match self {
            Period::Monthly { year, month } => format!("{:04}-{:02}", year, month),
            Period::Weekly { iso_year, iso_week } => {
                format!("{:04}-W{:02}", iso_year, iso_week)
            }
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Hours in the UTC calendar month containing `now` (28-31 days x 24).
///
/// Overage pro-ration divides the monthly rate by this value, so the split
/// is exact per month rather than assuming 30 days.
pub fn hours_in_utc_month(now: DateTime<Utc>) -> i64 {
    days_in_month(now.year(), now.month()) * 24
}

fn days_in_month(year: i32, month: u32) -> i64 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    match (
        NaiveDate::from_ymd_opt(year, month, 1),
        NaiveDate::from_ymd_opt(next_year, next_month, 1),
    ) {
        (Some(first), Some(next)) => (next - first).num_days(),
        // Unreachable for month values produced by chrono's Datelike.
        _ => 30,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn month_key_is_zero_padded() {
        assert_eq!(Period::month_of(utc(2026, 3, 7, 12)).key(), "2026-03");
        assert_eq!(Period::month_of(utc(2026, 11, 30, 23)).key(), "2026-11");
    }

    #[test]
    fn week_key_uses_iso_week_year() {
        // 2021-01-01 was a Friday, still part of ISO week 53 of 2020.
        assert_eq!(Period::week_of(utc(2021, 1, 1, 0)).key(), "2020-W53");
        // 2024-12-30 was a Monday, already ISO week 1 of 2025.
        assert_eq!(Period::week_of(utc(2024, 12, 30, 0)).key(), "2025-W01");
    }

    #[test]
    fn monthly_and_weekly_keys_never_collide() {
        let now = utc(2026, 2, 2, 9);
        assert_ne!(Period::month_of(now).key(), Period::week_of(now).key());
    }

    #[test]
    fn hours_follow_actual_month_length() {
        assert_eq!(hours_in_utc_month(utc(2026, 1, 15, 0)), 744);
        assert_eq!(hours_in_utc_month(utc(2026, 2, 15, 0)), 672);
        assert_eq!(hours_in_utc_month(utc(2024, 2, 15, 0)), 696); // leap year
        assert_eq!(hours_in_utc_month(utc(2026, 4, 15, 0)), 720);
    }
}
