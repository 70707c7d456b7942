//! Time handling for forecast cycles and observation reports.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Represents a valid time for meteorological data.
///
/// Combines reference time (model run time) and forecast offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValidTime {
    /// Model run/reference time
    pub reference_time: DateTime<Utc>,
    /// Forecast hour offset from reference time
    pub forecast_hour: u32,
}

impl ValidTime {
    pub fn new(reference_time: DateTime<Utc>, forecast_hour: u32) -> Self {
        Self {
            reference_time,
            forecast_hour,
        }
    }

    /// Calculate the actual valid time (reference + forecast offset)
    pub fn valid_datetime(&self) -> DateTime<Utc> {
        self.reference_time + Duration::hours(self.forecast_hour as i64)
    }

    /// Short label such as `20240115t06z+009`.
    pub fn label(&self) -> String {
        format!(
            "{}+{:03}",
            self.reference_time.format("%Y%m%dt%Hz"),
            self.forecast_hour
        )
    }
}

impl std::fmt::Display for ValidTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Resolve a report's day-of-month/hour/minute group against a reference time.
///
/// Reports only carry the day of month. The result is the latest instant with
/// that day/hour/minute not later than `reference + 1 hour`, stepping back one
/// month at a time (at most twelve) when the day does not fit. Returns `None`
/// for an impossible day/hour/minute.
pub fn resolve_day_time(
    day: u32,
    hour: u32,
    minute: u32,
    reference: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if !(1..=31).contains(&day) || hour > 23 || minute > 59 {
        return None;
    }

    let limit = reference + Duration::hours(1);
    let first_of_month = NaiveDate::from_ymd_opt(reference.year(), reference.month(), 1)?;

    for back in 0..=12u32 {
        let month_start = first_of_month.checked_sub_months(Months::new(back))?;
        let Some(date) = NaiveDate::from_ymd_opt(month_start.year(), month_start.month(), day) else {
            continue;
        };
        let candidate = Utc.from_utc_datetime(&date.and_hms_opt(hour, minute, 0)?);
        if candidate <= limit {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_valid_datetime() {
        let vt = ValidTime::new(utc(2024, 1, 15, 6, 0), 9);
        assert_eq!(vt.valid_datetime(), utc(2024, 1, 15, 15, 0));
        assert_eq!(vt.label(), "20240115t06z+009");
    }

    #[test]
    fn test_resolve_same_month() {
        let t = resolve_day_time(12, 16, 54, utc(2024, 3, 12, 17, 10)).unwrap();
        assert_eq!(t, utc(2024, 3, 12, 16, 54));
    }

    #[test]
    fn test_resolve_rolls_back_month() {
        // Report from the 31st seen on the 1st of the next month
        let t = resolve_day_time(31, 23, 50, utc(2024, 4, 1, 0, 10)).unwrap();
        assert_eq!(t, utc(2024, 3, 31, 23, 50));
    }

    #[test]
    fn test_resolve_skips_short_month() {
        // April has no 31st
        let t = resolve_day_time(31, 12, 0, utc(2024, 4, 15, 0, 0)).unwrap();
        assert_eq!(t, utc(2024, 3, 31, 12, 0));
    }

    #[test]
    fn test_resolve_rejects_invalid() {
        assert!(resolve_day_time(0, 12, 0, utc(2024, 4, 15, 0, 0)).is_none());
        assert!(resolve_day_time(12, 24, 0, utc(2024, 4, 15, 0, 0)).is_none());
    }
}
