//! Time utility functions
//!
//! All timestamps handled by the metrics engine are epoch milliseconds.
//! Day-aligned computations use the configured timezone.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::data::types::MetricGranularity;

/// Date format accepted for traversal start dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Resolve a naive local datetime in `tz`, skipping forward over DST gaps
fn resolve_local(tz: Tz, local: NaiveDateTime, gap_step: Duration) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&local) {
        chrono::LocalResult::Single(dt) => Some(dt),
        chrono::LocalResult::Ambiguous(earliest, _) => Some(earliest),
        chrono::LocalResult::None => match tz.from_local_datetime(&(local + gap_step)) {
            chrono::LocalResult::Single(dt) => Some(dt),
            chrono::LocalResult::Ambiguous(earliest, _) => Some(earliest),
            chrono::LocalResult::None => None,
        },
    }
}

/// Start of the local day containing `date`
fn local_midnight(tz: Tz, date: NaiveDate) -> Option<DateTime<Tz>> {
    resolve_local(tz, date.and_time(NaiveTime::MIN), Duration::hours(1))
}

/// Granularity-aligned bucket timestamps covering `[start_ms, end_ms]`.
///
/// Minute and hour buckets are aligned on the epoch; day and week buckets start
/// at local midnight of the first day. Buckets then advance by the granularity
/// step until they pass `end_ms`.
pub fn new_time_intervals(
    start_ms: i64,
    end_ms: i64,
    granularity: MetricGranularity,
    tz: Tz,
) -> Vec<String> {
    let step_ms = granularity.seconds() * 1000;
    let truncated = match granularity {
        MetricGranularity::OneMinute | MetricGranularity::OneHour => {
            start_ms - start_ms.rem_euclid(step_ms)
        }
        MetricGranularity::OneDay | MetricGranularity::OneWeek => {
            let Some(start) = DateTime::from_timestamp_millis(start_ms) else {
                tracing::warn!(start_ms, "Invalid interval start, no buckets generated");
                return Vec::new();
            };
            match local_midnight(tz, start.with_timezone(&tz).date_naive()) {
                Some(midnight) => midnight.timestamp_millis(),
                None => return Vec::new(),
            }
        }
    };

    let mut buckets = Vec::new();
    let mut current = truncated;
    while current <= end_ms {
        buckets.push(current.to_string());
        current += step_ms;
    }
    buckets
}

/// Parse a `YYYY-MM-DD` date into the millisecond range
/// `00:00:00.000 ..= 23:59:59.999` of that day in `tz`.
pub fn parse_day_range(date: &str, tz: Tz) -> Result<(i64, i64), String> {
    let day = NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|e| format!("fail to parse start date {date}: {e}"))?;
    let start = local_midnight(tz, day).ok_or_else(|| format!("no local midnight for {date}"))?;
    let last_moment = day
        .and_hms_milli_opt(23, 59, 59, 999)
        .ok_or_else(|| format!("invalid end of day for {date}"))?;
    let end = resolve_local(tz, last_moment, Duration::hours(-1))
        .ok_or_else(|| format!("no local end of day for {date}"))?;
    Ok((start.timestamp_millis(), end.timestamp_millis()))
}

/// Local midnight `days` days before `now`, in epoch milliseconds
pub fn days_before_midnight_millis(now: DateTime<Utc>, days: u32, tz: Tz) -> i64 {
    let today = now.with_timezone(&tz).date_naive();
    let day = today - Duration::days(i64::from(days));
    local_midnight(tz, day)
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| {
            tracing::warn!(days, "No local midnight for critical point, using now");
            now.timestamp_millis()
        })
}

/// The day before `now` in `tz`, formatted as `YYYY-MM-DD`
pub fn yesterday(now: DateTime<Utc>, tz: Tz) -> String {
    (now.with_timezone(&tz).date_naive() - Duration::days(1))
        .format(DATE_FORMAT)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-01-01 00:00:00 UTC
    const JAN_1_2024: i64 = 1_704_067_200_000;
    const HOUR_MS: i64 = 3_600_000;
    const DAY_MS: i64 = 86_400_000;

    #[test]
    fn test_minute_intervals_truncate_start() {
        let start = JAN_1_2024 + 90_000; // 00:01:30
        let end = JAN_1_2024 + 5 * 60_000; // 00:05:00
        let buckets = new_time_intervals(start, end, MetricGranularity::OneMinute, Tz::UTC);
        assert_eq!(buckets.len(), 5);
        assert_eq!(buckets[0], (JAN_1_2024 + 60_000).to_string());
        assert_eq!(buckets[4], end.to_string());
    }

    #[test]
    fn test_hour_intervals_count() {
        let buckets = new_time_intervals(
            JAN_1_2024 + 10,
            JAN_1_2024 + 23 * HOUR_MS,
            MetricGranularity::OneHour,
            Tz::UTC,
        );
        assert_eq!(buckets.len(), 24);
    }

    #[test]
    fn test_day_intervals_align_to_local_midnight() {
        // 2024-01-01 10:00 in Shanghai is 02:00 UTC
        let start = JAN_1_2024 + 2 * HOUR_MS;
        let end = start + 2 * DAY_MS;
        let tz: Tz = "Asia/Shanghai".parse().unwrap();
        let buckets = new_time_intervals(start, end, MetricGranularity::OneDay, tz);
        // Shanghai midnight of 2024-01-01 is 2023-12-31 16:00 UTC
        let midnight = JAN_1_2024 - 8 * HOUR_MS;
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0], midnight.to_string());
        assert_eq!(buckets[1], (midnight + DAY_MS).to_string());
    }

    #[test]
    fn test_week_intervals_step_by_day() {
        let buckets = new_time_intervals(
            JAN_1_2024,
            JAN_1_2024 + 6 * DAY_MS,
            MetricGranularity::OneWeek,
            Tz::UTC,
        );
        assert_eq!(buckets.len(), 7);
    }

    #[test]
    fn test_empty_range_has_no_buckets() {
        let buckets = new_time_intervals(
            JAN_1_2024 + 5 * 60_000,
            JAN_1_2024,
            MetricGranularity::OneMinute,
            Tz::UTC,
        );
        assert!(buckets.is_empty());
    }

    #[test]
    fn test_parse_day_range() {
        let (start, end) = parse_day_range("2024-01-01", Tz::UTC).unwrap();
        assert_eq!(start, JAN_1_2024);
        assert_eq!(end, JAN_1_2024 + DAY_MS - 1);
    }

    #[test]
    fn test_parse_day_range_in_timezone() {
        let tz: Tz = "Asia/Shanghai".parse().unwrap();
        let (start, _) = parse_day_range("2024-01-01", tz).unwrap();
        assert_eq!(start, JAN_1_2024 - 8 * HOUR_MS);
    }

    #[test]
    fn test_parse_day_range_rejects_garbage() {
        assert!(parse_day_range("2024/01/01", Tz::UTC).is_err());
        assert!(parse_day_range("", Tz::UTC).is_err());
    }

    #[test]
    fn test_days_before_midnight() {
        let now = DateTime::from_timestamp_millis(JAN_1_2024 + 15 * HOUR_MS).unwrap();
        assert_eq!(
            days_before_midnight_millis(now, 3, Tz::UTC),
            JAN_1_2024 - 3 * DAY_MS
        );
        assert_eq!(days_before_midnight_millis(now, 0, Tz::UTC), JAN_1_2024);
    }

    #[test]
    fn test_yesterday() {
        let now = DateTime::from_timestamp_millis(JAN_1_2024 + HOUR_MS).unwrap();
        assert_eq!(yesterday(now, Tz::UTC), "2023-12-31");
    }
}
