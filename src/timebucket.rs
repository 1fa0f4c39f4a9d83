//! Half-hour rate window arithmetic
//!
//! Pure helpers mapping wall-clock instants onto 30-minute tariff windows.
//! All functions operate in whatever zone the caller's `DateTime` carries;
//! converting into the market's civil zone happens before calling them.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike};

use crate::error::{AgileWatchError, Result};

/// Length of one tariff window in minutes
pub const WINDOW_MINUTES: i64 = 30;

/// Length of one tariff window
pub fn window_length() -> Duration {
    Duration::minutes(WINDOW_MINUTES)
}

/// Start of the 30-minute window containing `instant`.
///
/// Seconds and sub-second fields are zeroed and the minute becomes 0 or 30.
/// Implemented as a subtraction so the result stays a valid instant across
/// daylight-saving transitions.
pub fn floor30<Tz: TimeZone>(instant: &DateTime<Tz>) -> DateTime<Tz> {
    let over = i64::from(instant.minute() % 30) * 60 + i64::from(instant.second());
    let nanos = i64::from(instant.nanosecond());
    instant.clone() - Duration::seconds(over) - Duration::nanoseconds(nanos)
}

/// End of the window starting at `start`
pub fn window_end<Tz: TimeZone>(start: &DateTime<Tz>) -> DateTime<Tz> {
    start.clone() + window_length()
}

/// Smallest window boundary strictly after `instant`.
///
/// An instant sitting exactly on a boundary advances to the following one.
pub fn next_boundary<Tz: TimeZone>(instant: &DateTime<Tz>) -> DateTime<Tz> {
    window_end(&floor30(instant))
}

/// True when `instant` is exactly a window start
pub fn is_boundary<Tz: TimeZone>(instant: &DateTime<Tz>) -> bool {
    floor30(instant) == *instant
}

/// Local midnight at the start of `date` in `tz`.
///
/// Zones that skip midnight on a DST change resolve to the earliest valid
/// instant of that day.
pub fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Result<DateTime<Tz>> {
    let naive = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AgileWatchError::generic(format!("invalid date {}", date)))?;
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return Ok(dt);
    }
    // Midnight falls in a DST gap; walk forward to the first valid minute
    (1..=120)
        .filter_map(|m| tz.from_local_datetime(&(naive + Duration::minutes(m))).earliest())
        .next()
        .ok_or_else(|| AgileWatchError::generic(format!("no valid local midnight for {}", date)))
}

/// Two calendar days of windows starting at local midnight of `now`'s date.
///
/// Returns `(period_from, period_to)` where `period_to` is midnight two days
/// later, so a DST change inside the span yields 46 or 50 windows instead of 96.
pub fn two_day_span<Tz: TimeZone>(now: &DateTime<Tz>) -> Result<(DateTime<Tz>, DateTime<Tz>)> {
    let tz = now.timezone();
    let today = now.date_naive();
    let end_date = today
        .checked_add_days(chrono::Days::new(2))
        .ok_or_else(|| AgileWatchError::generic(format!("date overflow after {}", today)))?;
    Ok((local_midnight(&tz, today)?, local_midnight(&tz, end_date)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use chrono_tz::Europe::London;

    fn london(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<chrono_tz::Tz> {
        London
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .single()
            .unwrap()
    }

    #[test]
    fn floor30_rounds_down_to_half_hour() {
        assert_eq!(floor30(&london(2024, 1, 1, 10, 17, 42)), london(2024, 1, 1, 10, 0, 0));
        assert_eq!(floor30(&london(2024, 1, 1, 10, 30, 0)), london(2024, 1, 1, 10, 30, 0));
        assert_eq!(floor30(&london(2024, 1, 1, 10, 59, 59)), london(2024, 1, 1, 10, 30, 0));
        assert_eq!(floor30(&london(2024, 1, 1, 0, 0, 1)), london(2024, 1, 1, 0, 0, 0));
    }

    #[test]
    fn floor30_clears_subsecond_fields() {
        let t = london(2024, 6, 1, 12, 44, 3) + Duration::milliseconds(250);
        let f = floor30(&t);
        assert_eq!(f.nanosecond(), 0);
        assert_eq!(f, london(2024, 6, 1, 12, 30, 0));
    }

    #[test]
    fn floor30_holds_window_invariants_over_a_day() {
        let start = london(2024, 3, 30, 0, 0, 0);
        // 7 minute 13 second stride covers every minute offset within a window
        for i in 0..400 {
            let t = start + Duration::seconds(i * 433);
            let f = floor30(&t);
            assert!(f.minute() == 0 || f.minute() == 30);
            assert_eq!(f.second(), 0);
            assert!(f <= t);
            assert!(t < window_end(&f));
            assert_eq!(floor30(&f), f);
        }
    }

    #[test]
    fn next_boundary_is_strictly_later() {
        let t = london(2024, 1, 1, 10, 12, 0);
        assert_eq!(next_boundary(&t), london(2024, 1, 1, 10, 30, 0));

        let on = london(2024, 1, 1, 10, 30, 0);
        assert!(is_boundary(&on));
        assert_eq!(next_boundary(&on), london(2024, 1, 1, 11, 0, 0));

        let late = london(2024, 1, 1, 23, 45, 0);
        assert_eq!(next_boundary(&late), london(2024, 1, 2, 0, 0, 0));
    }

    #[test]
    fn next_boundary_is_one_window_past_floor() {
        let start = london(2024, 10, 26, 22, 0, 0);
        for i in 0..300 {
            let t = start + Duration::seconds(i * 137);
            let nb = next_boundary(&t);
            assert!(nb > t);
            assert_eq!(nb - floor30(&t), window_length());
        }
    }

    #[test]
    fn floor30_across_spring_forward() {
        // 2024-03-31 01:00 GMT jumps to 02:00 BST
        let utc = Utc.with_ymd_and_hms(2024, 3, 31, 1, 10, 0).unwrap();
        let local = utc.with_timezone(&London);
        assert_eq!(local.hour(), 2);
        let f = floor30(&local);
        assert_eq!(f.hour(), 2);
        assert_eq!(f.minute(), 0);
        assert_eq!(
            f.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2024, 3, 31, 1, 0, 0).unwrap()
        );
    }

    #[test]
    fn two_day_span_starts_at_local_midnight() {
        let now = london(2024, 1, 1, 15, 47, 0);
        let (from, to) = two_day_span(&now).unwrap();
        assert_eq!(from, london(2024, 1, 1, 0, 0, 0));
        assert_eq!(to, london(2024, 1, 3, 0, 0, 0));
        assert_eq!(to - from, Duration::hours(48));
    }

    #[test]
    fn two_day_span_is_shorter_over_spring_forward() {
        let now = london(2024, 3, 31, 9, 0, 0);
        let (from, to) = two_day_span(&now).unwrap();
        assert_eq!(to - from, Duration::hours(47));
    }

    #[test]
    fn two_day_span_is_longer_over_fall_back() {
        // 2024-10-27 02:00 BST falls back to 01:00 GMT
        let now = london(2024, 10, 27, 9, 0, 0);
        let (from, to) = two_day_span(&now).unwrap();
        assert_eq!(to - from, Duration::hours(49));

        let mut starts = Vec::new();
        let mut w = from;
        while w < to {
            starts.push(w);
            w = window_end(&w);
        }
        assert_eq!(starts.len(), 98);

        // Local 01:15 happens twice; each occurrence lands in its own window
        let bst = Utc
            .with_ymd_and_hms(2024, 10, 27, 0, 15, 0)
            .unwrap()
            .with_timezone(&London);
        let gmt = Utc
            .with_ymd_and_hms(2024, 10, 27, 1, 15, 0)
            .unwrap()
            .with_timezone(&London);
        assert_eq!((bst.hour(), bst.minute()), (1, 15));
        assert_eq!((gmt.hour(), gmt.minute()), (1, 15));

        let index = |t: &DateTime<chrono_tz::Tz>| starts.iter().position(|s| *s == floor30(t));
        assert_eq!(index(&bst), Some(2));
        assert_eq!(index(&gmt), Some(4));
        assert_eq!(next_boundary(&bst) - bst, Duration::minutes(15));
        assert_eq!(next_boundary(&gmt) - gmt, Duration::minutes(15));
    }
}
