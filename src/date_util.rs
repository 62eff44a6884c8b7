use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};

/// Storage format for every timestamp column. Fixed-width, so lexical
/// order matches chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_timestamp(dt: NaiveDateTime) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

pub fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

/// Midnight at the start of the given instant's day.
pub fn start_of_day(dt: NaiveDateTime) -> NaiveDateTime {
    midnight(dt.date())
}

pub fn midnight(d: NaiveDate) -> NaiveDateTime {
    d.and_time(NaiveTime::MIN)
}

/// First day of the month containing `d`.
pub fn first_of_month(d: NaiveDate) -> NaiveDate {
    d - Duration::days(d.day0() as i64)
}

/// First day of the month after the one containing `d`.
pub fn first_of_next_month(d: NaiveDate) -> NaiveDate {
    first_of_month(first_of_month(d) + Duration::days(32))
}

/// First day of the month before the one containing `d`.
pub fn first_of_previous_month(d: NaiveDate) -> NaiveDate {
    first_of_month(first_of_month(d) - Duration::days(1))
}

/// Monday of the week containing `d`. Weeks start on Monday, so a Sunday
/// belongs to the week that began six days earlier.
pub fn monday_of(d: NaiveDate) -> NaiveDate {
    d - Duration::days(d.weekday().num_days_from_monday() as i64)
}

/// True if the instant renders with a four-digit year, the only form
/// [`TIMESTAMP_FORMAT`] text sorts chronologically in.
pub fn in_storage_range(dt: NaiveDateTime) -> bool {
    (1..=9999).contains(&dt.year())
}

/// Parse a calendar date supplied by a caller.
///
/// Accepts `YYYY-MM-DD`, an RFC 3339 timestamp (converted to the local
/// calendar date), or a naive `YYYY-MM-DDTHH:MM:SS`. Returns `None` for
/// anything else, including years outside `1..=9999`.
pub fn parse_calendar_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let date = if let Ok(d) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
        d
    } else if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        dt.with_timezone(&Local).date_naive()
    } else {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .ok()?
            .date()
    };
    (1..=9999).contains(&date.year()).then_some(date)
}

/// Round half up to `decimals` places (`2.5 -> 3`, `-2.5 -> -2`).
pub fn round_half_up(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor + 0.5).floor() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_first_of_month() {
        assert_eq!(first_of_month(date(2025, 1, 31)), date(2025, 1, 1));
        assert_eq!(first_of_month(date(2025, 3, 1)), date(2025, 3, 1));
    }

    #[test]
    fn test_first_of_next_month() {
        assert_eq!(first_of_next_month(date(2025, 1, 31)), date(2025, 2, 1));
        assert_eq!(first_of_next_month(date(2024, 2, 29)), date(2024, 3, 1));
        assert_eq!(first_of_next_month(date(2025, 12, 15)), date(2026, 1, 1));
    }

    #[test]
    fn test_first_of_previous_month() {
        assert_eq!(first_of_previous_month(date(2025, 3, 31)), date(2025, 2, 1));
        assert_eq!(first_of_previous_month(date(2025, 1, 1)), date(2024, 12, 1));
    }

    #[test]
    fn test_monday_of() {
        // 2025-06-11 is a Wednesday
        assert_eq!(monday_of(date(2025, 6, 11)), date(2025, 6, 9));
        assert_eq!(monday_of(date(2025, 6, 9)), date(2025, 6, 9));
        // Sunday belongs to the preceding Monday's week
        assert_eq!(monday_of(date(2025, 6, 15)), date(2025, 6, 9));
    }

    #[test]
    fn test_start_of_day() {
        let dt = date(2025, 6, 11).and_hms_opt(17, 45, 3).unwrap();
        assert_eq!(start_of_day(dt), date(2025, 6, 11).and_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_calendar_date() {
        assert_eq!(parse_calendar_date("2024-03-10"), Some(date(2024, 3, 10)));
        assert_eq!(parse_calendar_date(" 2024-03-10 "), Some(date(2024, 3, 10)));
        assert_eq!(
            parse_calendar_date("2024-03-10T08:30:00"),
            Some(date(2024, 3, 10))
        );
        assert!(parse_calendar_date("2024-03-10T12:00:00Z").is_some());
        assert_eq!(parse_calendar_date("not-a-date"), None);
        assert_eq!(parse_calendar_date("2024-02-30"), None);
        assert_eq!(parse_calendar_date(""), None);
        assert_eq!(parse_calendar_date("9999-12-31"), Some(date(9999, 12, 31)));
        assert_eq!(parse_calendar_date("+10000-01-01"), None);
        assert_eq!(parse_calendar_date("+262142-12-31"), None);
    }

    #[test]
    fn test_in_storage_range() {
        assert!(in_storage_range(midnight(date(1, 1, 1))));
        assert!(in_storage_range(midnight(date(9999, 12, 31))));
        assert!(!in_storage_range(midnight(date(10000, 1, 1))));
        assert!(!in_storage_range(midnight(date(0, 12, 31))));
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(39.5, 0), 40.0);
        assert_eq!(round_half_up(66.666, 0), 67.0);
        assert_eq!(round_half_up(2.25, 1), 2.3);
        assert_eq!(round_half_up(250.0, 2), 250.0);
        assert_eq!(round_half_up(-2.5, 0), -2.0);
        assert_eq!(round_half_up(0.0, 1), 0.0);
    }

    #[test]
    fn test_format_timestamp() {
        let dt = date(2025, 1, 5).and_hms_opt(9, 3, 0).unwrap();
        assert_eq!(format_timestamp(dt), "2025-01-05 09:03:00");
        assert_eq!(format_date(date(2025, 1, 5)), "2025-01-05");
    }
}
