use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::date_util::{
    first_of_month, first_of_next_month, first_of_previous_month, format_timestamp,
    in_storage_range, midnight, monday_of, parse_calendar_date, start_of_day,
};
use crate::error::{Error, Result};

/// Reporting period selector for the metrics dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsPeriod {
    Today,
    Week,
    #[default]
    Month,
    Custom,
}

impl MetricsPeriod {
    /// Parse a period selector.
    ///
    /// Supported values: `today`, `week`, `month`, `custom` (case-insensitive).
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "today" => Ok(MetricsPeriod::Today),
            "week" => Ok(MetricsPeriod::Week),
            "month" => Ok(MetricsPeriod::Month),
            "custom" => Ok(MetricsPeriod::Custom),
            other => Err(Error::PeriodParse(format!("unrecognized period: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricsPeriod::Today => "today",
            MetricsPeriod::Week => "week",
            MetricsPeriod::Month => "month",
            MetricsPeriod::Custom => "custom",
        }
    }
}

impl std::fmt::Display for MetricsPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller asked for. `from`/`to` are only consulted for `custom`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeRequest {
    pub period: MetricsPeriod,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl RangeRequest {
    pub fn new(period: MetricsPeriod) -> Self {
        Self {
            period,
            from: None,
            to: None,
        }
    }

    pub fn custom(from: &str, to: &str) -> Self {
        Self {
            period: MetricsPeriod::Custom,
            from: Some(from.to_string()),
            to: Some(to.to_string()),
        }
    }
}

/// A reporting window `[current_start, current_end)` and the equally long
/// window `[previous_start, previous_end)` that immediately precedes it
/// (calendar months excepted: those keep their natural lengths).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRanges {
    pub current_start: NaiveDateTime,
    pub current_end: NaiveDateTime,
    pub previous_start: NaiveDateTime,
    pub previous_end: NaiveDateTime,
}

impl DateRanges {
    /// Build from a current window, deriving a previous window of equal span.
    fn preceding_equal_span(current_start: NaiveDateTime, current_end: NaiveDateTime) -> Self {
        let span = current_end - current_start;
        Self {
            current_start,
            current_end,
            previous_start: current_start - span,
            previous_end: current_start,
        }
    }

    pub fn current_span(&self) -> Duration {
        self.current_end - self.current_start
    }

    pub fn previous_span(&self) -> Duration {
        self.previous_end - self.previous_start
    }

    /// Every bound renders as a fixed-width timestamp, so text comparison
    /// against stored rows stays chronological.
    fn fits_storage_format(&self) -> bool {
        [
            self.current_start,
            self.current_end,
            self.previous_start,
            self.previous_end,
        ]
        .into_iter()
        .all(in_storage_range)
    }

    /// The four bounds rendered in storage format, in
    /// `[current_start, current_end, previous_start, previous_end]` order.
    pub fn bound_keys(&self) -> [String; 4] {
        [
            format_timestamp(self.current_start),
            format_timestamp(self.current_end),
            format_timestamp(self.previous_start),
            format_timestamp(self.previous_end),
        ]
    }
}

/// Resolve a request into concrete windows relative to `now`.
pub fn resolve(request: &RangeRequest, now: NaiveDateTime) -> DateRanges {
    let ranges = match request.period {
        MetricsPeriod::Today => today_window(now),
        MetricsPeriod::Week => week_window(now),
        MetricsPeriod::Month => month_window(now),
        MetricsPeriod::Custom => {
            custom_window_or_month(request.from.as_deref(), request.to.as_deref(), now)
        }
    };
    log::debug!(
        "Resolved {} window: current [{}, {}), previous [{}, {})",
        request.period,
        ranges.current_start,
        ranges.current_end,
        ranges.previous_start,
        ranges.previous_end
    );
    ranges
}

/// `[midnight today, midnight tomorrow)` against the prior day.
pub fn today_window(now: NaiveDateTime) -> DateRanges {
    let start = start_of_day(now);
    DateRanges::preceding_equal_span(start, start + Duration::days(1))
}

/// Monday-based week against the preceding seven days.
pub fn week_window(now: NaiveDateTime) -> DateRanges {
    let start = midnight(monday_of(now.date()));
    DateRanges::preceding_equal_span(start, start + Duration::days(7))
}

/// Current calendar month against the prior calendar month.
pub fn month_window(now: NaiveDateTime) -> DateRanges {
    let first = first_of_month(now.date());
    DateRanges {
        current_start: midnight(first),
        current_end: midnight(first_of_next_month(first)),
        previous_start: midnight(first_of_previous_month(first)),
        previous_end: midnight(first),
    }
}

/// `[from, to + 1 day)` against the span of identical length before it.
/// `None` when either date does not parse, `from` is after `to`, or a bound
/// falls outside the years storage timestamps can represent.
pub fn custom_window(from: &str, to: &str) -> Option<DateRanges> {
    let from = parse_calendar_date(from)?;
    let to = parse_calendar_date(to)?;
    if from > to {
        return None;
    }
    let current_start = midnight(from);
    let current_end = midnight(to).checked_add_signed(Duration::days(1))?;
    let previous_start = current_start.checked_sub_signed(current_end - current_start)?;
    let ranges = DateRanges {
        current_start,
        current_end,
        previous_start,
        previous_end: current_start,
    };
    ranges.fits_storage_format().then_some(ranges)
}

/// The one place an unusable custom range is handled: it silently becomes
/// the current month instead of being rejected. Swap the fallback arm for an
/// `Err` here to turn this into a validation error.
pub fn custom_window_or_month(
    from: Option<&str>,
    to: Option<&str>,
    now: NaiveDateTime,
) -> DateRanges {
    match (from, to) {
        (Some(from), Some(to)) => custom_window(from, to).unwrap_or_else(|| {
            log::warn!("Unusable custom range {from:?}..{to:?}; using current month");
            month_window(now)
        }),
        _ => {
            log::warn!("Custom period without both from and to; using current month");
            month_window(now)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate, Weekday};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
        at(y, m, d, 0, 0)
    }

    #[test]
    fn test_parse_period() {
        assert_eq!(MetricsPeriod::parse("today").unwrap(), MetricsPeriod::Today);
        assert_eq!(MetricsPeriod::parse("WEEK").unwrap(), MetricsPeriod::Week);
        assert_eq!(MetricsPeriod::parse(" month ").unwrap(), MetricsPeriod::Month);
        assert_eq!(MetricsPeriod::parse("custom").unwrap(), MetricsPeriod::Custom);
        assert!(MetricsPeriod::parse("quarter").is_err());
    }

    #[test]
    fn test_default_request_is_month() {
        assert_eq!(RangeRequest::default().period, MetricsPeriod::Month);
    }

    #[test]
    fn test_today_window() {
        let r = today_window(at(2025, 3, 1, 15, 30));
        assert_eq!(r.current_start, day(2025, 3, 1));
        assert_eq!(r.current_end, day(2025, 3, 2));
        assert_eq!(r.previous_start, day(2025, 2, 28));
        assert_eq!(r.previous_end, r.current_start);
    }

    #[test]
    fn test_week_window_starts_monday() {
        // Wednesday
        let r = week_window(at(2025, 6, 11, 9, 0));
        assert_eq!(r.current_start, day(2025, 6, 9));
        assert_eq!(r.current_start.weekday(), Weekday::Mon);
        assert_eq!(r.current_end, day(2025, 6, 16));
        assert_eq!(r.previous_start, day(2025, 6, 2));
        assert_eq!(r.previous_end, r.current_start);
    }

    #[test]
    fn test_week_window_on_sunday() {
        let r = week_window(at(2025, 6, 15, 23, 59));
        assert_eq!(r.current_start, day(2025, 6, 9));
        assert_eq!(r.current_end, day(2025, 6, 16));
    }

    #[test]
    fn test_month_window_variable_length() {
        let r = month_window(at(2025, 3, 31, 12, 0));
        assert_eq!(r.current_start, day(2025, 3, 1));
        assert_eq!(r.current_end, day(2025, 4, 1));
        // February keeps its own length
        assert_eq!(r.previous_start, day(2025, 2, 1));
        assert_eq!(r.previous_end, day(2025, 3, 1));
        assert_eq!(r.previous_span(), Duration::days(28));
    }

    #[test]
    fn test_month_window_year_boundary() {
        let r = month_window(at(2025, 1, 15, 8, 0));
        assert_eq!(r.previous_start, day(2024, 12, 1));
        assert_eq!(r.current_end, day(2025, 2, 1));

        let r = month_window(at(2024, 12, 2, 8, 0));
        assert_eq!(r.current_end, day(2025, 1, 1));
    }

    #[test]
    fn test_windows_never_gap_or_overlap() {
        let instants = [
            at(2024, 2, 29, 0, 0),
            at(2024, 12, 31, 23, 59),
            at(2025, 1, 1, 0, 0),
            at(2025, 6, 15, 12, 0),
        ];
        for now in instants {
            for r in [today_window(now), week_window(now), month_window(now)] {
                assert_eq!(r.previous_end, r.current_start);
                assert!(r.current_start <= now && now < r.current_end);
            }
            assert_eq!(today_window(now).previous_span(), today_window(now).current_span());
            assert_eq!(week_window(now).previous_span(), Duration::days(7));
        }
    }

    #[test]
    fn test_custom_window_inclusive_of_to_day() {
        let r = custom_window("2024-03-01", "2024-03-10").unwrap();
        assert_eq!(r.current_start, day(2024, 3, 1));
        assert_eq!(r.current_end, day(2024, 3, 11));
        assert_eq!(r.previous_end, r.current_start);
        assert_eq!(r.previous_start, day(2024, 2, 20));
        assert_eq!(r.current_span(), r.previous_span());
    }

    #[test]
    fn test_custom_window_single_day() {
        let r = custom_window("2024-03-10", "2024-03-10").unwrap();
        assert_eq!(r.current_span(), Duration::days(1));
        assert_eq!(r.previous_start, day(2024, 3, 9));
    }

    #[test]
    fn test_custom_window_rejects_reversed_and_garbage() {
        assert!(custom_window("2024-03-10", "2024-03-01").is_none());
        assert!(custom_window("yesterday", "2024-03-01").is_none());
        assert!(custom_window("2024-03-01", "2024-13-01").is_none());
    }

    #[test]
    fn test_reversed_custom_range_falls_back_to_month() {
        let now = at(2025, 5, 20, 14, 0);
        let request = RangeRequest::custom("2024-03-10", "2024-03-01");
        assert_eq!(resolve(&request, now), month_window(now));
    }

    #[test]
    fn test_incomplete_custom_request_falls_back_to_month() {
        let now = at(2025, 5, 20, 14, 0);
        let request = RangeRequest {
            period: MetricsPeriod::Custom,
            from: Some("2025-05-01".into()),
            to: None,
        };
        assert_eq!(resolve(&request, now), month_window(now));
    }

    #[test]
    fn test_bound_keys() {
        let r = today_window(at(2025, 3, 1, 15, 30));
        assert_eq!(
            r.bound_keys(),
            [
                "2025-03-01 00:00:00".to_string(),
                "2025-03-02 00:00:00".to_string(),
                "2025-02-28 00:00:00".to_string(),
                "2025-03-01 00:00:00".to_string(),
            ]
        );
    }

    #[test]
    fn test_custom_window_rejects_five_digit_years() {
        // `to + 1 day` would render as "+10000-01-01 00:00:00".
        assert!(custom_window("2024-01-01", "9999-12-31").is_none());
        // Previous window would start before year 1.
        assert!(custom_window("0001-01-01", "0001-12-31").is_none());
        assert!(custom_window("9999-01-01", "9999-06-30").is_some());

        let now = at(2025, 3, 15, 12, 0);
        let request = RangeRequest::custom("2024-01-01", "9999-12-31");
        let r = resolve(&request, now);
        assert_eq!(r, month_window(now));
        assert!(r.bound_keys().iter().all(|k| k.len() == 19));
    }

    #[test]
    fn test_custom_window_at_calendar_limit_falls_back() {
        let now = at(2025, 3, 15, 12, 0);
        for to in ["+262142-12-31", "262143-12-31"] {
            let request = RangeRequest::custom("2024-01-01", to);
            assert_eq!(resolve(&request, now), month_window(now));
        }
        let max = NaiveDate::MAX.format("%Y-%m-%d").to_string();
        assert!(custom_window("2024-01-01", &max).is_none());
    }
}
