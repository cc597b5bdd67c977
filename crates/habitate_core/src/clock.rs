//! Wall-clock and calendar-date helpers.
//!
//! Storage keeps instants as Unix epoch milliseconds and calendar days as
//! ISO `YYYY-MM-DD` text; these helpers are the only conversion points.

use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

const ISO_DATE_FORMAT: &str = "%Y-%m-%d";
static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("valid ISO date regex"));

/// Current time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Parses a strict ISO calendar date (`2026-01-02`).
///
/// Only the zero-padded `YYYY-MM-DD` shape is accepted.
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if !ISO_DATE_RE.is_match(value) {
        return None;
    }
    NaiveDate::parse_from_str(value, ISO_DATE_FORMAT).ok()
}

pub fn format_iso_date(date: NaiveDate) -> String {
    date.format(ISO_DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::{format_iso_date, parse_iso_date};

    #[test]
    fn iso_dates_parse_and_format() {
        let date = parse_iso_date(" 2026-01-02 ").expect("valid ISO date");
        assert_eq!(format_iso_date(date), "2026-01-02");
        assert!(parse_iso_date("2026-02-30").is_none());
        assert!(parse_iso_date("02/01/2026").is_none());
    }

    #[test]
    fn unpadded_and_signed_dates_are_rejected() {
        assert!(parse_iso_date("2026-1-2").is_none());
        assert!(parse_iso_date("+2026-01-02").is_none());
        assert!(parse_iso_date("2026-01-02T00:00").is_none());
        assert!(parse_iso_date("20260-01-02").is_none());
    }
}
