//! Cell-level parsers shared by inference and typing.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex_lite::Regex;
use std::sync::LazyLock;

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?|\.\d+)$")
        .expect("valid number regex")
});

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://[^\s/$.?#][^\s]*$").expect("valid url regex"));

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// A parsed date or date-time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temporal {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

/// `true`/`false`/`yes`/`no`, case-insensitive.
pub fn parse_boolean(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

/// ISO-8601 dates and date-times, RFC 3339 and a few common layouts.
pub fn parse_temporal(value: &str) -> Option<Temporal> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(Temporal::DateTime(dt.naive_utc()));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(Temporal::DateTime(dt));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            return Some(Temporal::Date(d));
        }
    }
    None
}

/// Integer or decimal with optional sign and thousands separators.
pub fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim();
    if !NUMBER_RE.is_match(value) {
        return None;
    }
    value.replace(',', "").parse().ok()
}

pub(crate) fn is_url(value: &str) -> bool {
    URL_RE.is_match(value.trim())
}

pub(crate) fn is_email(value: &str) -> bool {
    EMAIL_RE.is_match(value.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans() {
        assert_eq!(parse_boolean("TRUE"), Some(true));
        assert_eq!(parse_boolean("No"), Some(false));
        assert_eq!(parse_boolean("1"), None);
    }

    #[test]
    fn numbers_with_separators() {
        assert_eq!(parse_number("1,234.50"), Some(1234.5));
        assert_eq!(parse_number("-42"), Some(-42.0));
        assert_eq!(parse_number(".5"), Some(0.5));
        assert_eq!(parse_number("1,23"), None);
        assert_eq!(parse_number("12abc"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn dates_and_datetimes() {
        assert_eq!(
            parse_temporal("2024-01-01"),
            Some(Temporal::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()))
        );
        assert!(matches!(parse_temporal("2024-01-01T10:30:00Z"), Some(Temporal::DateTime(_))));
        assert!(matches!(parse_temporal("2024-01-01 10:30"), Some(Temporal::DateTime(_))));
        assert!(matches!(parse_temporal("03/15/2024"), Some(Temporal::Date(_))));
        assert!(matches!(parse_temporal("Mar 15, 2024"), Some(Temporal::Date(_))));
        assert_eq!(parse_temporal("9.99"), None);
        assert_eq!(parse_temporal("2024"), None);
    }

    #[test]
    fn urls_and_emails() {
        assert!(is_url("https://example.com/a?b=c"));
        assert!(!is_url("example.com"));
        assert!(is_email("ada@example.com"));
        assert!(!is_email("ada@example"));
    }
}
