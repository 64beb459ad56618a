// Timestamp normalization for loaded rows

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;

// per-row timestamp failure, the store drops the row instead of surfacing it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unparsable timestamp {value:?}")]
pub struct ParseError {
    pub value: String,
}

impl ParseError {
    pub fn new(value: &str) -> Self {
        Self { value: value.to_string() }
    }
}

// naive layouts tried in order, all read as UTC
const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parse one timestamp cell into a UTC instant.
///
/// Accepts RFC 3339 (any offset, converted to UTC), the common naive
/// `date time` layouts and a bare `YYYY-MM-DD` date (midnight).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ParseError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ParseError::new(raw));
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    // "2024-01-05 10:00:00+02:00" style offsets
    if let Ok(ts) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(ts.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .ok_or_else(|| ParseError::new(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_naive_layouts() {
        let expected = Utc.with_ymd_and_hms(2024, 2, 8, 10, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-02-08 10:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-02-08T10:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024/02/08 10:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-02-08 10:30").unwrap(), expected);
        assert_eq!(parse_timestamp("  2024-02-08 10:30:00 ").unwrap(), expected);
    }

    #[test]
    fn test_rfc3339_converted_to_utc() {
        let ts = parse_timestamp("2024-02-08T12:30:00+02:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 2, 8, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_fractional_seconds_kept() {
        let ts = parse_timestamp("2024-02-08 10:30:00.250").unwrap();
        assert_eq!(ts.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_bare_date_is_midnight() {
        let ts = parse_timestamp("2024-02-08").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 2, 8, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("not a date").is_err());
        assert!(parse_timestamp("2024-13-45 99:00:00").is_err());
        assert_eq!(parse_timestamp("yesterday").unwrap_err().value, "yesterday");
    }

    #[test]
    fn test_slash_dates_without_year_first_rejected() {
        // day/month order is ambiguous, such rows are dropped instead of guessed
        assert!(parse_timestamp("01/02/2024 10:00:00").is_err());
        assert!(parse_timestamp("13/02/2024 10:00:00").is_err());
        assert!(parse_timestamp("2024/01/02 10:00:00").is_ok());
    }
}
