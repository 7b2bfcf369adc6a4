//! Flexible timestamp parsing.
//!
//! Producers write `@timestamp` in many shapes. Accepted, in order:
//!
//! - RFC 3339 (`2024-01-01T00:00:00Z`, `2024-01-01T02:00:00.5+02:00`)
//! - RFC 3339-like with a space separator and/or a compact offset (`+0200`)
//! - RFC 2822 (`Mon, 01 Jan 2024 00:00:00 +0000`)
//! - Zone-less date-times and plain dates, read as UTC

use crate::error::TimestampError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const OFFSET_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

const NAIVE_LAYOUTS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a timestamp string into a UTC instant.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, TimestampError> {
    let s = s.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }

    for layout in OFFSET_LAYOUTS {
        if let Ok(ts) = DateTime::parse_from_str(s, layout) {
            return Ok(ts.with_timezone(&Utc));
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc2822(s) {
        return Ok(ts.with_timezone(&Utc));
    }

    for layout in NAIVE_LAYOUTS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, layout) {
            return Ok(ts.and_utc());
        }
    }

    if let Some(midnight) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }

    Err(TimestampError(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_rfc3339_variants() {
        assert_eq!(
            parse_timestamp("2024-01-01T00:00:00Z").unwrap(),
            utc("2024-01-01T00:00:00Z")
        );
        assert_eq!(
            parse_timestamp("2024-01-01T02:00:00.250+02:00").unwrap(),
            utc("2024-01-01T00:00:00.250Z")
        );
    }

    #[test]
    fn test_space_separator_and_compact_offset() {
        assert_eq!(
            parse_timestamp("2024-01-01 01:00:00+0100").unwrap(),
            utc("2024-01-01T00:00:00Z")
        );
        assert_eq!(
            parse_timestamp("2024-01-01T01:00:00.5+0100").unwrap(),
            utc("2024-01-01T00:00:00.5Z")
        );
    }

    #[test]
    fn test_rfc2822() {
        assert_eq!(
            parse_timestamp("Mon, 01 Jan 2024 00:00:00 +0000").unwrap(),
            utc("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_zoneless_is_utc() {
        assert_eq!(
            parse_timestamp("2024-01-01T12:30:00.123").unwrap(),
            utc("2024-01-01T12:30:00.123Z")
        );
        assert_eq!(
            parse_timestamp("2024-01-01 12:30:00").unwrap(),
            utc("2024-01-01T12:30:00Z")
        );
        assert_eq!(
            parse_timestamp("2024-01-01").unwrap(),
            utc("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert_eq!(
            parse_timestamp("yesterday"),
            Err(TimestampError("yesterday".to_string()))
        );
        assert_err!(parse_timestamp(""));
        assert_err!(parse_timestamp("2024-13-45T00:00:00Z"));
    }
}
