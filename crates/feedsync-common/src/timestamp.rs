//! Timestamp formatting for stored cursor values
//!
//! Cursor columns are stored as fixed-width UTC text so that lexical order
//! matches chronological order on every supported database.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{CommonError, Result};

/// Storage format: `2024-01-18T10:30:00.000000Z`
pub const STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Rollover suffix format: `20240118103000.000000`
pub const ROLLOVER_FORMAT: &str = "%Y%m%d%H%M%S%.6f";

/// Width of a formatted storage timestamp
pub const STORAGE_WIDTH: usize = 27;

/// Format a timestamp for storage
pub fn format(ts: &DateTime<Utc>) -> String {
    ts.format(STORAGE_FORMAT).to_string()
}

/// Format a timestamp as a rollover file suffix
pub fn rollover_suffix(ts: &DateTime<Utc>) -> String {
    ts.format(ROLLOVER_FORMAT).to_string()
}

/// Parse RFC 3339, a zone-less date-time (taken as UTC), or a bare `YYYY-MM-DD` date.
pub fn parse(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Ok(ts) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(ts.and_utc());
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or_else(|| CommonError::invalid_timestamp(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_is_fixed_width() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 18, 10, 30, 0).unwrap();
        let formatted = format(&ts);
        assert_eq!(formatted, "2024-01-18T10:30:00.000000Z");
        assert_eq!(formatted.len(), STORAGE_WIDTH);
    }

    #[test]
    fn test_parse_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 18, 0, 0, 0).unwrap();
        assert_eq!(parse("2024-01-18").unwrap(), expected);
        assert_eq!(parse("2024-01-18T00:00:00Z").unwrap(), expected);
        assert_eq!(parse("2024-01-18T10:00:00+10:00").unwrap(), expected);
        assert_eq!(parse("2024-01-18T00:00:00.000").unwrap(), expected);
    }

    #[test]
    fn test_parse_round_trips_storage_format() {
        let ts = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(parse(&format(&ts)).unwrap(), ts);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("yesterday").is_err());
        assert!(parse("2024-13-01").is_err());
    }

    #[test]
    fn test_rollover_suffix() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 18, 10, 30, 5).unwrap();
        assert_eq!(rollover_suffix(&ts), "20240118103005.000000");
    }
}
