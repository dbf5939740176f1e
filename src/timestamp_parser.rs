use crate::models::ReportTimezone;
use anyhow::Result;
use chrono::{DateTime, Local, NaiveDateTime, Utc};

/// Handles parsing timestamps from the formats found in Claude usage logs
/// and turning them into report keys.
pub struct TimestampParser;

impl TimestampParser {
    /// Parse a timestamp string into a DateTime<Utc>.
    /// Accepts RFC 3339 (`Z` or offset) and naive ISO 8601, read as UTC.
    pub fn parse(timestamp_str: &str) -> Result<DateTime<Utc>> {
        let timestamp_str = timestamp_str.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp_str) {
            return Ok(dt.with_timezone(&Utc));
        }

        if let Ok(naive) = NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
        }

        anyhow::bail!("Failed to parse timestamp: {}", timestamp_str)
    }

    /// `YYYY-MM-DD` of the instant in the given calendar.
    pub fn date_key(timestamp: &DateTime<Utc>, tz: ReportTimezone) -> String {
        match tz {
            ReportTimezone::Utc => timestamp.format("%Y-%m-%d").to_string(),
            ReportTimezone::Local => timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d")
                .to_string(),
        }
    }

    /// `YYYY-MM` prefix of a `YYYY-MM-DD` date key.
    pub fn month_key(date_key: &str) -> &str {
        date_key.get(..7).unwrap_or(date_key)
    }

    /// `YYYYMMDD` form used for range comparisons.
    pub fn compact_date(date_key: &str) -> String {
        date_key.replace('-', "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_z_suffix() {
        let result = TimestampParser::parse("2024-01-01T12:00:00.000Z").unwrap();
        assert_eq!(result, Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_timezone() {
        let result = TimestampParser::parse("2024-01-01T12:00:00.000+02:00").unwrap();
        assert_eq!(result, Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_naive() {
        let result = TimestampParser::parse("2024-01-01T12:00:00.000");
        assert!(result.is_ok());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(TimestampParser::parse("invalid").is_err());
        assert!(TimestampParser::parse("").is_err());
    }

    #[test]
    fn test_keys() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 23, 30, 0).unwrap();
        let date = TimestampParser::date_key(&ts, ReportTimezone::Utc);
        assert_eq!(date, "2024-03-09");
        assert_eq!(TimestampParser::month_key(&date), "2024-03");
        assert_eq!(TimestampParser::compact_date(&date), "20240309");
    }
}
