// Timestamp parsing for artifact documents

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Parse a timestamp into unix seconds.
///
/// Accepts RFC 3339, `%Y-%m-%dT%H:%M:%S` / `%Y-%m-%d %H:%M:%S` (UTC),
/// `%Y-%m-%d` (midnight UTC) and plain unix seconds. Anything else is `None`.
pub fn parse_timestamp(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<i64>() {
        return Some(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive).timestamp());
        }
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight).timestamp())
}

/// Latest of the candidates that are present; unparsable ones were already dropped
pub fn latest<I>(candidates: I) -> Option<i64>
where
    I: IntoIterator<Item = Option<i64>>,
{
    candidates.into_iter().flatten().max()
}

/// Format a unix timestamp in local time for display
pub fn format_timestamp(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => ts.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp("2024-01-02T03:04:05Z"), Some(1704164645));
        assert_eq!(parse_timestamp("2024-01-02T05:04:05+02:00"), Some(1704164645));
        assert_eq!(parse_timestamp("2024-01-02 03:04:05"), Some(1704164645));
        assert_eq!(parse_timestamp("2024-01-02T03:04:05.250"), Some(1704164645));
        assert_eq!(parse_timestamp("2024-01-02"), Some(1704153600));
        assert_eq!(parse_timestamp("1704164645"), Some(1704164645));
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday-ish"), None);
        assert_eq!(parse_timestamp("2024-13-45"), None);
    }

    #[test]
    fn test_latest_skips_missing() {
        assert_eq!(latest([Some(5), None, Some(9), Some(2)]), Some(9));
        assert_eq!(latest([None, None]), None);
        assert_eq!(latest(Vec::<Option<i64>>::new()), None);
    }
}
