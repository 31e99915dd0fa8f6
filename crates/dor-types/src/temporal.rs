use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use crate::error::TypeError;

/// All repository timestamps are UTC.
pub type Timestamp = DateTime<Utc>;

/// The current wall-clock time in UTC.
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Render a timestamp as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp.
///
/// Accepts RFC 3339 with any offset, and the offset-less forms
/// `YYYY-MM-DDTHH:MM:SS[.fff]` (read as UTC) that older documents carry.
pub fn parse_timestamp(s: &str) -> Result<Timestamp, TypeError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(TypeError::InvalidTimestamp(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_uses_millis_and_z() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-01T12:30:05.000Z");
    }

    #[test]
    fn parse_accepts_offsets() {
        let ts = parse_timestamp("2024-03-01T14:30:05+02:00").unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-01T12:30:05.000Z");
    }

    #[test]
    fn parse_accepts_naive_forms() {
        assert!(parse_timestamp("2024-03-01T12:30:05").is_ok());
        assert!(parse_timestamp("2024-03-01T12:30:05.250").is_ok());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(TypeError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn format_parse_roundtrip() {
        let now = now_utc();
        let parsed = parse_timestamp(&format_timestamp(&now)).unwrap();
        assert_eq!(
            parsed.timestamp_millis(),
            now.timestamp_millis()
        );
    }
}
