//! Timestamp formatting for the store.
//!
//! Timestamps persist as fixed-width RFC 3339 text (microsecond precision,
//! numeric UTC offset) so that SQL string comparison agrees with
//! chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp for storage.
#[must_use]
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Parse a stored timestamp.
pub(crate) fn parse_ts(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_round_trip() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(parse_ts(&fmt_ts(ts)).unwrap(), ts);
    }

    #[test]
    fn test_lexicographic_order_matches_chronological() {
        let a = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        let c = a + chrono::Duration::hours(1);

        let (fa, fb, fc) = (fmt_ts(a), fmt_ts(b), fmt_ts(c));
        assert!(fa < fb);
        assert!(fb < fc);
        assert_eq!(fa.len(), fc.len());
    }
}
