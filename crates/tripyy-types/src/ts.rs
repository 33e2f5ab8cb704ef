//! Timestamp helpers.
//!
//! All timestamps are stored as RFC 3339 strings with millisecond precision
//! in UTC ("2026-08-29T12:00:00.000Z"). The fixed width keeps string
//! comparison equivalent to chronological comparison, which the expiry
//! queries rely on.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

pub fn fmt(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now() -> String {
    fmt(Utc::now())
}

/// `now - hours` as a stored-timestamp string, for expiry cutoffs.
pub fn hours_ago(hours: i64) -> String {
    fmt(Utc::now() - Duration::hours(hours))
}

pub fn hours_from_now(hours: i64) -> String {
    fmt(Utc::now() + Duration::hours(hours))
}

pub fn days_ago(days: i64) -> String {
    fmt(Utc::now() - Duration::days(days))
}

pub fn parse(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_ordering() {
        let a = fmt(Utc::now());
        let b = fmt(Utc::now() + Duration::hours(1));
        assert!(a < b);
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn roundtrip() {
        let s = now();
        let t = parse(&s).unwrap();
        assert_eq!(fmt(t), s);
    }
}
