//! RFC 1123 and ISO 8601 date formatting/parsing.
//!
//! The distilled spec treats date formatters as an external, pure-function
//! dependency; this wraps `chrono` the way `webdav_adapter.rs` calls
//! `to_rfc2822`/`to_rfc3339` directly, but centralizes the exact wire forms
//! spec.md §6 requires (RFC 1123 in GMT, ISO 8601 with a literal `+00:00`).

use chrono::{DateTime, NaiveDateTime, Utc};

/// Formats a timestamp as an RFC 1123 date in GMT, e.g.
/// `Mon, 01 Aug 2026 12:00:00 GMT`.
pub fn format_rfc1123(dt: DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parses an RFC 1123 date in GMT. Returns `None` on malformed input.
pub fn parse_rfc1123(s: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), "%a, %d %b %Y %H:%M:%S GMT").ok()?;
    Some(DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// Formats a timestamp as ISO 8601 with a literal `+00:00` offset, e.g.
/// `2026-08-01T12:00:00+00:00`.
pub fn format_iso8601(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S+00:00").to_string()
}

/// Parses the `+00:00`-offset ISO 8601 form this crate emits.
pub fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%dT%H:%M:%S+00:00").ok()?;
    Some(DateTime::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rfc1123_round_trip() {
        let dt = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let formatted = format_rfc1123(dt);
        assert_eq!(formatted, "Sat, 01 Aug 2026 12:00:00 GMT");
        assert_eq!(parse_rfc1123(&formatted).unwrap(), dt);
    }

    #[test]
    fn iso8601_round_trip() {
        let dt = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let formatted = format_iso8601(dt);
        assert_eq!(formatted, "2026-08-01T12:00:00+00:00");
        assert_eq!(parse_iso8601(&formatted).unwrap(), dt);
    }
}
