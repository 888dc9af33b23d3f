//! HTTP-date formatting and parsing.

use chrono::{DateTime, Utc};

/// IMF-fixdate layout, e.g. `Sat, 23 Jul 2005 21:20:01 GMT`.
pub const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Format seconds since the Unix epoch as an HTTP date.
pub fn format_http_date(secs: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.format(HTTP_DATE_FORMAT).to_string())
}

/// Parse an HTTP date into seconds since the Unix epoch.
pub fn parse_http_date(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.timestamp())
}
