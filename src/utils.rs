//! Utility functions shared by the resource layer

use chrono::{DateTime, TimeZone, Utc};

/// Formats a DateTime to SCIM 2.0 compliant XSD dateTime format
///
/// SCIM 2.0 (RFC 7644) requires XSD dateTime format as specified in Section 3.3.7
/// of XML Schema. Timestamps are rendered with millisecond precision.
///
/// Example output: "2025-06-14T10:03:54.374Z"
pub fn format_scim_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Formats a `crdate` / `tstamp` column (seconds since the Unix epoch)
///
/// Returns `None` for values chrono cannot represent.
pub fn format_epoch_seconds(seconds: i64) -> Option<String> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .map(format_scim_datetime)
}

/// Splits a comma separated query parameter into trimmed, non-empty items
pub fn split_comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
