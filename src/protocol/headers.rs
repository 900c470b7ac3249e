//! Shared header parsing and formatting for Braid-HTTP.
//!
//! # Header Formats
//!
//! | Header | Format | Example |
//! |--------|--------|---------|
//! | Version | Single id, optionally quoted | `v1`, `"v1"` |
//! | Parents | Comma-separated ids | `a,b,c` |
//! | Content-Range | `{unit} {range}` | `json .field` |
//! | Subscribe | Truthy flag | `true`, `t`, `1` |
//! | Heartbeats | Number with optional unit | `30s`, `500ms`, `30` |
//!
//! # Examples
//!
//! ```
//! use braid_axum_server::protocol::{
//!     parse_version_list, format_version_list, parse_content_range, is_truthy,
//! };
//!
//! let parents = parse_version_list("a, \"b\",c");
//! assert_eq!(format_version_list(&parents), "a,b,c");
//!
//! let range = parse_content_range("json .field").unwrap();
//! assert_eq!(range.unit, "json");
//!
//! assert!(is_truthy("T"));
//! ```

use crate::error::{BraidError, Result};
use crate::types::ContentRange;
use std::time::Duration;

/// Strip one pair of surrounding double quotes, if present.
fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Parse a single version id from a `Version` header.
///
/// Surrounding whitespace and one pair of double quotes are removed, so both
/// `v1` and `"v1"` yield `v1`.
pub fn parse_version_id(value: &str) -> String {
    unquote(value.trim()).to_string()
}

/// Parse a comma-separated list of version ids (the `Parents` header).
///
/// Empty entries are skipped; an empty header yields an empty list.
///
/// ```
/// use braid_axum_server::protocol::parse_version_list;
///
/// assert_eq!(parse_version_list("v1,v2"), vec!["v1", "v2"]);
/// assert!(parse_version_list("").is_empty());
/// ```
pub fn parse_version_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|part| unquote(part.trim()))
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Format version ids as a comma-joined header value.
pub fn format_version_list(versions: &[String]) -> String {
    versions.join(",")
}

/// Parse Content-Range header.
///
/// Format: `"{unit} {range}"` (e.g., `"json .field"`). The range may itself
/// contain spaces; only the first one separates it from the unit.
///
/// # Errors
///
/// Returns an error if the value doesn't contain a space separator or either
/// side is empty.
pub fn parse_content_range(value: &str) -> Result<ContentRange> {
    match value.trim().split_once(' ') {
        Some((unit, range)) if !unit.is_empty() && !range.trim().is_empty() => {
            Ok(ContentRange::new(unit, range.trim()))
        }
        _ => Err(BraidError::HeaderParse(format!(
            "Invalid Content-Range: expected 'unit range', got '{}'",
            value
        ))),
    }
}

/// Format Content-Range header.
#[inline]
pub fn format_content_range(unit: &str, range: &str) -> String {
    format!("{} {}", unit, range)
}

/// Interpret a flag header such as `Subscribe`.
///
/// Truthy iff the value is, case-insensitively, one of `true`, `t` or `1`.
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("t") || value == "1"
}

/// Parse the `Patches` header of a request into a patch count.
///
/// # Errors
///
/// Returns [`BraidError::HeaderParse`] if the value is not a non-negative integer.
pub fn parse_patches_count(value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| BraidError::HeaderParse(format!("Invalid Patches count: {}", value)))
}

/// Longest heartbeat interval honored; larger requests are clamped to it.
pub const MAX_HEARTBEAT: Duration = Duration::from_secs(86_400);

/// Parse heartbeat interval.
///
/// | Format | Example | Result |
/// |--------|---------|--------|
/// | Seconds with suffix | `"5s"` | 5s |
/// | Milliseconds | `"500ms"` | 500ms |
/// | Plain number | `"30"` | 30s |
///
/// Values above [`MAX_HEARTBEAT`] are clamped to it.
///
/// # Errors
///
/// Returns an error if the value is not a non-negative number, or is too
/// large to be represented as a [`Duration`] at all.
pub fn parse_heartbeat(value: &str) -> Result<Duration> {
    let trimmed = value.trim();
    let invalid = || BraidError::HeaderParse(format!("Invalid heartbeat: {}", value));

    if let Some(ms_str) = trimmed.strip_suffix("ms") {
        return ms_str
            .trim()
            .parse::<u64>()
            .map(|ms| Duration::from_millis(ms).min(MAX_HEARTBEAT))
            .map_err(|_| invalid());
    }

    let secs_str = trimmed.strip_suffix('s').unwrap_or(trimmed);
    let secs: f64 = secs_str.trim().parse().map_err(|_| invalid())?;
    Duration::try_from_secs_f64(secs)
        .map(|delay| delay.min(MAX_HEARTBEAT))
        .map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_id_quoted() {
        assert_eq!(parse_version_id("\"v1\""), "v1");
        assert_eq!(parse_version_id(" v1 "), "v1");
    }

    #[test]
    fn test_parse_version_list() {
        assert_eq!(parse_version_list("a,b,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_version_list_quoted_and_spaced() {
        assert_eq!(parse_version_list(r#""v1", "v2""#), vec!["v1", "v2"]);
    }

    #[test]
    fn test_parse_version_list_empty() {
        assert!(parse_version_list("").is_empty());
        assert!(parse_version_list(" , ").is_empty());
    }

    #[test]
    fn test_format_version_list() {
        let versions = vec!["a".to_string(), "b".to_string()];
        assert_eq!(format_version_list(&versions), "a,b");
    }

    #[test]
    fn test_parse_content_range() {
        let range = parse_content_range("json .field").unwrap();
        assert_eq!(range.unit, "json");
        assert_eq!(range.range, ".field");
    }

    #[test]
    fn test_parse_content_range_complex() {
        let range = parse_content_range("json .users[0].name").unwrap();
        assert_eq!(range.unit, "json");
        assert_eq!(range.range, ".users[0].name");
    }

    #[test]
    fn test_parse_content_range_invalid() {
        assert!(parse_content_range("invalid").is_err());
        assert!(parse_content_range("json ").is_err());
    }

    #[test]
    fn test_format_content_range() {
        assert_eq!(format_content_range("bytes", "0:100"), "bytes 0:100");
    }

    #[test]
    fn test_is_truthy() {
        for value in ["true", "TRUE", "True", "t", "T", "1"] {
            assert!(is_truthy(value), "expected truthy: {}", value);
        }
        for value in ["false", "0", "yes", "", "tru"] {
            assert!(!is_truthy(value), "expected falsy: {}", value);
        }
    }

    #[test]
    fn test_parse_patches_count() {
        assert_eq!(parse_patches_count("3").unwrap(), 3);
        assert!(parse_patches_count("-1").is_err());
        assert!(parse_patches_count("many").is_err());
    }

    #[test]
    fn test_parse_heartbeat_seconds() {
        assert_eq!(parse_heartbeat("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_heartbeat("30").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_heartbeat_milliseconds() {
        assert_eq!(parse_heartbeat("500ms").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_heartbeat_invalid() {
        assert!(parse_heartbeat("abc").is_err());
        assert!(parse_heartbeat("-5s").is_err());
    }

    #[test]
    fn test_parse_heartbeat_unrepresentable_is_an_error() {
        assert!(parse_heartbeat("1e30").is_err());
        assert!(parse_heartbeat("inf").is_err());
        assert!(parse_heartbeat("NaN").is_err());
    }

    #[test]
    fn test_parse_heartbeat_clamps_to_maximum() {
        assert_eq!(parse_heartbeat("1e19").unwrap(), MAX_HEARTBEAT);
        assert_eq!(parse_heartbeat("18446744073709551615ms").unwrap(), MAX_HEARTBEAT);
        assert_eq!(parse_heartbeat("86400").unwrap(), MAX_HEARTBEAT);
        assert_eq!(parse_heartbeat("0").unwrap(), Duration::ZERO);
    }
}
