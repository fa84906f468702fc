//! Strict parsing helpers shared by response parsers.
//!
//! Upstream JSON is loosely typed: counts and sizes arrive as numbers or as
//! strings. Every helper here either parses the whole value or fails, so a
//! single malformed field fails the response instead of being zeroed.

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde_json::Value;
use std::time::Duration;

use super::error::{IndexerError, ProtocolError};
use super::types::{CanonicalResult, ResponseEnvelope};

static SIZE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d+(?:\.\d+)?)\s*(b|bytes|kb|kib|mb|mib|gb|gib|tb|tib)?$")
        .expect("valid size pattern")
});

/// Reject replies the parser cannot handle before decoding the body.
pub fn check_envelope(envelope: &ResponseEnvelope, expected_type: &str) -> Result<(), IndexerError> {
    if envelope.status == 429 {
        let retry_after = envelope
            .header("retry-after")
            .and_then(|v| parse_retry_after(v, Utc::now()));
        return Err(IndexerError::RateLimited { retry_after });
    }

    if !envelope.is_success() {
        return Err(ProtocolError::UnexpectedStatus {
            status: envelope.status,
            excerpt: envelope.body.chars().take(200).collect(),
        }
        .into());
    }

    let actual = envelope.content_type();
    if actual.as_deref() != Some(expected_type) {
        return Err(ProtocolError::UnexpectedContentType {
            expected: expected_type.to_string(),
            actual,
        }
        .into());
    }

    Ok(())
}

/// `Retry-After` as delta-seconds or an HTTP date.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Unsigned integer from a JSON number or numeric string.
pub fn loose_u64(value: &Value, field: &str) -> Result<u64, IndexerError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| IndexerError::invalid_field(field, &n.to_string(), "not an unsigned integer")),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|e| IndexerError::invalid_field(field, s, e.to_string())),
        other => Err(IndexerError::invalid_field(
            field,
            &describe(other),
            "expected number or numeric string",
        )),
    }
}

pub fn loose_u32(value: &Value, field: &str) -> Result<u32, IndexerError> {
    let n = loose_u64(value, field)?;
    u32::try_from(n).map_err(|_| IndexerError::invalid_field(field, &n.to_string(), "out of range"))
}

/// Boolean from `true`/`false`, `1`/`0` or their string forms.
pub fn loose_bool(value: &Value, field: &str) -> Result<bool, IndexerError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) if n.as_u64() == Some(0) => Ok(false),
        Value::Number(n) if n.as_u64() == Some(1) => Ok(true),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" | "" => Ok(false),
            _ => Err(IndexerError::invalid_field(field, s, "not a boolean")),
        },
        other => Err(IndexerError::invalid_field(field, &describe(other), "not a boolean")),
    }
}

/// Byte size from a plain number or text such as `"1.5 GB"`.
pub fn parse_size(text: &str, field: &str) -> Result<u64, IndexerError> {
    let caps = SIZE_PATTERN
        .captures(text.trim())
        .ok_or_else(|| IndexerError::invalid_field(field, text, "not a size"))?;

    let number = &caps[1];
    let multiplier: u64 = match caps
        .get(2)
        .map(|m| m.as_str().to_ascii_lowercase())
        .as_deref()
    {
        None | Some("b") | Some("bytes") => 1,
        Some("kb") | Some("kib") => 1 << 10,
        Some("mb") | Some("mib") => 1 << 20,
        Some("gb") | Some("gib") => 1 << 30,
        Some("tb") | Some("tib") => 1 << 40,
        Some(_) => return Err(IndexerError::invalid_field(field, text, "unknown unit")),
    };

    let overflow = || IndexerError::invalid_field(field, text, "size overflow");
    if !number.contains('.') {
        return number
            .parse::<u64>()
            .ok()
            .and_then(|whole| whole.checked_mul(multiplier))
            .ok_or_else(overflow);
    }
    let value: f64 = number
        .parse()
        .map_err(|_| IndexerError::invalid_field(field, text, "not a size"))?;
    let bytes = (value * multiplier as f64).round();
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(overflow());
    }
    Ok(bytes as u64)
}

/// Timestamp normalized to UTC.
///
/// Accepts RFC 3339, RFC 2822, `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DDTHH:MM:SS`
/// (taken as UTC) and unix epoch seconds.
pub fn parse_timestamp(text: &str, field: &str) -> Result<DateTime<Utc>, IndexerError> {
    let text = text.trim();

    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = text
            .parse()
            .map_err(|_| IndexerError::invalid_field(field, text, "epoch out of range"))?;
        return DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| IndexerError::invalid_field(field, text, "epoch out of range"));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(ndt.and_utc());
        }
    }

    Err(IndexerError::invalid_field(field, text, "unrecognized timestamp"))
}

/// Stable sort by descending publish date.
pub fn sort_by_publish_date(results: &mut [CanonicalResult]) {
    results.sort_by(|a, b| b.publish_date.cmp(&a.publish_date));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::IndexerRequest;
    use chrono::{Datelike, TimeZone, Timelike};
    use serde_json::json;

    fn envelope(status: u16, content_type: Option<&str>) -> ResponseEnvelope {
        let e = ResponseEnvelope::new(IndexerRequest::get("http://x"), status, "body");
        match content_type {
            Some(ct) => e.with_header("Content-Type", ct),
            None => e,
        }
    }

    #[test]
    fn test_check_envelope_ok() {
        assert!(check_envelope(&envelope(200, Some("application/json; charset=utf-8")), "application/json").is_ok());
    }

    #[test]
    fn test_check_envelope_bad_status() {
        let err = check_envelope(&envelope(503, Some("text/html")), "application/json").unwrap_err();
        assert!(matches!(
            err,
            IndexerError::Protocol(ProtocolError::UnexpectedStatus { status: 503, .. })
        ));
    }

    #[test]
    fn test_check_envelope_content_type() {
        let err = check_envelope(&envelope(200, Some("text/html")), "application/json").unwrap_err();
        assert!(matches!(
            err,
            IndexerError::Protocol(ProtocolError::UnexpectedContentType { .. })
        ));
        let err = check_envelope(&envelope(200, None), "application/json").unwrap_err();
        assert!(matches!(
            err,
            IndexerError::Protocol(ProtocolError::UnexpectedContentType { actual: None, .. })
        ));
    }

    #[test]
    fn test_check_envelope_rate_limited() {
        let err = check_envelope(
            &envelope(429, None).with_header("Retry-After", "1800"),
            "application/json",
        )
        .unwrap_err();
        match err {
            IndexerError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(1800)))
            }
            other => panic!("Expected RateLimited, got {:?}", other),
        }

        let err = check_envelope(&envelope(429, None), "application/json").unwrap_err();
        assert!(matches!(err, IndexerError::RateLimited { retry_after: None }));
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 18, 0).unwrap();
        let d = parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT", now).unwrap();
        assert_eq!(d, Duration::from_secs(600));
        assert!(parse_retry_after("soon", now).is_none());
    }

    #[test]
    fn test_loose_numbers() {
        assert_eq!(loose_u64(&json!(5), "seeders").unwrap(), 5);
        assert_eq!(loose_u64(&json!("5"), "seeders").unwrap(), 5);
        assert_eq!(loose_u64(&json!(" 12 "), "seeders").unwrap(), 12);
        assert!(loose_u64(&json!("5 peers"), "seeders").is_err());
        assert!(loose_u64(&json!(-1), "seeders").is_err());
        assert!(loose_u64(&json!(1.5), "seeders").is_err());
        assert!(loose_u64(&json!(null), "seeders").is_err());
        assert!(loose_u32(&json!(u64::MAX), "seeders").is_err());
    }

    #[test]
    fn test_loose_bool() {
        assert!(loose_bool(&json!(true), "f").unwrap());
        assert!(loose_bool(&json!("1"), "f").unwrap());
        assert!(!loose_bool(&json!(0), "f").unwrap());
        assert!(loose_bool(&json!("maybe"), "f").is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024", "size").unwrap(), 1024);
        assert_eq!(parse_size("2 KB", "size").unwrap(), 2048);
        assert_eq!(parse_size("1.5 GiB", "size").unwrap(), 1_610_612_736);
        assert_eq!(parse_size("3mb", "size").unwrap(), 3 * 1024 * 1024);
        assert!(parse_size("lots", "size").is_err());
        assert!(parse_size("12 parsecs", "size").is_err());
    }

    fn is_overflow(result: Result<u64, IndexerError>) -> bool {
        matches!(
            result,
            Err(IndexerError::Protocol(ProtocolError::InvalidField { ref reason, .. }))
                if reason == "size overflow"
        )
    }

    #[test]
    fn test_parse_size_rejects_overflow() {
        assert_eq!(parse_size("18446744073709551615", "size").unwrap(), u64::MAX);
        assert!(is_overflow(parse_size("18446744073709551616", "size")));
        assert!(is_overflow(parse_size("99999999999999999999999", "size")));
        assert!(is_overflow(parse_size("20000000 TB", "size")));
        assert!(is_overflow(parse_size("16777216.5 TiB", "size")));
        let digits = format!("{}.5", "9".repeat(400));
        assert!(is_overflow(parse_size(&digits, "size")));
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let dt = parse_timestamp("2024-06-15T10:30:00+02:00", "time").unwrap();
        assert_eq!(dt.hour(), 8);

        let dt = parse_timestamp("2012-06-07 12:35:37", "time").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2012, 6, 7));

        let dt = parse_timestamp("1339117820", "time").unwrap();
        assert_eq!(dt.year(), 2012);

        let dt = parse_timestamp("Sat, 15 Jun 2024 10:30:00 +0000", "time").unwrap();
        assert_eq!(dt.day(), 15);

        assert!(parse_timestamp("yesterday", "time").is_err());
        assert!(parse_timestamp("", "time").is_err());
    }

    #[test]
    fn test_sort_by_publish_date_is_stable() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut results: Vec<CanonicalResult> = ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, title)| crate::testing::fixtures::result(title, t + chrono::Duration::hours((i % 2) as i64)))
            .collect();
        sort_by_publish_date(&mut results);
        let titles: Vec<_> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "a", "c"]);
    }
}
