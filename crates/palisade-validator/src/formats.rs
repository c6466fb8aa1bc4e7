//! `format` keyword checks.
//!
//! Unknown formats always pass. String formats only apply to strings and
//! numeric formats only to numbers; any other value passes.

use std::net::{Ipv4Addr, Ipv6Addr};

use base64::Engine;
use serde_json::Value;

/// Check a value against a named format.
///
/// Returns the reason on failure.
pub fn check_format(format: &str, value: &Value) -> Result<(), String> {
    let ok = match value {
        Value::String(s) => match format {
            "date" => is_date(s),
            "date-time" => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
            "time" => is_time(s),
            "email" => is_email(s),
            "uuid" => s.len() == 36 && uuid::Uuid::parse_str(s).is_ok(),
            "uri" => url::Url::parse(s).is_ok(),
            "hostname" => is_hostname(s),
            "ipv4" => s.parse::<Ipv4Addr>().is_ok(),
            "ipv6" => s.parse::<Ipv6Addr>().is_ok(),
            "byte" => base64::engine::general_purpose::STANDARD.decode(s).is_ok(),
            _ => true,
        },
        Value::Number(n) => match format {
            "int32" => n.as_i64().is_some_and(|i| i32::try_from(i).is_ok()),
            "int64" => n.is_i64() || n.as_f64().is_some_and(|f| f.fract() == 0.0 && f.abs() < 9.2e18),
            "float" => n.as_f64().is_some_and(|f| f.is_finite() && f.abs() <= f64::from(f32::MAX)),
            "double" => n.as_f64().is_some_and(f64::is_finite),
            _ => true,
        },
        _ => true,
    };

    if ok {
        Ok(())
    } else {
        Err(format!("is not a valid '{format}'"))
    }
}

/// RFC 3339 `full-date`.
fn is_date(s: &str) -> bool {
    s.len() == 10 && chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// RFC 3339 `full-time`, offset required.
fn is_time(s: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(&format!("1970-01-01T{s}")).is_ok()
}

fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !local.contains('@')
        && !local.chars().any(char::is_whitespace)
        && domain.contains('.')
        && is_hostname(domain)
}

/// RFC 1123 host name.
fn is_hostname(s: &str) -> bool {
    let s = s.strip_suffix('.').unwrap_or(s);
    !s.is_empty()
        && s.len() <= 253
        && s.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid(format: &str, value: Value) -> bool {
        check_format(format, &value).is_ok()
    }

    #[test]
    fn format_date_and_time() {
        assert!(valid("date", json!("2024-02-29")));
        assert!(!valid("date", json!("2023-02-29")));
        assert!(!valid("date", json!("2024-1-5")));

        assert!(valid("date-time", json!("2024-01-15T10:30:00Z")));
        assert!(valid("date-time", json!("2024-01-15T10:30:00.123+02:00")));
        assert!(!valid("date-time", json!("2024-01-15 10:30:00")));

        assert!(valid("time", json!("10:30:00Z")));
        assert!(valid("time", json!("23:59:59.5-05:00")));
        assert!(!valid("time", json!("10:30")));
    }

    #[test]
    fn format_email() {
        assert!(valid("email", json!("alice@example.com")));
        assert!(!valid("email", json!("alice")));
        assert!(!valid("email", json!("@example.com")));
        assert!(!valid("email", json!("alice@localhost")));
        assert!(!valid("email", json!("al ice@example.com")));
    }

    #[test]
    fn format_uuid() {
        assert!(valid("uuid", json!("550e8400-e29b-41d4-a716-446655440000")));
        assert!(!valid("uuid", json!("550e8400e29b41d4a716446655440000")));
        assert!(!valid("uuid", json!("not-a-uuid")));
    }

    #[test]
    fn format_uri_and_hostname() {
        assert!(valid("uri", json!("https://example.com/path?q=1")));
        assert!(!valid("uri", json!("/relative/path")));

        assert!(valid("hostname", json!("api.example.com")));
        assert!(!valid("hostname", json!("-bad.example.com")));
        assert!(!valid("hostname", json!("under_score.com")));
    }

    #[test]
    fn format_ip_addresses() {
        assert!(valid("ipv4", json!("192.168.1.1")));
        assert!(!valid("ipv4", json!("256.1.1.1")));
        assert!(valid("ipv6", json!("::1")));
        assert!(valid("ipv6", json!("2001:db8::8a2e:370:7334")));
        assert!(!valid("ipv6", json!("192.168.1.1")));
    }

    #[test]
    fn format_byte() {
        assert!(valid("byte", json!("aGVsbG8=")));
        assert!(!valid("byte", json!("not base64!")));
    }

    #[test]
    fn numeric_formats() {
        assert!(valid("int32", json!(2147483647)));
        assert!(!valid("int32", json!(2147483648_i64)));
        assert!(valid("int64", json!(9007199254740993_i64)));
        assert!(!valid("int64", json!(1.5)));
        assert!(valid("float", json!(1.5)));
        assert!(!valid("float", json!(1e39)));
        assert!(valid("double", json!(1e300)));
    }

    #[test]
    fn unknown_formats_and_other_types_pass() {
        assert!(valid("password", json!("hunter2")));
        assert!(valid("email", json!(42)));
        assert!(valid("int32", json!("not a number")));
    }
}
