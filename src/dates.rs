//! Date helpers shared by field formatting and date-bucketed grouping.
//!
//! Patterns use the Unicode/date-fns token style common in dashboard
//! tooling (`yyyy-MM-dd HH:mm`), translated to chrono strftime items.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Epoch values at or above this are milliseconds, below it seconds
pub const MILLISECOND_THRESHOLD: f64 = 1e12;

/// Interpret a numeric epoch value, guessing its unit
pub fn date_from_epoch(n: f64) -> Option<DateTime<Utc>> {
    if !n.is_finite() {
        return None;
    }
    let millis = if n >= MILLISECOND_THRESHOLD { n } else { n * 1000.0 };
    Utc.timestamp_millis_opt(millis.round() as i64).single()
}

/// Parse a date literal: RFC 3339, RFC 2822, or a bare date/datetime in UTC
pub fn parse_date_literal(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, pattern) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

// Longest tokens first so `yyyy` wins over `yy`.
const TOKENS: &[(&str, &str)] = &[
    ("yyyy", "%Y"),
    ("yy", "%y"),
    ("MMMM", "%B"),
    ("MMM", "%b"),
    ("MM", "%m"),
    ("M", "%-m"),
    ("dd", "%d"),
    ("d", "%-d"),
    ("EEEE", "%A"),
    ("EEE", "%a"),
    ("HH", "%H"),
    ("H", "%-H"),
    ("hh", "%I"),
    ("h", "%-I"),
    ("mm", "%M"),
    ("m", "%-M"),
    ("ss", "%S"),
    ("s", "%-S"),
    ("SSS", "%3f"),
    ("a", "%p"),
    ("XXX", "%:z"),
];

/// Translate a date pattern into a strftime string.
///
/// Text inside single quotes is literal; `''` is a literal quote. Unknown
/// letters are rejected so a typo never renders silently wrong output.
pub fn translate_pattern(pattern: &str) -> Result<String, String> {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;

    while let Some(c) = rest.chars().next() {
        if c == '\'' {
            if let Some(after) = rest.strip_prefix("''") {
                out.push('\'');
                rest = after;
                continue;
            }
            let body = &rest[1..];
            let end = body
                .find('\'')
                .ok_or_else(|| format!("Unterminated literal in date pattern '{}'", pattern))?;
            push_literal(&mut out, &body[..end]);
            rest = &body[end + 1..];
        } else if c.is_ascii_alphabetic() {
            let (token, spec) = TOKENS
                .iter()
                .find(|(token, _)| rest.starts_with(token))
                .ok_or_else(|| format!("Unsupported token '{}' in date pattern '{}'", c, pattern))?;
            out.push_str(spec);
            rest = &rest[token.len()..];
        } else {
            push_literal(&mut out, &rest[..c.len_utf8()]);
            rest = &rest[c.len_utf8()..];
        }
    }

    Ok(out)
}

fn push_literal(out: &mut String, text: &str) {
    for c in text.chars() {
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
    }
}

/// Render `date` with a date pattern
pub fn format_with_pattern(date: &DateTime<Utc>, pattern: &str) -> Result<String, String> {
    let strftime = translate_pattern(pattern)?;
    let items: Vec<Item<'_>> = StrftimeItems::new(&strftime).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(format!("Invalid date pattern '{}'", pattern));
    }
    Ok(date.format_with_items(items.into_iter()).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_threshold() {
        let from_seconds = date_from_epoch(1_700_000_000.0).unwrap();
        let from_millis = date_from_epoch(1_700_000_000_000.0).unwrap();
        assert_eq!(from_seconds, from_millis);
        assert_eq!(from_millis.timestamp_millis(), 1_700_000_000_000);

        // the threshold itself is milliseconds
        let at = date_from_epoch(MILLISECOND_THRESHOLD).unwrap();
        assert_eq!(at.timestamp_millis(), 1_000_000_000_000);

        // just below the threshold is still read as seconds
        let below = date_from_epoch(999_999_999_999.0).unwrap();
        assert_eq!(below.timestamp(), 999_999_999_999);
        assert!(date_from_epoch(f64::NAN).is_none());
    }

    #[test]
    fn test_parse_date_literal() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_date_literal("2024-03-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_date_literal("2024-03-01 12:30:00"), Some(expected));
        assert_eq!(
            parse_date_literal("2024-03-01"),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_date_literal("yesterday"), None);
    }

    #[test]
    fn test_format_with_pattern() {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 7, 5, 9).unwrap();
        assert_eq!(format_with_pattern(&date, "yyyy-MM-dd").unwrap(), "2024-03-01");
        assert_eq!(format_with_pattern(&date, "HH:mm:ss").unwrap(), "07:05:09");
        assert_eq!(
            format_with_pattern(&date, "yyyy-MM-dd'T'HH'h'").unwrap(),
            "2024-03-01T07h"
        );
        assert_eq!(format_with_pattern(&date, "d/M/yy").unwrap(), "1/3/24");
    }

    #[test]
    fn test_bad_pattern_is_error() {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert!(format_with_pattern(&date, "yyyy-QQ").is_err());
        assert!(format_with_pattern(&date, "'open").is_err());
    }
}
