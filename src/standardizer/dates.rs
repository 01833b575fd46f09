use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Named zones seen in the wild that RFC 2822 parsing does not accept.
const ZONES: &[(&str, &str)] = &[
    ("UTC", "+0000"),
    ("CET", "+0100"),
    ("CEST", "+0200"),
    ("EET", "+0200"),
    ("EEST", "+0300"),
    ("BST", "+0100"),
    ("IST", "+0530"),
    ("JST", "+0900"),
    ("KST", "+0900"),
    ("AEST", "+1000"),
    ("AEDT", "+1100"),
];

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S%z",
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M %z",
    "%a, %d %b %Y %H:%M %z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d %b %Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d %b %Y", "%d %B %Y", "%B %d, %Y", "%b %d, %Y"];

/// Parse a feed timestamp leniently. `None` when nothing matches.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(ts) = parse_timestamp(raw) {
        return Some(ts);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(dt) = parse_rfc2822_lenient(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    let without_z = raw.trim_end_matches('Z');
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(without_z, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Bare UNIX timestamps, in seconds or milliseconds.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if !(9..=13).contains(&raw.len()) || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: i64 = raw.parse().ok()?;
    if raw.len() >= 12 {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

/// RFC 2822 with a wrong weekday, extra whitespace or a named zone.
fn parse_rfc2822_lenient(raw: &str) -> Option<DateTime<FixedOffset>> {
    let mut candidate = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if let Some((zone, offset)) = ZONES
        .iter()
        .find(|(zone, _)| candidate.ends_with(&format!(" {}", zone)))
    {
        candidate.truncate(candidate.len() - zone.len());
        candidate.push_str(offset);
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(&candidate) {
        return Some(dt);
    }

    let without_weekday = match candidate.split_once(',') {
        Some((weekday, rest)) if weekday.chars().all(|c| c.is_ascii_alphabetic()) => rest.trim(),
        _ => candidate.as_str(),
    };
    DateTime::parse_from_rfc2822(without_weekday)
        .ok()
        .or_else(|| DateTime::parse_from_str(without_weekday, "%d %b %Y %H:%M:%S %z").ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_rfc2822() {
        assert_eq!(
            parse_date("Mon, 01 Jan 2024 10:00:00 GMT"),
            Some(utc("2024-01-01T10:00:00Z"))
        );
        assert_eq!(
            parse_date("Mon, 01 Jan 2024 10:00:00 -0500"),
            Some(utc("2024-01-01T15:00:00Z"))
        );
    }

    #[test]
    fn test_rfc2822_wrong_weekday() {
        assert_eq!(
            parse_date("Fri, 01 Jan 2024 10:00:00 +0000"),
            Some(utc("2024-01-01T10:00:00Z"))
        );
    }

    #[test]
    fn test_named_zones() {
        assert_eq!(
            parse_date("Mon, 01 Jan 2024 10:00:00 CET"),
            Some(utc("2024-01-01T09:00:00Z"))
        );
        assert_eq!(
            parse_date("01 Jan 2024 10:00:00 PDT"),
            Some(utc("2024-01-01T17:00:00Z"))
        );
    }

    #[test]
    fn test_rfc3339_and_variants() {
        assert_eq!(parse_date("2024-01-01T10:00:00+02:00"), Some(utc("2024-01-01T08:00:00Z")));
        assert_eq!(parse_date("2024-01-01T10:00:00.123+0000").map(|d| d.timestamp()), Some(1704103200));
        assert_eq!(parse_date("2024-01-01 10:00:00"), Some(utc("2024-01-01T10:00:00Z")));
        assert_eq!(parse_date("2024-01-01T10:00:00"), Some(utc("2024-01-01T10:00:00Z")));
    }

    #[test]
    fn test_date_only() {
        assert_eq!(parse_date("2024-01-01"), Some(utc("2024-01-01T00:00:00Z")));
        assert_eq!(parse_date("January 5, 2024"), Some(utc("2024-01-05T00:00:00Z")));
    }

    #[test]
    fn test_unix_timestamps() {
        assert_eq!(parse_date("1704103200"), Some(utc("2024-01-01T10:00:00Z")));
        assert_eq!(parse_date("1704103200000"), Some(utc("2024-01-01T10:00:00Z")));
    }

    #[test]
    fn test_garbage() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("yesterday-ish"), None);
        assert_eq!(parse_date("12345"), None);
    }
}
