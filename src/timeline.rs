//! Temporal helpers: relative-time labels and effective timestamps
//!
//! Flashbacks are prefixed with a human relative-time phrase ("two weeks
//! ago in the morning — 3 Jan") computed against "now", and filtered
//! against the live context window using each memory's *effective*
//! timestamp: an explicit date anchor in the body wins over the record's
//! own timestamp.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Authoritative date anchors written by historical ingest and imports
    static ref DATE_ANCHOR: Regex =
        Regex::new(r"(?:Ocurrido el|memory log for|FECHA:|DATE:)\s*(\d{4}-\d{2}-\d{2})")
            .expect("date anchor regex");

    /// Inline machine timestamp tags
    static ref TIMESTAMP_TAG: Regex =
        Regex::new(r"\[TIMESTAMP:([^\]]+)\]").expect("timestamp tag regex");
}

/// Resolve the timestamp used for temporal filtering and labeling
///
/// Order: body date anchor, then `[TIMESTAMP:…]` tag, then the record's
/// own timestamp. `None` means "unknown" and callers fail open.
pub fn effective_timestamp(content: &str, own: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    if let Some(caps) = DATE_ANCHOR.captures(content) {
        if let Ok(date) = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d") {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Some(Utc.from_utc_datetime(&midnight));
            }
        }
    }

    if let Some(caps) = TIMESTAMP_TAG.captures(content) {
        if let Some(ts) = parse_flexible(caps[1].trim()) {
            return Some(ts);
        }
    }

    own
}

/// Parse the timestamp formats that show up in memory bodies and logs
pub fn parse_flexible(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|naive| Utc.from_utc_datetime(&naive));
    }
    None
}

/// Time-of-day phrase for a timestamp's hour
pub fn day_part(hour: u32) -> &'static str {
    match hour {
        6..=12 => "in the morning",
        13..=19 => "in the afternoon",
        1..=5 => "in the early morning",
        _ => "at night",
    }
}

/// Same-day variant ("this morning", "tonight")
fn same_day_phrase(hour: u32) -> &'static str {
    match hour {
        6..=12 => "this morning",
        13..=19 => "this afternoon",
        1..=5 => "this early morning",
        _ => "tonight",
    }
}

/// Full relative-time annotation: phrase plus calendar date suffix
pub fn relative_time_label(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format!("{}{}", relative_phrase(ts, now), calendar_suffix(ts, now))
}

/// Exact calendar date suffix, year included only when it differs
fn calendar_suffix(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    if ts.year() == now.year() {
        format!(" — {}", ts.format("%-d %b"))
    } else {
        format!(" — {}", ts.format("%-d %b %Y"))
    }
}

/// Human relative-time phrase (first matching row of the label table)
pub fn relative_phrase(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(ts);
    let secs = elapsed.num_seconds();

    if secs < 60 {
        return "just a moment ago".to_string();
    }

    let mins = elapsed.num_minutes();
    if mins < 60 {
        return match mins {
            1 => "a minute ago".to_string(),
            2..=4 => "a few minutes ago".to_string(),
            _ => format!("about {mins} minutes ago"),
        };
    }

    let hours = elapsed.num_hours();
    if hours < 24 {
        return match hours {
            1 => "almost 1h ago".to_string(),
            2..=5 => format!("less than {}h ago", hours + 1),
            6..=11 => "a few hours ago".to_string(),
            _ => same_day_phrase(ts.hour()).to_string(),
        };
    }

    let days = elapsed.num_days();
    match days {
        1 => return format!("yesterday {}", day_part(ts.hour())),
        2 => return format!("the day before yesterday {}", day_part(ts.hour())),
        3..=6 => return format!("{days} days ago {}", day_part(ts.hour())),
        7..=13 => return "last week".to_string(),
        14..=29 => return format!("{} weeks ago", days / 7),
        _ => {}
    }

    let months = days / 30;
    match months {
        1 => "a month ago".to_string(),
        2..=10 => format!("{months} months ago"),
        11 => "almost a year ago".to_string(),
        12..=17 => "a year and a few months ago".to_string(),
        18..=23 => "almost 2 years ago".to_string(),
        _ => {
            let years = (days / 365).max(2);
            if years >= 5 {
                format!("about {years} years ago")
            } else {
                let rem_months = ((days - years * 365) / 30).max(0);
                match rem_months {
                    0..=2 => format!("{years} years ago"),
                    3..=8 => format!("{years} years ago or so"),
                    _ => format!("almost {} years ago", years + 1),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(iso: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(iso)
            .expect("test timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn test_effective_timestamp_prefers_date_anchor() {
        let own = Some(at("2026-02-01T10:00:00Z"));
        let ts = effective_timestamp("FECHA: 2024-05-10 fuimos al mar", own);
        assert_eq!(ts, Some(at("2024-05-10T00:00:00Z")));

        let ts = effective_timestamp("memory log for 2023-12-31", own);
        assert_eq!(ts, Some(at("2023-12-31T00:00:00Z")));
    }

    #[test]
    fn test_effective_timestamp_tag_fallback() {
        let ts = effective_timestamp("we met [TIMESTAMP:2024-01-02T10:30:00Z]", None);
        assert_eq!(ts, Some(at("2024-01-02T10:30:00Z")));
    }

    #[test]
    fn test_effective_timestamp_fails_open() {
        assert_eq!(effective_timestamp("no anchors here", None), None);
        // Garbled tag falls through to the record's own timestamp
        let own = Some(at("2026-02-01T10:00:00Z"));
        assert_eq!(
            effective_timestamp("bad [TIMESTAMP:not-a-date]", own),
            own
        );
    }

    #[test]
    fn test_day_parts() {
        assert_eq!(day_part(8), "in the morning");
        assert_eq!(day_part(15), "in the afternoon");
        assert_eq!(day_part(22), "at night");
        assert_eq!(day_part(0), "at night");
        assert_eq!(day_part(3), "in the early morning");
    }

    #[test]
    fn test_relative_phrase_table() {
        let now = at("2026-02-10T12:00:00Z");
        let cases = [
            ("2026-02-10T11:59:30Z", "just a moment ago"),
            ("2026-02-10T11:58:30Z", "a minute ago"),
            ("2026-02-10T11:57:00Z", "a few minutes ago"),
            ("2026-02-10T11:30:00Z", "about 30 minutes ago"),
            ("2026-02-10T10:30:00Z", "almost 1h ago"),
            ("2026-02-10T09:00:00Z", "less than 4h ago"),
            ("2026-02-10T04:00:00Z", "a few hours ago"),
            ("2026-02-09T20:00:00Z", "tonight"),
            ("2026-02-09T09:00:00Z", "yesterday in the morning"),
            ("2026-02-08T15:00:00Z", "the day before yesterday in the afternoon"),
            ("2026-02-06T09:00:00Z", "4 days ago in the morning"),
            ("2026-02-01T12:00:00Z", "last week"),
            ("2026-01-20T12:00:00Z", "3 weeks ago"),
            ("2026-01-05T12:00:00Z", "a month ago"),
            ("2025-11-10T12:00:00Z", "3 months ago"),
            ("2025-04-10T12:00:00Z", "10 months ago"),
            ("2025-02-20T12:00:00Z", "almost a year ago"),
            ("2024-12-10T12:00:00Z", "a year and a few months ago"),
            ("2024-06-10T12:00:00Z", "almost 2 years ago"),
            ("2024-01-10T12:00:00Z", "2 years ago"),
            ("2023-09-10T12:00:00Z", "2 years ago or so"),
            ("2019-02-10T12:00:00Z", "about 7 years ago"),
        ];
        for (iso, expected) in cases {
            assert_eq!(relative_phrase(at(iso), now), expected, "for {iso}");
        }
    }

    #[test]
    fn test_label_includes_calendar_date() {
        let now = at("2026-02-10T12:00:00Z");
        let label = relative_time_label(at("2026-02-01T09:00:00Z"), now);
        assert!(label.ends_with(" — 1 Feb"), "got: {label}");

        let label = relative_time_label(at("2024-06-10T12:00:00Z"), now);
        assert!(label.ends_with(" — 10 Jun 2024"), "got: {label}");
    }
}
