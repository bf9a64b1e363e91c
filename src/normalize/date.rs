//! Date normalization into `YYYY-MM-DD`
//!
//! Rules are tried in a fixed priority order. The two day/month orderings for
//! ambiguous numeric dates differ on purpose: slash-separated dates default to
//! `MM/DD/YYYY`, hyphen- or dot-separated dates default to `DD-MM-YYYY`.
//! Historical aggregates depend on this table, so it must not drift.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

const MONTH_PREFIXES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Datetime layouts accepted by the generic fallback
const FALLBACK_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Date-only layouts accepted by the generic fallback
const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%B %d %Y",
    "%d %B, %Y",
    "%a %b %d %Y",
    "%A, %B %d, %Y",
    "%a, %d %b %Y",
];

/// Which component wins when both numeric parts are <= 12
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AmbiguousOrder {
    MonthFirst,
    DayFirst,
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static date pattern"))
}

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^\d{4}-\d{2}-\d{2}$")
}

fn month_name_first_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^([A-Za-z]+)\s+(\d{1,2}),?\s*(\d{4})$")
}

fn day_first_named_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^(\d{1,2})[\s\-]([A-Za-z]+)[\s\-](\d{4})$")
}

fn month_year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^([A-Za-z]{3})-(\d{2})$")
}

fn slash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^(\d{1,2})[\\/]+(\d{1,2})[\\/]+(\d{4})$")
}

fn hyphen_dot_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^(\d{1,2})[\-.](\d{1,2})[\-.](\d{4})$")
}

fn year_first_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^(\d{4})[/\-.](\d{1,2})[/\-.](\d{1,2})$")
}

fn compact_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^(\d{4})(\d{2})(\d{2})$")
}

/// Check that a string is a real calendar date in `YYYY-MM-DD` form
pub fn is_iso_date(value: &str) -> bool {
    iso_date_re().is_match(value) && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

/// Normalize an arbitrary date string to `YYYY-MM-DD`.
///
/// Returns an empty string when the input cannot be interpreted; callers treat
/// such rows as invalid and leave them out of aggregation.
pub fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" || trimmed == "undefined" {
        return String::new();
    }

    let rules: [fn(&str) -> Option<String>; 9] = [
        already_iso,
        iso_datetime,
        month_name_first,
        day_first_named,
        month_year,
        slash_separated,
        hyphen_or_dot_separated,
        year_first,
        fallback,
    ];

    match rules.iter().find_map(|rule| rule(trimmed)) {
        Some(date) => date,
        None => {
            warn!(raw = trimmed, "Could not parse date");
            String::new()
        }
    }
}

fn format_ymd(year: i32, month: u32, day: u32) -> Option<String> {
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.format("%Y-%m-%d").to_string())
}

fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    MONTH_PREFIXES
        .iter()
        .position(|prefix| lower.starts_with(prefix))
        .map(|idx| idx as u32 + 1)
}

fn already_iso(s: &str) -> Option<String> {
    is_iso_date(s).then(|| s.to_string())
}

fn iso_datetime(s: &str) -> Option<String> {
    let (date, _) = s.split_once('T')?;
    is_iso_date(date).then(|| date.to_string())
}

fn month_name_first(s: &str) -> Option<String> {
    let caps = month_name_first_re().captures(s)?;
    let month = month_from_name(&caps[1])?;
    format_ymd(caps[3].parse().ok()?, month, caps[2].parse().ok()?)
}

fn day_first_named(s: &str) -> Option<String> {
    let caps = day_first_named_re().captures(s)?;
    let month = month_from_name(&caps[2])?;
    format_ymd(caps[3].parse().ok()?, month, caps[1].parse().ok()?)
}

fn month_year(s: &str) -> Option<String> {
    let caps = month_year_re().captures(s)?;
    let lower = caps[1].to_lowercase();
    let month = MONTH_PREFIXES.iter().position(|m| *m == lower)? as u32 + 1;
    let year: i32 = caps[2].parse().ok()?;
    format_ymd(2000 + year, month, 1)
}

fn slash_separated(s: &str) -> Option<String> {
    let caps = slash_re().captures(s)?;
    disambiguate(s, &caps, AmbiguousOrder::MonthFirst)
}

fn hyphen_or_dot_separated(s: &str) -> Option<String> {
    let caps = hyphen_dot_re().captures(s)?;
    disambiguate(s, &caps, AmbiguousOrder::DayFirst)
}

fn disambiguate(raw: &str, caps: &regex::Captures<'_>, ambiguous: AmbiguousOrder) -> Option<String> {
    let first: u32 = caps[1].parse().ok()?;
    let second: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;

    let (month, day) = if first > 12 {
        (second, first)
    } else if second > 12 {
        (first, second)
    } else {
        let guess = match ambiguous {
            AmbiguousOrder::MonthFirst => (first, second),
            AmbiguousOrder::DayFirst => (second, first),
        };
        debug!(
            raw,
            assumed = ?ambiguous,
            month = guess.0,
            day = guess.1,
            "Ambiguous date, using default component order"
        );
        guess
    };

    format_ymd(year, month, day)
}

fn year_first(s: &str) -> Option<String> {
    let caps = year_first_re().captures(s)?;
    format_ymd(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?)
}

fn fallback(s: &str) -> Option<String> {
    if let Some(caps) = compact_re().captures(s) {
        return format_ymd(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?);
    }

    let date = DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.date_naive())
        .or_else(|_| DateTime::parse_from_rfc2822(s).map(|dt| dt.date_naive()))
        .ok()
        .or_else(|| {
            FALLBACK_DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| {
            FALLBACK_DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        })?;

    Some(date.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_passthrough_and_idempotence() {
        let samples = [
            "2024-12-24",
            "2024-12-24T00:00:00.000Z",
            "Dec 24, 2024",
            "24 Dec 2024",
            "Nov-25",
            "24/11/2024",
            "05/06/2024",
            "05-06-2024",
            "2024/1/5",
        ];
        for sample in samples {
            let once = normalize_date(sample);
            assert!(is_iso_date(&once), "{} -> {}", sample, once);
            assert_eq!(normalize_date(&once), once);
        }
        assert_eq!(normalize_date("2024-12-24"), "2024-12-24");
    }

    #[test]
    fn test_iso_datetime_truncates() {
        assert_eq!(normalize_date("2024-12-24T00:00:00.000Z"), "2024-12-24");
        assert_eq!(normalize_date("2025-01-31T18:45:00+05:30"), "2025-01-31");
    }

    #[test]
    fn test_month_names() {
        assert_eq!(normalize_date("Dec 24, 2024"), "2024-12-24");
        assert_eq!(normalize_date("December 4 2024"), "2024-12-04");
        assert_eq!(normalize_date("sept 9, 2024"), "2024-09-09");
        assert_eq!(normalize_date("24 Dec 2024"), "2024-12-24");
        assert_eq!(normalize_date("3-Mar-2025"), "2025-03-03");
        assert_eq!(normalize_date("Nov-25"), "2025-11-01");
    }

    #[test]
    fn test_slash_disambiguation() {
        assert_eq!(normalize_date("24/11/2024"), "2024-11-24");
        assert_eq!(normalize_date("11/24/2024"), "2024-11-24");
        // Ambiguous slash dates are read month first
        assert_eq!(normalize_date("05/06/2024"), "2024-05-06");
        assert_eq!(normalize_date("5\\6\\2024"), "2024-05-06");
    }

    #[test]
    fn test_hyphen_and_dot_disambiguation() {
        // Ambiguous hyphen/dot dates are read day first
        assert_eq!(normalize_date("05-06-2024"), "2024-06-05");
        assert_eq!(normalize_date("05.06.2024"), "2024-06-05");
        assert_eq!(normalize_date("24-11-2024"), "2024-11-24");
        assert_eq!(normalize_date("11-24-2024"), "2024-11-24");
    }

    #[test]
    fn test_year_first_variants() {
        assert_eq!(normalize_date("2024/12/24"), "2024-12-24");
        assert_eq!(normalize_date("2024.1.5"), "2024-01-05");
    }

    #[test]
    fn test_fallback_formats() {
        assert_eq!(normalize_date("Tue, 24 Dec 2024 10:00:00 +0000"), "2024-12-24");
        assert_eq!(normalize_date("2024-12-24 10:30:00"), "2024-12-24");
        assert_eq!(normalize_date("20241224"), "2024-12-24");
    }

    #[test]
    fn test_unparseable_inputs_yield_empty() {
        assert_eq!(normalize_date(""), "");
        assert_eq!(normalize_date("   "), "");
        assert_eq!(normalize_date("null"), "");
        assert_eq!(normalize_date("undefined"), "");
        assert_eq!(normalize_date("Total"), "");
        assert_eq!(normalize_date("not a date"), "");
        assert_eq!(normalize_date("13/13/2024"), "");
        assert_eq!(normalize_date("2024-02-30"), "");
    }
}
