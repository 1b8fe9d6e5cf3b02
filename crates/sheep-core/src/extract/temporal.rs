//! Relative-Time Resolution
//!
//! Rewrites relative time expressions ("yesterday", "last week", "3 days
//! ago") inside extracted descriptions into absolute dates anchored at
//! the conversation timestamp. Causal-link extraction depends on this so
//! chains stay meaningful long after the conversation.

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use regex::Regex;
use std::sync::LazyLock;

static DAYS_AGO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,3})\s+days?\s+ago\b").expect("static regex"));
static WEEKS_AGO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})\s+weeks?\s+ago\b").expect("static regex"));
static LAST_WEEKDAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\blast\s+(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b")
        .expect("static regex")
});

/// Format a date the way answers and descriptions carry them: `9 June 2023`
pub fn format_date(date: DateTime<Utc>) -> String {
    format!("{} {} {}", date.day(), month_name(date.month()), date.year())
}

fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        _ => "December",
    }
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name.to_lowercase().as_str() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// The most recent strictly-past date falling on `target` relative to `reference`
fn previous_weekday(reference: DateTime<Utc>, target: Weekday) -> DateTime<Utc> {
    let mut date = reference - Duration::days(1);
    while date.weekday() != target {
        date -= Duration::days(1);
    }
    date
}

/// Replace known relative expressions with absolute dates.
///
/// Unknown expressions pass through unchanged; the resolver never fails.
pub fn resolve_relative(text: &str, reference: DateTime<Utc>) -> String {
    let mut out = text.to_string();

    // Fixed single-token anchors, replaced case-insensitively
    let simple: &[(&str, DateTime<Utc>)] = &[
        ("the day before yesterday", reference - Duration::days(2)),
        ("yesterday", reference - Duration::days(1)),
        ("tomorrow", reference + Duration::days(1)),
        ("this morning", reference),
        ("this afternoon", reference),
        ("this evening", reference),
        ("tonight", reference),
        ("today", reference),
        ("last week", reference - Duration::days(7)),
        ("next week", reference + Duration::days(7)),
        ("last month", reference - Duration::days(30)),
        ("next month", reference + Duration::days(30)),
    ];
    for (phrase, date) in simple {
        out = replace_case_insensitive(&out, phrase, &format_date(*date));
    }

    out = DAYS_AGO
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            let days: i64 = caps[1].parse().unwrap_or(0);
            format_date(reference - Duration::days(days))
        })
        .into_owned();

    out = WEEKS_AGO
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            let weeks: i64 = caps[1].parse().unwrap_or(0);
            format_date(reference - Duration::weeks(weeks))
        })
        .into_owned();

    out = LAST_WEEKDAY
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            match weekday_from_name(&caps[1]) {
                Some(target) => format_date(previous_weekday(reference, target)),
                None => caps[0].to_string(),
            }
        })
        .into_owned();

    out
}

fn replace_case_insensitive(haystack: &str, needle: &str, replacement: &str) -> String {
    let lower_haystack = haystack.to_lowercase();
    let lower_needle = needle.to_lowercase();
    let mut result = String::with_capacity(haystack.len());
    let mut cursor = 0;
    while let Some(pos) = lower_haystack[cursor..].find(&lower_needle) {
        let abs = cursor + pos;
        result.push_str(&haystack[cursor..abs]);
        result.push_str(replacement);
        cursor = abs + needle.len();
    }
    result.push_str(&haystack[cursor..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        // Friday, 9 June 2023
        Utc.with_ymd_and_hms(2023, 6, 9, 12, 0, 0).unwrap()
    }

    #[test]
    fn yesterday_and_today_resolve() {
        assert_eq!(
            resolve_relative("we argued yesterday about the move", reference()),
            "we argued 8 June 2023 about the move"
        );
        assert_eq!(
            resolve_relative("Today I quit my job", reference()),
            "9 June 2023 I quit my job"
        );
    }

    #[test]
    fn day_before_yesterday_wins_over_yesterday() {
        assert_eq!(
            resolve_relative("it broke the day before yesterday", reference()),
            "it broke 7 June 2023"
        );
    }

    #[test]
    fn counted_offsets_resolve() {
        assert_eq!(
            resolve_relative("she called 3 days ago", reference()),
            "she called 6 June 2023"
        );
        assert_eq!(
            resolve_relative("started 2 weeks ago", reference()),
            "started 26 May 2023"
        );
    }

    #[test]
    fn last_weekday_resolves_to_the_previous_one() {
        // Reference is Friday 9 June 2023; last Monday is 5 June
        assert_eq!(
            resolve_relative("we met last Monday", reference()),
            "we met 5 June 2023"
        );
        // "last Friday" from a Friday is the week before
        assert_eq!(
            resolve_relative("paid last friday", reference()),
            "paid 2 June 2023"
        );
    }

    #[test]
    fn unknown_expressions_pass_through() {
        let text = "sometime in the distant future";
        assert_eq!(resolve_relative(text, reference()), text);
    }
}
