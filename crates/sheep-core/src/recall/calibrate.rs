//! Answer Calibration
//!
//! Deterministic post-processing of model answers: strip markdown and
//! hedging prefixes, drop explanatory clauses and parentheticals, and
//! reduce the answer to the shape the question type asks for (first
//! date-like phrase, first clause, first number). Pure functions, no
//! model involvement.

use regex::Regex;
use std::sync::LazyLock;

use super::classify::QuestionType;

static PARENTHETICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\)").expect("static regex"));
static LEADING_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:based on [^,]+,|according to [^,]+,|the answer is|answer:|it (?:seems|appears) (?:that)?|i (?:think|believe) (?:that)?|as far as i know,?)\s*",
    )
    .expect("static regex")
});
static DATE_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:the (?:week|day|month) (?:before|after|of) )?(?:\d{1,2}(?:st|nd|rd|th)? )?(?:january|february|march|april|may|june|july|august|september|october|november|december)(?: \d{1,2}(?:st|nd|rd|th)?\b,?)?(?: \d{4})?|\d{4}-\d{2}-\d{2}",
    )
    .expect("static regex")
});
static NUMBER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("static regex"));

const NUMBER_WORDS: &[(&str, &str)] = &[
    ("zero", "0"),
    ("one", "1"),
    ("two", "2"),
    ("three", "3"),
    ("four", "4"),
    ("five", "5"),
    ("six", "6"),
    ("seven", "7"),
    ("eight", "8"),
    ("nine", "9"),
    ("ten", "10"),
    ("eleven", "11"),
    ("twelve", "12"),
    ("thirteen", "13"),
    ("fourteen", "14"),
    ("fifteen", "15"),
    ("sixteen", "16"),
    ("seventeen", "17"),
    ("eighteen", "18"),
    ("nineteen", "19"),
    ("twenty", "20"),
];

/// Clauses that only ever explain, never answer
const EXPLANATION_MARKERS: &[&str] = &[
    " because ",
    ", which means",
    ", which is",
    ", so ",
    "; this ",
    " - this ",
];

fn strip_markdown(text: &str) -> String {
    text.replace("**", "")
        .replace('`', "")
        .lines()
        .map(|l| l.trim_start_matches(['#', '>', ' ']))
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

fn strip_prefixes(text: &str) -> String {
    let mut out = text.trim().to_string();
    // Prefixes can stack ("Based on the facts, the answer is ...")
    loop {
        let stripped = LEADING_PREFIX.replace(&out, "").into_owned();
        if stripped == out {
            break;
        }
        out = stripped;
    }
    out.trim().to_string()
}

fn cut_explanations(text: &str) -> String {
    let lower = text.to_lowercase();
    let cut = EXPLANATION_MARKERS
        .iter()
        .filter_map(|marker| lower.find(marker))
        .min();
    match cut {
        Some(idx) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn first_clause(text: &str) -> String {
    text.split([',', ';', '\n'])
        .next()
        .unwrap_or(text)
        .trim()
        .to_string()
}

fn normalize_number_word(token: &str) -> Option<&'static str> {
    let clean = token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
    NUMBER_WORDS
        .iter()
        .find(|(word, _)| *word == clean)
        .map(|(_, digits)| *digits)
}

fn extract_number(text: &str) -> Option<String> {
    // A digit token wins; otherwise the first English number word
    for token in text.split_whitespace() {
        if let Some(m) = NUMBER_TOKEN.find(token) {
            return Some(m.as_str().to_string());
        }
        if let Some(digits) = normalize_number_word(token) {
            return Some(digits.to_string());
        }
    }
    None
}

fn extract_date(text: &str) -> Option<String> {
    DATE_PHRASE.find(text).map(|m| m.as_str().trim().to_string())
}

fn trim_trailing_punctuation(text: &str) -> String {
    text.trim()
        .trim_end_matches(['.', ',', '!', ';', ':'])
        .trim()
        .to_string()
}

/// Calibrate a raw model answer for the given question type
pub fn calibrate(raw: &str, question_type: QuestionType) -> String {
    let mut answer = strip_markdown(raw);
    answer = strip_prefixes(&answer);
    answer = PARENTHETICAL.replace_all(&answer, "").into_owned();
    answer = cut_explanations(&answer);

    answer = match question_type {
        QuestionType::TemporalDate => extract_date(&answer).unwrap_or_else(|| first_clause(&answer)),
        QuestionType::Count => extract_number(&answer).unwrap_or_else(|| first_clause(&answer)),
        QuestionType::TemporalDuration => {
            // Keep "3 weeks"-style phrases intact; fall back to the clause
            first_clause(&answer)
        }
        QuestionType::YesNo => {
            let lower = answer.to_lowercase();
            if lower.starts_with("yes") {
                "Yes".to_string()
            } else if lower.starts_with("no") {
                "No".to_string()
            } else {
                first_clause(&answer)
            }
        }
        QuestionType::SingleHop | QuestionType::Inference => first_clause(&answer),
    };

    trim_trailing_punctuation(&answer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_reduce_to_the_number() {
        assert_eq!(
            calibrate("about seven (7) people because they all RSVP'd", QuestionType::Count),
            "7"
        );
        assert_eq!(calibrate("There were 12 attendees.", QuestionType::Count), "12");
    }

    #[test]
    fn prefixes_and_markdown_are_stripped() {
        assert_eq!(
            calibrate(
                "Based on the facts, the answer is **TechCorp**.",
                QuestionType::SingleHop
            ),
            "TechCorp"
        );
    }

    #[test]
    fn explanations_are_cut() {
        assert_eq!(
            calibrate(
                "Alex Chen, which means the user introduced themselves",
                QuestionType::SingleHop
            ),
            "Alex Chen"
        );
        assert_eq!(
            calibrate("Seattle because that is where they live", QuestionType::SingleHop),
            "Seattle"
        );
    }

    #[test]
    fn dates_extract_the_first_date_phrase() {
        assert_eq!(
            calibrate("They moved on 9 June 2023 after the wedding.", QuestionType::TemporalDate),
            "9 June 2023"
        );
        assert_eq!(
            calibrate(
                "It happened the week before 9 June 2023, I believe.",
                QuestionType::TemporalDate
            ),
            "the week before 9 June 2023"
        );
    }

    #[test]
    fn yes_no_collapses_to_one_word() {
        assert_eq!(
            calibrate("Yes, Alex mentioned that twice.", QuestionType::YesNo),
            "Yes"
        );
        assert_eq!(calibrate("No.", QuestionType::YesNo), "No");
    }

    #[test]
    fn where_keeps_first_clause() {
        assert_eq!(
            calibrate("Seattle, a city in Washington", QuestionType::SingleHop),
            "Seattle"
        );
    }

    #[test]
    fn trailing_punctuation_is_trimmed() {
        assert_eq!(calibrate("GitHub.", QuestionType::SingleHop), "GitHub");
    }

    #[test]
    fn stacked_prefixes_strip_repeatedly() {
        assert_eq!(
            calibrate(
                "According to the memory, the answer is Berlin.",
                QuestionType::SingleHop
            ),
            "Berlin"
        );
    }
}
