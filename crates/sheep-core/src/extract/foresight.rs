//! Foresight Extraction
//!
//! Time-bounded expectations about the future ("I'm moving next month",
//! "the review is in two weeks"). Pattern family keys on planning cues;
//! the LLM family returns a JSON envelope with start offsets and
//! durations. Candidates are deduplicated by normalized description
//! prefix.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use crate::llm::{complete_bounded, json, CompleteOptions, LanguageModel, LlmError};

use super::ExtractOptions;

/// Prefix length used for deduplication
const DEDUPE_PREFIX_CHARS: usize = 40;

/// A foresight candidate
#[derive(Debug, Clone)]
pub struct ForesightCandidate {
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_days: Option<i64>,
    pub confidence: f64,
    pub evidence: Vec<String>,
}

impl ForesightCandidate {
    fn new(
        description: impl Into<String>,
        start_time: DateTime<Utc>,
        confidence: f64,
        episode_id: &str,
    ) -> Self {
        Self {
            description: description.into().trim().to_string(),
            start_time,
            end_time: None,
            duration_days: None,
            confidence: confidence.clamp(0.0, 1.0),
            evidence: vec![episode_id.to_string()],
        }
    }

    /// Normalized description prefix for dedupe
    pub fn dedupe_prefix(&self) -> String {
        self.description
            .trim()
            .to_lowercase()
            .chars()
            .take(DEDUPE_PREFIX_CHARS)
            .collect()
    }
}

/// Two normalized prefixes match when one is a prefix of the other
pub fn prefixes_match(a: &str, b: &str) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

// ============================================================================
// PATTERN FAMILY
// ============================================================================

static PLANNING_TO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bi(?:'m| am)? (?:planning|going|about) to\s+([^.!?]{5,120})")
        .expect("static regex")
});
static WILL_NEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:i|we)(?:'ll| will)\s+([^.!?]{5,100}?(?:next week|next month|tomorrow|this weekend)[^.!?]{0,40})")
        .expect("static regex")
});
static IN_N_UNITS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([^.!?]{5,100}?)\s+in\s+(\d{1,2}|a|two|three|four)\s+(days?|weeks?|months?)\b")
        .expect("static regex")
});

fn unit_days(count: &str, unit: &str) -> i64 {
    let n: i64 = match count.to_lowercase().as_str() {
        "a" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        other => other.parse().unwrap_or(1),
    };
    let per = if unit.starts_with("week") {
        7
    } else if unit.starts_with("month") {
        30
    } else {
        1
    };
    n * per
}

/// Extract foresight candidates with the deterministic rules
pub fn extract_with_patterns(
    text: &str,
    episode_id: &str,
    conversation_date: DateTime<Utc>,
    opts: &ExtractOptions,
) -> Vec<ForesightCandidate> {
    let mut candidates = Vec::new();

    for caps in PLANNING_TO.captures_iter(text) {
        candidates.push(ForesightCandidate::new(
            caps[1].trim(),
            conversation_date,
            0.65,
            episode_id,
        ));
    }
    for caps in WILL_NEXT.captures_iter(text) {
        candidates.push(ForesightCandidate::new(
            caps[1].trim(),
            conversation_date,
            0.6,
            episode_id,
        ));
    }
    for caps in IN_N_UNITS.captures_iter(text) {
        let offset = unit_days(&caps[2], &caps[3]);
        let mut c = ForesightCandidate::new(
            format!("{} in {} {}", caps[1].trim(), &caps[2], &caps[3]),
            conversation_date + Duration::days(offset),
            0.6,
            episode_id,
        );
        c.duration_days = Some(offset);
        candidates.push(c);
    }

    finish(candidates, opts)
}

// ============================================================================
// LLM FAMILY
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawForesight {
    description: String,
    #[serde(default)]
    starts_in_days: Option<i64>,
    #[serde(default)]
    duration_days: Option<i64>,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.6
}

fn build_prompt(text: &str) -> String {
    format!(
        "List upcoming events or plans the speaker mentions that will matter \
in future conversations.\n\
Respond with ONLY a JSON array:\n\
[{{\"description\": \"moving to Berlin\", \"starts_in_days\": 30, \
\"duration_days\": 7, \"confidence\": 0.8}}]\n\n\
Conversation:\n{text}"
    )
}

/// Extract foresight candidates with the language model
pub async fn extract_with_model(
    model: &dyn LanguageModel,
    text: &str,
    episode_id: &str,
    conversation_date: DateTime<Utc>,
    opts: &ExtractOptions,
) -> Result<Vec<ForesightCandidate>, LlmError> {
    let reply = complete_bounded(model, &build_prompt(text), &CompleteOptions::json(500)).await?;
    let raw: Vec<RawForesight> = json::decode_list(&reply);
    let candidates = raw
        .into_iter()
        .filter(|r| !r.description.trim().is_empty())
        .map(|r| {
            let start = conversation_date + Duration::days(r.starts_in_days.unwrap_or(0).max(0));
            let mut c =
                ForesightCandidate::new(r.description, start, r.confidence, episode_id);
            c.duration_days = r.duration_days.filter(|d| *d > 0);
            c.end_time = c
                .duration_days
                .map(|d| start + Duration::days(d));
            c
        })
        .collect();
    Ok(finish(candidates, opts))
}

/// Threshold filter, prefix dedupe, cap
fn finish(candidates: Vec<ForesightCandidate>, opts: &ExtractOptions) -> Vec<ForesightCandidate> {
    let threshold = opts.threshold();
    let mut kept: Vec<ForesightCandidate> = Vec::new();
    for candidate in candidates {
        if candidate.confidence < threshold {
            continue;
        }
        if let Some(existing) = kept
            .iter_mut()
            .find(|k| prefixes_match(&k.dedupe_prefix(), &candidate.dedupe_prefix()))
        {
            if candidate.confidence > existing.confidence {
                existing.confidence = candidate.confidence;
            }
            continue;
        }
        kept.push(candidate);
    }
    opts.cap(&mut kept);
    kept
}
