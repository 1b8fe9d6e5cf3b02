//! Causal-Link Extraction
//!
//! Pattern family: connective cue rules (`because`, `so`, `led to`,
//! `caused`) with conservative confidence. LLM family: JSON envelope with
//! mechanism and optional temporal delay. Relative time expressions in
//! both descriptions are rewritten to absolute dates using the
//! conversation timestamp before the candidate leaves this module.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use crate::llm::{complete_bounded, json, CompleteOptions, LanguageModel, LlmError};
use crate::memory::CauseKind;

use super::temporal;
use super::ExtractOptions;

/// A causal-link candidate
#[derive(Debug, Clone)]
pub struct CausalCandidate {
    pub cause_kind: CauseKind,
    pub cause_description: String,
    pub effect_kind: CauseKind,
    pub effect_description: String,
    pub mechanism: String,
    pub confidence: f64,
    pub temporal_delay: Option<String>,
    pub evidence: Vec<String>,
}

impl CausalCandidate {
    fn new(
        cause: impl Into<String>,
        effect: impl Into<String>,
        confidence: f64,
        episode_id: &str,
    ) -> Self {
        Self {
            cause_kind: CauseKind::Episode,
            cause_description: cause.into(),
            effect_kind: CauseKind::Episode,
            effect_description: effect.into(),
            mechanism: String::new(),
            confidence: confidence.clamp(0.0, 1.0),
            temporal_delay: None,
            evidence: vec![episode_id.to_string()],
        }
    }

    fn resolve_times(mut self, conversation_date: DateTime<Utc>) -> Self {
        self.cause_description = temporal::resolve_relative(&self.cause_description, conversation_date);
        self.effect_description =
            temporal::resolve_relative(&self.effect_description, conversation_date);
        self
    }
}

// ============================================================================
// PATTERN FAMILY
// ============================================================================

static EFFECT_BECAUSE_CAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([^.!?]{5,120}?)\s+because\s+([^.!?]{5,120})").expect("static regex")
});
static CAUSE_SO_EFFECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([^.!?]{5,120}?),?\s+so\s+([^.!?]{5,120})").expect("static regex")
});
static CAUSE_LED_TO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([^.!?]{5,120}?)\s+(?:led to|resulted in)\s+([^.!?]{5,120})")
        .expect("static regex")
});
static CAUSE_CAUSED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([^.!?]{5,120}?)\s+caused\s+([^.!?]{5,120})").expect("static regex")
});

fn clean_clause(clause: &str) -> String {
    clause
        .trim()
        .trim_start_matches(|c: char| c == ',' || c.is_whitespace())
        .trim_end_matches(['.', ',', '!', '?', ';'])
        .to_string()
}

/// Extract causal candidates with the deterministic connective rules
pub fn extract_with_patterns(
    text: &str,
    episode_id: &str,
    conversation_date: DateTime<Utc>,
    opts: &ExtractOptions,
) -> Vec<CausalCandidate> {
    let mut candidates = Vec::new();

    for caps in EFFECT_BECAUSE_CAUSE.captures_iter(text) {
        // "E because C": the second clause is the cause
        candidates.push(CausalCandidate::new(
            clean_clause(&caps[2]),
            clean_clause(&caps[1]),
            0.65,
            episode_id,
        ));
    }
    for caps in CAUSE_SO_EFFECT.captures_iter(text) {
        candidates.push(CausalCandidate::new(
            clean_clause(&caps[1]),
            clean_clause(&caps[2]),
            0.6,
            episode_id,
        ));
    }
    for caps in CAUSE_LED_TO.captures_iter(text) {
        candidates.push(CausalCandidate::new(
            clean_clause(&caps[1]),
            clean_clause(&caps[2]),
            0.7,
            episode_id,
        ));
    }
    for caps in CAUSE_CAUSED.captures_iter(text) {
        candidates.push(CausalCandidate::new(
            clean_clause(&caps[1]),
            clean_clause(&caps[2]),
            0.7,
            episode_id,
        ));
    }

    finish(candidates, conversation_date, opts)
}

// ============================================================================
// LLM FAMILY
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawLink {
    cause: String,
    effect: String,
    #[serde(default)]
    mechanism: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    temporal_delay: Option<String>,
}

fn default_confidence() -> f64 {
    0.6
}

fn build_prompt(text: &str, conversation_date: DateTime<Utc>) -> String {
    format!(
        "Identify cause-and-effect relationships in this conversation.\n\
The conversation took place on {date}. Express any times inside the \
descriptions as absolute dates.\n\
Respond with ONLY a JSON array (at most 2 items):\n\
[{{\"cause\": \"...\", \"effect\": \"...\", \"mechanism\": \"how the cause produced the effect\", \
\"confidence\": 0.8, \"temporal_delay\": \"2 days\"}}]\n\n\
Conversation:\n{text}",
        date = temporal::format_date(conversation_date),
    )
}

/// Extract causal candidates with the language model.
///
/// The conversation timestamp is mandatory here so relative times inside
/// the model's descriptions can be rewritten to absolute dates.
pub async fn extract_with_model(
    model: &dyn LanguageModel,
    text: &str,
    episode_id: &str,
    conversation_date: DateTime<Utc>,
    opts: &ExtractOptions,
) -> Result<Vec<CausalCandidate>, LlmError> {
    let prompt = build_prompt(text, conversation_date);
    let reply = complete_bounded(model, &prompt, &CompleteOptions::json(600)).await?;

    let raw: Vec<RawLink> = json::decode_list(&reply);
    let candidates = raw
        .into_iter()
        .filter(|r| !r.cause.trim().is_empty() && !r.effect.trim().is_empty())
        .map(|r| {
            let mut c = CausalCandidate::new(
                r.cause.trim(),
                r.effect.trim(),
                r.confidence,
                episode_id,
            );
            c.mechanism = r.mechanism.trim().to_string();
            c.temporal_delay = r.temporal_delay.filter(|d| !d.trim().is_empty());
            c
        })
        .collect();
    Ok(finish(candidates, conversation_date, opts))
}

fn finish(
    candidates: Vec<CausalCandidate>,
    conversation_date: DateTime<Utc>,
    opts: &ExtractOptions,
) -> Vec<CausalCandidate> {
    let threshold = opts.threshold();
    let mut out: Vec<CausalCandidate> = candidates
        .into_iter()
        .filter(|c| c.confidence >= threshold)
        .map(|c| c.resolve_times(conversation_date))
        .collect();
    opts.cap(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use chrono::TimeZone;

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, 9, 12, 0, 0).unwrap()
    }

    #[test]
    fn because_swaps_clause_order() {
        let links =
            extract_with_patterns("I quit my job because the commute was awful", "ep-1", date(), &ExtractOptions::default());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].cause_description, "the commute was awful");
        assert_eq!(links[0].effect_description, "I quit my job");
    }

    #[test]
    fn led_to_keeps_clause_order() {
        let links = extract_with_patterns(
            "The reorg led to three resignations.",
            "ep-1",
            date(),
            &ExtractOptions::default(),
        );
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].cause_description, "The reorg");
        assert_eq!(links[0].effect_description, "three resignations");
    }

    #[test]
    fn relative_times_become_absolute() {
        let links = extract_with_patterns(
            "I was exhausted yesterday because the deploy failed",
            "ep-1",
            date(),
            &ExtractOptions::default(),
        );
        assert_eq!(links.len(), 1);
        assert!(links[0].effect_description.contains("8 June 2023"));
    }

    #[tokio::test]
    async fn model_links_carry_mechanism_and_delay() {
        let model = ScriptedModel::new();
        model.push_reply(
            r#"[{"cause": "the deploy failed yesterday", "effect": "the team rolled back",
                 "mechanism": "failure forced a revert", "confidence": 0.85, "temporal_delay": "2 hours"}]"#,
        );
        let links = extract_with_model(&model, "t", "ep-1", date(), &ExtractOptions::default())
            .await
            .unwrap();
        assert_eq!(links.len(), 1);
        assert!(links[0].cause_description.contains("8 June 2023"));
        assert_eq!(links[0].mechanism, "failure forced a revert");
        assert_eq!(links[0].temporal_delay.as_deref(), Some("2 hours"));
        assert!((links[0].confidence - 0.85).abs() < f64::EPSILON);
    }
}
