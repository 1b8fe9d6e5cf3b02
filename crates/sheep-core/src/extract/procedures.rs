//! Procedure Extraction
//!
//! Trigger → action patterns. Pattern family keys on conditional cues
//! (`when X, Y`, `if X then Y`, `whenever X, Y`); the LLM family asks for
//! trigger/action/outcome triples in a JSON envelope.

use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use crate::llm::{complete_bounded, json, CompleteOptions, LanguageModel, LlmError};

use super::ExtractOptions;

/// A procedure candidate
#[derive(Debug, Clone)]
pub struct ProcedureCandidate {
    pub trigger: String,
    pub action: String,
    pub expected_outcome: Option<String>,
    pub confidence: f64,
    pub tags: Vec<String>,
    pub evidence: Vec<String>,
}

impl ProcedureCandidate {
    fn new(
        trigger: impl Into<String>,
        action: impl Into<String>,
        confidence: f64,
        episode_id: &str,
    ) -> Self {
        Self {
            trigger: clean(trigger.into()),
            action: clean(action.into()),
            expected_outcome: None,
            confidence: confidence.clamp(0.0, 1.0),
            tags: Vec::new(),
            evidence: vec![episode_id.to_string()],
        }
    }

    /// Lowercase trigger+action equality key
    pub fn dedupe_key(&self) -> String {
        format!(
            "{}\u{1f}{}",
            self.trigger.to_lowercase(),
            self.action.to_lowercase()
        )
    }
}

fn clean(s: String) -> String {
    s.trim()
        .trim_end_matches(['.', ',', '!', '?', ';'])
        .to_string()
}

// ============================================================================
// PATTERN FAMILY
// ============================================================================

static WHEN_THEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bwhen(?:ever)?\s+([^,.!?]{4,80}),\s*(?:i\s+|we\s+|you should\s+)?([^.!?]{4,120})")
        .expect("static regex")
});
static IF_THEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bif\s+([^,.!?]{4,80}),?\s+then\s+([^.!?]{4,120})").expect("static regex")
});
static ALWAYS_BEFORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bi always\s+([^.!?]{4,80})\s+before\s+([^.!?]{4,80})").expect("static regex")
});

/// Extract procedure candidates with the deterministic rules
pub fn extract_with_patterns(
    text: &str,
    episode_id: &str,
    opts: &ExtractOptions,
) -> Vec<ProcedureCandidate> {
    let mut candidates = Vec::new();

    for caps in WHEN_THEN.captures_iter(text) {
        candidates.push(ProcedureCandidate::new(&caps[1], &caps[2], 0.65, episode_id));
    }
    for caps in IF_THEN.captures_iter(text) {
        candidates.push(ProcedureCandidate::new(&caps[1], &caps[2], 0.7, episode_id));
    }
    for caps in ALWAYS_BEFORE.captures_iter(text) {
        // "I always A before B": B is the situation, A the action
        candidates.push(ProcedureCandidate::new(&caps[2], &caps[1], 0.6, episode_id));
    }

    finish(candidates, opts)
}

// ============================================================================
// LLM FAMILY
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawProcedure {
    trigger: String,
    action: String,
    #[serde(default)]
    expected_outcome: Option<String>,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    tags: Vec<String>,
}

fn default_confidence() -> f64 {
    0.6
}

fn build_prompt(text: &str) -> String {
    format!(
        "Find reusable trigger-action patterns in this conversation: habits, \
workflows, or rules the speaker follows.\n\
Respond with ONLY a JSON array:\n\
[{{\"trigger\": \"the situation\", \"action\": \"what to do\", \
\"expected_outcome\": \"what should happen\", \"confidence\": 0.7, \"tags\": [\"work\"]}}]\n\n\
Conversation:\n{text}"
    )
}

/// Extract procedure candidates with the language model
pub async fn extract_with_model(
    model: &dyn LanguageModel,
    text: &str,
    episode_id: &str,
    opts: &ExtractOptions,
) -> Result<Vec<ProcedureCandidate>, LlmError> {
    let reply = complete_bounded(model, &build_prompt(text), &CompleteOptions::json(600)).await?;
    let raw: Vec<RawProcedure> = json::decode_list(&reply);
    let candidates = raw
        .into_iter()
        .filter(|r| !r.trigger.trim().is_empty() && !r.action.trim().is_empty())
        .map(|r| {
            let mut c = ProcedureCandidate::new(r.trigger, r.action, r.confidence, episode_id);
            c.expected_outcome = r.expected_outcome.filter(|o| !o.trim().is_empty());
            c.tags = r.tags;
            c
        })
        .collect();
    Ok(finish(candidates, opts))
}

/// Threshold filter, trigger+action dedupe, cap
fn finish(candidates: Vec<ProcedureCandidate>, opts: &ExtractOptions) -> Vec<ProcedureCandidate> {
    let threshold = opts.threshold();
    let mut kept: Vec<ProcedureCandidate> = Vec::new();
    for candidate in candidates {
        if candidate.confidence < threshold {
            continue;
        }
        if let Some(existing) = kept
            .iter_mut()
            .find(|k| k.dedupe_key() == candidate.dedupe_key())
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
