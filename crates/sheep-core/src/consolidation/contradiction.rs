//! Contradiction Detection & Resolution
//!
//! Two active facts with the same subject and a unique-per-subject
//! predicate but different objects cannot coexist. Resolution tries the
//! model first (five verdicts), then falls back to the rule chain:
//! user-affirmed wins, then more recent `lastConfirmed`, then higher
//! confidence, then more evidence. The loser is soft-retracted with the
//! reason attached.

use serde::Deserialize;

use crate::llm::{complete_bounded, json, CompleteOptions, LanguageModel, LlmError};
use crate::memory::Fact;
use crate::storage::MemoryStore;

/// Which of the two facts survives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    First,
    Second,
}

/// Model verdicts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    KeepFirst,
    KeepSecond,
    KeepBoth,
    Merge,
    NeedsUserInput,
}

impl Verdict {
    fn parse_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "keep_first" => Some(Verdict::KeepFirst),
            "keep_second" => Some(Verdict::KeepSecond),
            "keep_both" => Some(Verdict::KeepBoth),
            "merge" => Some(Verdict::Merge),
            "needs_user_input" => Some(Verdict::NeedsUserInput),
            _ => None,
        }
    }
}

/// A model verdict with its rationale
#[derive(Debug, Clone)]
pub struct ModelResolution {
    pub verdict: Verdict,
    pub reason: String,
    pub merged_object: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    decision: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    merged_object: Option<String>,
}

/// Rule-based resolution chain
pub fn rule_based_winner(first: &Fact, second: &Fact) -> Winner {
    if first.user_affirmed != second.user_affirmed {
        return if first.user_affirmed {
            Winner::First
        } else {
            Winner::Second
        };
    }
    if first.last_confirmed != second.last_confirmed {
        return if first.last_confirmed > second.last_confirmed {
            Winner::First
        } else {
            Winner::Second
        };
    }
    if (first.confidence - second.confidence).abs() > f64::EPSILON {
        return if first.confidence > second.confidence {
            Winner::First
        } else {
            Winner::Second
        };
    }
    if first.evidence.len() >= second.evidence.len() {
        Winner::First
    } else {
        Winner::Second
    }
}

fn build_prompt(first: &Fact, second: &Fact) -> String {
    format!(
        "Two remembered facts about the same person conflict.\n\
FIRST (older): {} {} {} (confidence {:.2}, user_affirmed {}, last confirmed {})\n\
SECOND (newer): {} {} {} (confidence {:.2}, user_affirmed {}, last confirmed {})\n\
Decide how to resolve the conflict. Respond with ONLY a JSON object:\n\
{{\"decision\": \"keep_first|keep_second|keep_both|merge|needs_user_input\", \
\"reason\": \"one sentence\", \"merged_object\": \"only when decision is merge\"}}",
        first.subject,
        first.predicate,
        first.object,
        first.confidence,
        first.user_affirmed,
        first.last_confirmed.format("%Y-%m-%d"),
        second.subject,
        second.predicate,
        second.object,
        second.confidence,
        second.user_affirmed,
        second.last_confirmed.format("%Y-%m-%d"),
    )
}

/// Ask the model for a verdict
pub async fn resolve_with_model(
    model: &dyn LanguageModel,
    first: &Fact,
    second: &Fact,
) -> Result<ModelResolution, LlmError> {
    let reply = complete_bounded(model, &build_prompt(first, second), &CompleteOptions::json(200)).await?;
    let raw: RawVerdict = json::decode_object(&reply)
        .ok_or_else(|| LlmError::Parse("no verdict object in reply".to_string()))?;
    let verdict = Verdict::parse_name(&raw.decision)
        .ok_or_else(|| LlmError::Parse(format!("unknown decision '{}'", raw.decision)))?;
    Ok(ModelResolution {
        verdict,
        reason: if raw.reason.is_empty() {
            "model resolution".to_string()
        } else {
            raw.reason
        },
        merged_object: raw.merged_object.filter(|o| !o.trim().is_empty()),
    })
}

/// Resolve a contradiction between two stored facts; both must already be
/// inserted. Returns the id of the surviving fact.
///
/// For unique-per-subject predicates exactly one fact stays active, even
/// under `keep_both`/`needs_user_input`, so the belief-set invariant
/// holds; the verdict text is preserved in the retraction reason.
pub async fn resolve_contradiction(
    store: &MemoryStore,
    model: Option<&dyn LanguageModel>,
    existing: &Fact,
    incoming: &Fact,
    run_id: Option<&str>,
) -> crate::storage::Result<String> {
    store.add_contradiction(&existing.id, &incoming.id)?;

    let model_resolution = match model {
        Some(m) => match resolve_with_model(m, existing, incoming).await {
            Ok(r) => Some(r),
            Err(err) => {
                tracing::warn!(error = %err, "model contradiction resolution failed; using rules");
                None
            }
        },
        None => None,
    };

    let unique = existing.has_unique_predicate();

    if let Some(resolution) = model_resolution {
        match resolution.verdict {
            Verdict::KeepFirst => {
                store.retract_fact(
                    &incoming.id,
                    &format!("lost contradiction resolution: {}", resolution.reason),
                    run_id,
                )?;
                return Ok(existing.id.clone());
            }
            Verdict::KeepSecond => {
                store.retract_fact(
                    &existing.id,
                    &format!("lost contradiction resolution: {}", resolution.reason),
                    run_id,
                )?;
                return Ok(incoming.id.clone());
            }
            Verdict::Merge => {
                if let Some(merged) = resolution.merged_object {
                    let confidence = existing.confidence.max(incoming.confidence);
                    store.modify_fact(
                        &incoming.id,
                        &merged,
                        confidence,
                        &format!("merged conflicting facts: {}", resolution.reason),
                        run_id,
                    )?;
                    store.retract_fact(
                        &existing.id,
                        &format!("merged into {}: {}", incoming.id, resolution.reason),
                        run_id,
                    )?;
                    return Ok(incoming.id.clone());
                }
                // Merge without a merged object degenerates to the rules
            }
            Verdict::KeepBoth | Verdict::NeedsUserInput => {
                if !unique {
                    // Both stay active; the mutual contradiction marks
                    // already record the tension.
                    return Ok(incoming.id.clone());
                }
                // Unique predicates cannot keep both; fall through
            }
        }
    }

    let reason_prefix = if model.is_some() {
        "rule-based resolution"
    } else {
        "rule-based resolution (model unavailable)"
    };
    match rule_based_winner(existing, incoming) {
        Winner::First => {
            store.retract_fact(
                &incoming.id,
                &format!("{reason_prefix}: superseded by {}", existing.id),
                run_id,
            )?;
            Ok(existing.id.clone())
        }
        Winner::Second => {
            store.retract_fact(
                &existing.id,
                &format!("{reason_prefix}: superseded by {}", incoming.id),
                run_id,
            )?;
            Ok(incoming.id.clone())
        }
    }
}
