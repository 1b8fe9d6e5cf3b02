//! Remember Tool
//!
//! Store a fact the user stated directly. The predicate is normalized
//! and the fact is stamped `userAffirmed`, which exempts it from
//! forgetting and gives it priority in contradiction resolution.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::consolidation::resolve_contradiction;
use crate::memory::{Fact, USER_EXPLICIT_EVIDENCE};
use crate::storage::{MemoryStore, StoreError};

/// Input schema for the remember tool
pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "subject": {
                "type": "string",
                "description": "Who the fact is about (default: user)",
                "default": "user"
            },
            "predicate": {
                "type": "string",
                "description": "Relation, e.g. works_at, likes, name_is"
            },
            "object": {
                "type": "string",
                "description": "The value of the fact"
            },
            "confidence": {
                "type": "number",
                "description": "Confidence (default: 0.95)",
                "default": 0.95,
                "minimum": 0.0,
                "maximum": 1.0
            }
        },
        "required": ["predicate", "object"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RememberArgs {
    #[serde(default = "default_subject")]
    subject: String,
    predicate: String,
    object: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_subject() -> String {
    "user".to_string()
}

fn default_confidence() -> f64 {
    0.95
}

pub async fn execute(store: &Arc<MemoryStore>, args: Option<Value>) -> Result<Value, String> {
    let args: RememberArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {e}"))?,
        None => return Err("Missing arguments".to_string()),
    };
    if args.predicate.trim().is_empty() || args.object.trim().is_empty() {
        return Err("predicate and object cannot be empty".to_string());
    }

    let fact = Fact::new(
        args.subject.trim(),
        &args.predicate,
        args.object.trim(),
        args.confidence.clamp(0.0, 1.0),
    )
    .with_evidence(vec![USER_EXPLICIT_EVIDENCE.to_string()])
    .affirmed();

    let conflicting: Vec<Fact> = store
        .facts_about(&fact.subject, Some(&fact.predicate))
        .map_err(|e| e.to_string())?
        .into_iter()
        .filter(|f| !f.object.eq_ignore_ascii_case(&fact.object))
        .collect();

    match store.insert_fact(&fact) {
        Ok(()) => {}
        Err(StoreError::Duplicate(_)) => {
            return Ok(serde_json::json!({ "stored": false, "reason": "duplicate" }));
        }
        Err(e) => return Err(e.to_string()),
    }

    // The belief set keeps at most one active fact per unique predicate,
    // so a conflicting remember resolves immediately
    let mut resolved = 0;
    if fact.has_unique_predicate() {
        for existing in &conflicting {
            match resolve_contradiction(store, None, existing, &fact, None).await {
                Ok(_) => resolved += 1,
                Err(e) => return Err(e.to_string()),
            }
        }
    }

    Ok(serde_json::json!({
        "stored": true,
        "factId": fact.id,
        "subject": fact.subject,
        "predicate": fact.predicate,
        "object": fact.object,
        "userAffirmed": true,
        "contradictionsResolved": resolved,
    }))
}
