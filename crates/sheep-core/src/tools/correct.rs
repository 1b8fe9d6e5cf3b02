//! Correct Tool
//!
//! Replace a wrong belief: every active fact matching
//! (subject, predicate, oldValue) is retracted with the reason, then a
//! fresh user-affirmed fact with the new value is inserted at
//! confidence 0.95.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::memory::{normalize_predicate, Fact, USER_EXPLICIT_EVIDENCE};
use crate::storage::{FactFilter, MemoryStore};

/// Confidence stamped on the corrected fact
const CORRECTED_CONFIDENCE: f64 = 0.95;

/// Input schema for the correct tool
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
                "description": "Relation to correct, e.g. works_at"
            },
            "oldValue": {
                "type": "string",
                "description": "The wrong value currently believed"
            },
            "newValue": {
                "type": "string",
                "description": "The correct value"
            },
            "reason": {
                "type": "string",
                "description": "Why the old value was wrong (default: user correction)"
            }
        },
        "required": ["predicate", "oldValue", "newValue"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CorrectArgs {
    #[serde(default = "default_subject")]
    subject: String,
    predicate: String,
    old_value: String,
    new_value: String,
    #[serde(default = "default_reason")]
    reason: String,
}

fn default_subject() -> String {
    "user".to_string()
}

fn default_reason() -> String {
    "user correction".to_string()
}

pub async fn execute(store: &Arc<MemoryStore>, args: Option<Value>) -> Result<Value, String> {
    let args: CorrectArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {e}"))?,
        None => return Err("Missing arguments".to_string()),
    };
    if args.new_value.trim().is_empty() {
        return Err("newValue cannot be empty".to_string());
    }

    let filter = FactFilter {
        subject: Some(args.subject.clone()),
        predicate: Some(normalize_predicate(&args.predicate)),
        object: Some(args.old_value.clone()),
        active_only: true,
    };
    let matches = store.query_facts(&filter).map_err(|e| e.to_string())?;

    let mut retracted = Vec::new();
    for fact in &matches {
        store
            .retract_fact(&fact.id, args.reason.trim(), None)
            .map_err(|e| e.to_string())?;
        retracted.push(fact.id.clone());
    }

    let corrected = Fact::new(
        args.subject.trim(),
        &args.predicate,
        args.new_value.trim(),
        CORRECTED_CONFIDENCE,
    )
    .with_evidence(vec![USER_EXPLICIT_EVIDENCE.to_string()])
    .affirmed();
    store.insert_fact(&corrected).map_err(|e| e.to_string())?;

    Ok(serde_json::json!({
        "retracted": retracted,
        "factId": corrected.id,
        "subject": corrected.subject,
        "predicate": corrected.predicate,
        "object": corrected.object,
        "confidence": CORRECTED_CONFIDENCE,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (Arc<MemoryStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open_at("t", dir.path().join("t.sqlite")).unwrap();
        (Arc::new(store), dir)
    }

    #[tokio::test]
    async fn correct_swaps_the_belief() {
        let (store, _dir) = test_store().await;
        let wrong = Fact::new("user", "works_at", "Google", 0.9);
        store.insert_fact(&wrong).unwrap();

        let args = serde_json::json!({
            "predicate": "works_at",
            "oldValue": "Google",
            "newValue": "GitHub",
            "reason": "changed jobs"
        });
        let result = execute(&store, Some(args)).await.unwrap();
        assert_eq!(result["object"], "GitHub");
        assert_eq!(result["retracted"].as_array().unwrap().len(), 1);

        let actives = store.facts_about("user", Some("works_at")).unwrap();
        assert_eq!(actives.len(), 1);
        assert_eq!(actives[0].object, "GitHub");
        assert!(actives[0].user_affirmed);
        assert!((actives[0].confidence - 0.95).abs() < f64::EPSILON);

        let old = store.get_fact(&wrong.id).unwrap().unwrap();
        assert!(!old.is_active);
        assert_eq!(old.retracted_reason.as_deref(), Some("changed jobs"));
    }

    #[tokio::test]
    async fn correct_without_a_match_still_inserts() {
        let (store, _dir) = test_store().await;
        let args = serde_json::json!({
            "predicate": "lives_in",
            "oldValue": "Nowhere",
            "newValue": "Seattle"
        });
        let result = execute(&store, Some(args)).await.unwrap();
        assert!(result["retracted"].as_array().unwrap().is_empty());
        assert_eq!(store.facts_about("user", Some("lives_in")).unwrap().len(), 1);
    }
}
