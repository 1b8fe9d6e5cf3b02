//! Forget Tool
//!
//! Soft-retract facts by id or by (subject, predicate) filter. A reason
//! is mandatory; it lands in the retraction record and the change log.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::memory::normalize_predicate;
use crate::storage::{FactFilter, MemoryStore};

/// Input schema for the forget tool
pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "factId": {
                "type": "string",
                "description": "Retract one fact by id"
            },
            "subject": {
                "type": "string",
                "description": "Retract active facts about this subject"
            },
            "predicate": {
                "type": "string",
                "description": "Narrow the subject filter to one predicate"
            },
            "reason": {
                "type": "string",
                "description": "Why the fact(s) should be forgotten"
            }
        },
        "required": ["reason"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForgetArgs {
    fact_id: Option<String>,
    subject: Option<String>,
    predicate: Option<String>,
    reason: String,
}

pub async fn execute(store: &Arc<MemoryStore>, args: Option<Value>) -> Result<Value, String> {
    let args: ForgetArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {e}"))?,
        None => return Err("Missing arguments".to_string()),
    };
    if args.reason.trim().is_empty() {
        return Err("A reason is required to forget".to_string());
    }
    if args.fact_id.is_none() && args.subject.is_none() && args.predicate.is_none() {
        return Err("Provide factId, or a subject/predicate filter".to_string());
    }

    let mut retracted: Vec<String> = Vec::new();

    if let Some(id) = &args.fact_id {
        match store.get_fact(id).map_err(|e| e.to_string())? {
            Some(fact) if fact.is_active => {
                store
                    .retract_fact(id, args.reason.trim(), None)
                    .map_err(|e| e.to_string())?;
                retracted.push(id.clone());
            }
            Some(_) => {}
            None => return Err(format!("No fact with id {id}")),
        }
    } else {
        let filter = FactFilter {
            subject: args.subject.clone(),
            predicate: args.predicate.as_deref().map(normalize_predicate),
            active_only: true,
            ..Default::default()
        };
        for fact in store.query_facts(&filter).map_err(|e| e.to_string())? {
            store
                .retract_fact(&fact.id, args.reason.trim(), None)
                .map_err(|e| e.to_string())?;
            retracted.push(fact.id);
        }
    }

    Ok(serde_json::json!({
        "retracted": retracted.len(),
        "factIds": retracted,
        "reason": args.reason.trim(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Fact;
    use tempfile::TempDir;

    async fn seeded() -> (Arc<MemoryStore>, TempDir, Fact) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::open_at("t", dir.path().join("t.sqlite")).unwrap());
        let fact = Fact::new("user", "likes", "espresso", 0.8);
        store.insert_fact(&fact).unwrap();
        (store, dir, fact)
    }

    #[tokio::test]
    async fn forget_by_id_requires_reason() {
        let (store, _dir, fact) = seeded().await;
        let no_reason = serde_json::json!({ "factId": fact.id, "reason": "  " });
        assert!(execute(&store, Some(no_reason)).await.is_err());

        let args = serde_json::json!({ "factId": fact.id, "reason": "user asked" });
        let result = execute(&store, Some(args)).await.unwrap();
        assert_eq!(result["retracted"], 1);

        let back = store.get_fact(&fact.id).unwrap().unwrap();
        assert!(!back.is_active);
        assert_eq!(back.retracted_reason.as_deref(), Some("user asked"));
    }

    #[tokio::test]
    async fn forget_by_filter_retracts_matches() {
        let (store, _dir, _fact) = seeded().await;
        store
            .insert_fact(&Fact::new("user", "likes", "hiking", 0.7))
            .unwrap();
        store
            .insert_fact(&Fact::new("user", "works_at", "TechCorp", 0.9))
            .unwrap();

        let args = serde_json::json!({
            "subject": "user",
            "predicate": "likes",
            "reason": "preferences changed"
        });
        let result = execute(&store, Some(args)).await.unwrap();
        assert_eq!(result["retracted"], 2);
        assert_eq!(store.facts_about("user", Some("works_at")).unwrap().len(), 1);
        assert!(store.facts_about("user", Some("likes")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn forget_unknown_id_errors() {
        let (store, _dir, _fact) = seeded().await;
        let args = serde_json::json!({ "factId": "fact-missing", "reason": "x" });
        assert!(execute(&store, Some(args)).await.is_err());
    }
}
