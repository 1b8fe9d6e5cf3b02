//! Recall Tool
//!
//! Thin wrapper over the recall engine: validates arguments, runs the
//! question, and shapes the JSON payload. The engine already guarantees
//! a well-formed degraded answer on any internal failure.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::recall::{RecallEngine, RecallMode};

/// Facts echoed back in the payload
const MAX_FACTS_RETURNED: usize = 10;

/// Input schema for the recall tool
pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Natural-language question"
            },
            "sessionId": {
                "type": "string",
                "description": "Session scope for caching (default: default)",
                "default": "default"
            },
            "mode": {
                "type": "string",
                "description": "memory (facts only) or hybrid (facts + conversation)",
                "enum": ["memory", "hybrid"],
                "default": "memory"
            }
        },
        "required": ["query"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecallArgs {
    query: String,
    session_id: Option<String>,
    mode: Option<String>,
}

pub async fn execute(engine: &Arc<RecallEngine>, args: Option<Value>) -> Result<Value, String> {
    let args: RecallArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {e}"))?,
        None => return Err("Missing arguments".to_string()),
    };
    if args.query.trim().is_empty() {
        return Err("Query cannot be empty".to_string());
    }

    let session_id = args.session_id.unwrap_or_else(|| "default".to_string());
    let mode = RecallMode::parse_name(args.mode.as_deref().unwrap_or("memory"));

    let outcome = engine.recall(&args.query, &session_id, mode, None).await;

    let facts: Vec<Value> = outcome
        .facts
        .iter()
        .take(MAX_FACTS_RETURNED)
        .map(|f| {
            serde_json::json!({
                "id": f.id,
                "subject": f.subject,
                "predicate": f.predicate,
                "object": f.object,
                "confidence": f.confidence,
            })
        })
        .collect();

    Ok(serde_json::json!({
        "answer": outcome.answer,
        "mode": outcome.mode.as_str(),
        "factsUsed": outcome.facts.len(),
        "facts": facts,
        "error": outcome.error,
    }))
}
