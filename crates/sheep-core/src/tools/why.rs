//! Why Tool
//!
//! Build a causal chain for an observed effect by walking stored causal
//! links backwards: the requested effect string is matched against
//! effect descriptions, then each link's cause description is matched
//! against further effect descriptions, bounded by depth. Composite
//! confidence is the product of per-link confidences.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use crate::memory::CausalLink;
use crate::storage::MemoryStore;

/// Default and maximum walk depth
const DEFAULT_MAX_DEPTH: usize = 5;
const MAX_DEPTH_CEILING: usize = 10;

/// Input schema for the why tool
pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "effect": {
                "type": "string",
                "description": "The observed effect to explain"
            },
            "maxDepth": {
                "type": "integer",
                "description": "Maximum chain length (default: 5)",
                "default": 5,
                "minimum": 1,
                "maximum": 10
            }
        },
        "required": ["effect"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WhyArgs {
    effect: String,
    max_depth: Option<i64>,
}

/// Walk backwards from the effect, best-confidence link first,
/// deduplicating visited links and effect descriptions.
pub fn build_chain(
    store: &MemoryStore,
    effect: &str,
    max_depth: usize,
) -> Result<Vec<CausalLink>, String> {
    let mut chain: Vec<CausalLink> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();

    // Matching links come back highest-confidence first
    let mut current = store
        .causal_links_for_effect(effect)
        .map_err(|e| e.to_string())?
        .into_iter()
        .next();

    while let Some(link) = current {
        if !visited.insert(link.id.clone()) {
            break;
        }
        let cause = link.cause_description.clone();
        chain.push(link);
        if chain.len() >= max_depth {
            break;
        }
        current = store
            .causal_links_for_effect(&cause)
            .map_err(|e| e.to_string())?
            .into_iter()
            .find(|l| !visited.contains(&l.id) && l.effect_description != l.cause_description);
    }

    // Stored newest-effect-first; the narrative runs root cause → effect
    chain.reverse();
    Ok(chain)
}

fn explain(chain: &[CausalLink]) -> String {
    let Some(first) = chain.first() else {
        return String::from("No causal explanation found.");
    };
    let mut text = first.cause_description.clone();
    for link in chain {
        text.push_str(" led to ");
        text.push_str(&link.effect_description);
        if !link.mechanism.is_empty() {
            text.push_str(&format!(" ({})", link.mechanism));
        }
    }
    text.push('.');
    text
}

pub async fn execute(store: &Arc<MemoryStore>, args: Option<Value>) -> Result<Value, String> {
    let args: WhyArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {e}"))?,
        None => return Err("Missing arguments".to_string()),
    };
    if args.effect.trim().is_empty() {
        return Err("effect cannot be empty".to_string());
    }
    let max_depth = args
        .max_depth
        .map(|d| (d.max(1) as usize).min(MAX_DEPTH_CEILING))
        .unwrap_or(DEFAULT_MAX_DEPTH);

    let chain = build_chain(store, args.effect.trim(), max_depth)?;
    let total_confidence: f64 = chain.iter().map(|l| l.confidence).product::<f64>()
        * if chain.is_empty() { 0.0 } else { 1.0 };

    let steps: Vec<Value> = chain
        .iter()
        .map(|l| {
            serde_json::json!({
                "cause": l.cause_description,
                "effect": l.effect_description,
                "mechanism": l.mechanism,
                "confidence": l.confidence,
                "causalStrength": l.causal_strength.as_str(),
                "temporalDelay": l.temporal_delay,
            })
        })
        .collect();

    Ok(serde_json::json!({
        "effect": args.effect.trim(),
        "chainLength": chain.len(),
        "totalConfidence": total_confidence,
        "chain": steps,
        "explanation": explain(&chain),
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

    fn link(cause: &str, effect: &str, confidence: f64) -> CausalLink {
        CausalLink::new(cause, effect, confidence)
    }

    #[tokio::test]
    async fn two_link_chain_multiplies_confidence() {
        let (store, _dir) = test_store().await;
        store
            .insert_causal_link(&link("the project was cancelled", "the team was reassigned", 0.8))
            .unwrap();
        store
            .insert_causal_link(&link("the team was reassigned", "morale dropped", 0.9))
            .unwrap();

        let args = serde_json::json!({ "effect": "morale dropped" });
        let result = execute(&store, Some(args)).await.unwrap();

        assert_eq!(result["chainLength"], 2);
        let total = result["totalConfidence"].as_f64().unwrap();
        assert!((total - 0.72).abs() < 1e-9);

        let explanation = result["explanation"].as_str().unwrap();
        assert!(explanation.contains("the project was cancelled"));
        assert!(explanation.contains("the team was reassigned"));
    }

    #[tokio::test]
    async fn unknown_effect_yields_empty_chain() {
        let (store, _dir) = test_store().await;
        let args = serde_json::json!({ "effect": "the moon exploded" });
        let result = execute(&store, Some(args)).await.unwrap();
        assert_eq!(result["chainLength"], 0);
        assert_eq!(result["totalConfidence"], 0.0);
    }

    #[tokio::test]
    async fn max_depth_bounds_the_walk() {
        let (store, _dir) = test_store().await;
        store.insert_causal_link(&link("a", "step b", 0.9)).unwrap();
        store.insert_causal_link(&link("step b", "step c", 0.9)).unwrap();
        store.insert_causal_link(&link("step c", "step d", 0.9)).unwrap();

        let args = serde_json::json!({ "effect": "step d", "maxDepth": 2 });
        let result = execute(&store, Some(args)).await.unwrap();
        assert_eq!(result["chainLength"], 2);
    }

    #[tokio::test]
    async fn cyclic_links_terminate() {
        let (store, _dir) = test_store().await;
        store.insert_causal_link(&link("stress at work", "poor sleep", 0.8)).unwrap();
        store.insert_causal_link(&link("poor sleep", "stress at work", 0.8)).unwrap();

        let args = serde_json::json!({ "effect": "poor sleep" });
        let result = execute(&store, Some(args)).await.unwrap();
        assert!(result["chainLength"].as_u64().unwrap() <= 2);
    }

    #[tokio::test]
    async fn higher_confidence_link_wins_ties() {
        let (store, _dir) = test_store().await;
        store.insert_causal_link(&link("weak cause", "the outage", 0.4)).unwrap();
        store.insert_causal_link(&link("strong cause", "the outage", 0.9)).unwrap();

        let args = serde_json::json!({ "effect": "the outage" });
        let result = execute(&store, Some(args)).await.unwrap();
        assert_eq!(result["chain"][0]["cause"], "strong cause");
    }
}
