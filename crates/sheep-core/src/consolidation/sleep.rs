//! LLM Sleep
//!
//! Four optional sub-passes over a snapshot of recent memory: pattern
//! discovery, fact consolidation (merges), connection discovery, and
//! forgetting recommendation. Each sub-pass has its own prompt, a
//! min-input gate, a token budget, and tolerant decoding; results are
//! applied per-item so one bad proposal never sinks the pass.

use serde::Deserialize;

use crate::llm::{complete_bounded, json, CompleteOptions, LanguageModel};
use crate::memory::{CausalLink, CauseKind, CoreMemory, Fact};
use crate::storage::{MemoryStore, Result};

// Min-input gates
const MIN_ITEMS_FOR_PATTERNS: usize = 5;
const MIN_FACTS_FOR_CONSOLIDATION: usize = 3;
const MIN_ITEMS_FOR_CONNECTIONS: usize = 4;
const MIN_ITEMS_FOR_FORGETTING: usize = 10;

// Token budgets per sub-pass
const PATTERN_TOKENS: u32 = 700;
const CONSOLIDATION_TOKENS: u32 = 600;
const CONNECTION_TOKENS: u32 = 600;
const FORGETTING_TOKENS: u32 = 500;

// Snapshot sizes
const SNAPSHOT_EPISODES: usize = 50;
const SNAPSHOT_FACTS: usize = 100;

const PATTERN_TYPES: &[&str] = &["behavioral", "preference", "temporal", "causal", "association"];
const CONNECTION_KINDS: &[&str] = &["similar", "causal", "temporal", "contradicts", "elaborates"];
const FORGET_REASONS: &[&str] = &["redundant", "outdated", "low_value", "superseded", "contradicted"];

/// Which sub-passes run
#[derive(Debug, Clone)]
pub struct SleepConfig {
    pub discover_patterns: bool,
    pub consolidate_facts: bool,
    pub discover_connections: bool,
    pub recommend_forgetting: bool,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            discover_patterns: true,
            consolidate_facts: true,
            discover_connections: true,
            recommend_forgetting: true,
        }
    }
}

/// Counters from one sleep invocation
#[derive(Debug, Clone, Default)]
pub struct SleepOutcome {
    pub patterns_discovered: i64,
    pub facts_merged: i64,
    pub connections_added: i64,
    pub facts_retracted: i64,
    pub episodes_demoted: i64,
}

// ============================================================================
// WIRE SHAPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawPattern {
    pattern_type: String,
    description: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    supporting_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawMerge {
    fact_ids: Vec<String>,
    subject: String,
    predicate: String,
    object: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct RawConnection {
    from_id: String,
    to_id: String,
    kind: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct RawForget {
    target_id: String,
    reason: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.6
}

// ============================================================================
// SLEEP PASS
// ============================================================================

/// One sleep invocation over a memory snapshot
pub struct SleepPass<'a> {
    store: &'a MemoryStore,
    model: &'a dyn LanguageModel,
    config: SleepConfig,
    run_id: Option<&'a str>,
}

struct Snapshot {
    episode_block: String,
    fact_block: String,
    episode_count: usize,
    facts: Vec<Fact>,
}

impl<'a> SleepPass<'a> {
    pub fn new(
        store: &'a MemoryStore,
        model: &'a dyn LanguageModel,
        config: SleepConfig,
        run_id: Option<&'a str>,
    ) -> Self {
        Self {
            store,
            model,
            config,
            run_id,
        }
    }

    fn snapshot(&self) -> Result<Snapshot> {
        let episodes = self.store.recent_episodes(SNAPSHOT_EPISODES)?;
        let mut facts = self.store.active_facts()?;
        facts.truncate(SNAPSHOT_FACTS);

        let episode_block = episodes
            .iter()
            .map(|e| format!("  [{}] {} :: {}", e.id, e.timestamp.format("%Y-%m-%d"), e.summary))
            .collect::<Vec<_>>()
            .join("\n");
        let fact_block = facts
            .iter()
            .map(|f| {
                format!(
                    "  [{}] {} {} {} (confidence {:.2})",
                    f.id, f.subject, f.predicate, f.object, f.confidence
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Snapshot {
            episode_block,
            fact_block,
            episode_count: episodes.len(),
            facts,
        })
    }

    /// Run all enabled sub-passes
    pub async fn run(&self) -> Result<SleepOutcome> {
        let snapshot = self.snapshot()?;
        let mut outcome = SleepOutcome::default();

        if self.config.discover_patterns
            && snapshot.episode_count + snapshot.facts.len() >= MIN_ITEMS_FOR_PATTERNS
        {
            outcome.patterns_discovered = self.discover_patterns(&snapshot).await?;
        }
        if self.config.consolidate_facts && snapshot.facts.len() >= MIN_FACTS_FOR_CONSOLIDATION {
            outcome.facts_merged = self.consolidate_facts(&snapshot).await?;
        }
        if self.config.discover_connections
            && snapshot.episode_count + snapshot.facts.len() >= MIN_ITEMS_FOR_CONNECTIONS
        {
            outcome.connections_added = self.discover_connections(&snapshot).await?;
        }
        if self.config.recommend_forgetting
            && snapshot.episode_count + snapshot.facts.len() >= MIN_ITEMS_FOR_FORGETTING
        {
            let (retracted, demoted) = self.recommend_forgetting(&snapshot).await?;
            outcome.facts_retracted = retracted;
            outcome.episodes_demoted = demoted;
        }

        tracing::info!(
            patterns = outcome.patterns_discovered,
            merges = outcome.facts_merged,
            connections = outcome.connections_added,
            retracted = outcome.facts_retracted,
            demoted = outcome.episodes_demoted,
            "sleep pass complete"
        );
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Sub-pass 1: pattern discovery
    // ------------------------------------------------------------------

    async fn discover_patterns(&self, snapshot: &Snapshot) -> Result<i64> {
        let prompt = format!(
            "Review this memory snapshot and name recurring patterns in the \
user's behavior or life.\n\
EPISODES:\n{}\n\nFACTS:\n{}\n\n\
Respond with ONLY a JSON array:\n\
[{{\"pattern_type\": \"behavioral|preference|temporal|causal|association\", \
\"description\": \"...\", \"confidence\": 0.7, \"supporting_ids\": [\"...\"]}}]",
            snapshot.episode_block, snapshot.fact_block
        );
        let Ok(reply) =
            complete_bounded(self.model, &prompt, &CompleteOptions::json(PATTERN_TOKENS)).await
        else {
            return Ok(0);
        };

        let mut stored = 0;
        for raw in json::decode_list::<RawPattern>(&reply) {
            if !PATTERN_TYPES.contains(&raw.pattern_type.as_str()) || raw.description.is_empty() {
                continue;
            }
            let mut cm = CoreMemory::new(raw.description, format!("pattern:{}", raw.pattern_type));
            cm.importance = raw.confidence.clamp(0.0, 1.0);
            if self.store.insert_core_memory(&cm).is_ok() {
                stored += 1;
            }
        }
        Ok(stored)
    }

    // ------------------------------------------------------------------
    // Sub-pass 2: fact consolidation
    // ------------------------------------------------------------------

    async fn consolidate_facts(&self, snapshot: &Snapshot) -> Result<i64> {
        let prompt = format!(
            "These facts may contain near-duplicates or facts that generalize \
(same subject and predicate, related objects). Propose merges.\n\
FACTS:\n{}\n\n\
Respond with ONLY a JSON array:\n\
[{{\"fact_ids\": [\"fact-a\", \"fact-b\"], \"subject\": \"user\", \
\"predicate\": \"likes\", \"object\": \"merged value\", \"confidence\": 0.8}}]",
            snapshot.fact_block
        );
        let Ok(reply) = complete_bounded(
            self.model,
            &prompt,
            &CompleteOptions::json(CONSOLIDATION_TOKENS),
        )
        .await
        else {
            return Ok(0);
        };

        let mut merged = 0;
        for raw in json::decode_list::<RawMerge>(&reply) {
            if raw.fact_ids.len() < 2 || raw.object.trim().is_empty() {
                continue;
            }
            // Every referenced fact must exist and be active
            let originals: Vec<Fact> = raw
                .fact_ids
                .iter()
                .filter_map(|id| self.store.get_fact(id).ok().flatten())
                .filter(|f| f.is_active)
                .collect();
            if originals.len() < 2 {
                continue;
            }

            let mut evidence: Vec<String> = Vec::new();
            for original in &originals {
                for e in &original.evidence {
                    if !evidence.contains(e) {
                        evidence.push(e.clone());
                    }
                }
            }
            let user_affirmed = originals.iter().any(|f| f.user_affirmed);
            let mut fact = Fact::new(
                raw.subject.trim(),
                &raw.predicate,
                raw.object.trim(),
                raw.confidence,
            )
            .with_evidence(evidence);
            fact.user_affirmed = user_affirmed;

            if self.store.insert_fact(&fact).is_err() {
                continue;
            }
            for original in &originals {
                let _ = self.store.retract_fact(
                    &original.id,
                    &format!("consolidated into {}", fact.id),
                    self.run_id,
                );
            }
            merged += 1;
        }
        Ok(merged)
    }

    // ------------------------------------------------------------------
    // Sub-pass 3: connection discovery
    // ------------------------------------------------------------------

    async fn discover_connections(&self, snapshot: &Snapshot) -> Result<i64> {
        let prompt = format!(
            "Find meaningful connections between these memories that are not \
already linked.\n\
EPISODES:\n{}\n\nFACTS:\n{}\n\n\
Respond with ONLY a JSON array:\n\
[{{\"from_id\": \"...\", \"to_id\": \"...\", \
\"kind\": \"similar|causal|temporal|contradicts|elaborates\", \
\"description\": \"...\", \"confidence\": 0.7}}]",
            snapshot.episode_block, snapshot.fact_block
        );
        let Ok(reply) =
            complete_bounded(self.model, &prompt, &CompleteOptions::json(CONNECTION_TOKENS)).await
        else {
            return Ok(0);
        };

        let mut added = 0;
        for raw in json::decode_list::<RawConnection>(&reply) {
            if !CONNECTION_KINDS.contains(&raw.kind.as_str()) || raw.from_id == raw.to_id {
                continue;
            }
            match raw.kind.as_str() {
                "causal" => {
                    let (from_desc, from_kind) = self.describe(&raw.from_id);
                    let (to_desc, to_kind) = self.describe(&raw.to_id);
                    if from_desc.is_empty() || to_desc.is_empty() {
                        continue;
                    }
                    let mut link = CausalLink::new(from_desc, to_desc, raw.confidence);
                    link.cause_kind = from_kind;
                    link.cause_id = raw.from_id.clone();
                    link.effect_kind = to_kind;
                    link.effect_id = raw.to_id.clone();
                    link.mechanism = raw.description.clone();
                    if self.store.insert_causal_link(&link).is_ok() {
                        added += 1;
                    }
                }
                "contradicts" => {
                    if self.store.add_contradiction(&raw.from_id, &raw.to_id).is_ok() {
                        added += 1;
                    }
                }
                _ => {
                    let description = if raw.description.is_empty() {
                        format!("{} relates to {}", raw.from_id, raw.to_id)
                    } else {
                        raw.description.clone()
                    };
                    let mut cm =
                        CoreMemory::new(description, format!("connection:{}", raw.kind));
                    cm.importance = raw.confidence.clamp(0.0, 1.0);
                    if self.store.insert_core_memory(&cm).is_ok() {
                        added += 1;
                    }
                }
            }
        }
        Ok(added)
    }

    fn describe(&self, id: &str) -> (String, CauseKind) {
        if let Ok(Some(fact)) = self.store.get_fact(id) {
            return (
                format!("{} {} {}", fact.subject, fact.predicate, fact.object),
                CauseKind::Fact,
            );
        }
        if let Ok(Some(episode)) = self.store.get_episode(id) {
            return (episode.summary, CauseKind::Episode);
        }
        (String::new(), CauseKind::Event)
    }

    // ------------------------------------------------------------------
    // Sub-pass 4: forgetting recommendation
    // ------------------------------------------------------------------

    async fn recommend_forgetting(&self, snapshot: &Snapshot) -> Result<(i64, i64)> {
        let prompt = format!(
            "Which of these memories are safe to forget or demote? Be \
conservative: only clearly redundant, outdated, or low-value items.\n\
EPISODES:\n{}\n\nFACTS:\n{}\n\n\
Respond with ONLY a JSON array:\n\
[{{\"target_id\": \"...\", \
\"reason\": \"redundant|outdated|low_value|superseded|contradicted\", \
\"confidence\": 0.8}}]",
            snapshot.episode_block, snapshot.fact_block
        );
        let Ok(reply) =
            complete_bounded(self.model, &prompt, &CompleteOptions::json(FORGETTING_TOKENS)).await
        else {
            return Ok((0, 0));
        };

        let mut retracted = 0;
        let mut demoted = 0;
        for raw in json::decode_list::<RawForget>(&reply) {
            if !FORGET_REASONS.contains(&raw.reason.as_str()) || raw.confidence < 0.5 {
                continue;
            }
            if let Ok(Some(fact)) = self.store.get_fact(&raw.target_id) {
                if fact.user_affirmed || !fact.is_active {
                    continue;
                }
                if self
                    .store
                    .retract_fact(
                        &fact.id,
                        &format!("sleep recommendation: {}", raw.reason),
                        self.run_id,
                    )
                    .is_ok()
                {
                    retracted += 1;
                }
            } else if let Ok(Some(episode)) = self.store.get_episode(&raw.target_id) {
                if self
                    .store
                    .set_episode_ttl(&episode.id, episode.ttl.demoted())
                    .is_ok()
                {
                    demoted += 1;
                }
            }
        }
        Ok((retracted, demoted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedModel};
    use crate::memory::Episode;
    use tempfile::TempDir;

    fn store() -> (MemoryStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let s = MemoryStore::open_at("t", dir.path().join("t.sqlite")).unwrap();
        (s, dir)
    }

    fn seed_facts(store: &MemoryStore, n: usize) -> Vec<Fact> {
        (0..n)
            .map(|i| {
                let f = Fact::new("user", "likes", format!("thing {i}"), 0.7);
                store.insert_fact(&f).unwrap();
                f
            })
            .collect()
    }

    #[tokio::test]
    async fn gates_skip_small_snapshots() {
        let (store, _dir) = store();
        seed_facts(&store, 2); // below every gate
        let model = ScriptedModel::new();
        model.push_error(LlmError::Other("must not be called".into()));

        let pass = SleepPass::new(&store, &model, SleepConfig::default(), None);
        let outcome = pass.run().await.unwrap();
        assert_eq!(outcome.patterns_discovered, 0);
        assert_eq!(outcome.facts_merged, 0);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn merge_proposal_replaces_originals() {
        let (store, _dir) = store();
        let facts = seed_facts(&store, 3);

        let model = ScriptedModel::new();
        // Only the consolidation sub-pass clears its gate at 3 facts
        model.push_reply(format!(
            r#"[{{"fact_ids": ["{}", "{}"], "subject": "user", "predicate": "likes",
                 "object": "things 0 and 1", "confidence": 0.85}}]"#,
            facts[0].id, facts[1].id
        ));

        let config = SleepConfig {
            recommend_forgetting: false,
            ..Default::default()
        };
        let pass = SleepPass::new(&store, &model, config, None);
        let outcome = pass.run().await.unwrap();
        assert_eq!(outcome.facts_merged, 1);

        assert!(!store.get_fact(&facts[0].id).unwrap().unwrap().is_active);
        assert!(!store.get_fact(&facts[1].id).unwrap().unwrap().is_active);
        let merged: Vec<Fact> = store
            .active_facts()
            .unwrap()
            .into_iter()
            .filter(|f| f.object == "things 0 and 1")
            .collect();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].evidence.len(), 0);
    }

    #[tokio::test]
    async fn forgetting_recommendations_spare_affirmed_facts() {
        let (store, _dir) = store();
        let facts = seed_facts(&store, 9);
        let affirmed = Fact::new("user", "name_is", "Alex Chen", 0.9).affirmed();
        store.insert_fact(&affirmed).unwrap();

        let model = ScriptedModel::new();
        model.push_reply(format!(
            r#"[{{"target_id": "{}", "reason": "low_value", "confidence": 0.9}},
                {{"target_id": "{}", "reason": "outdated", "confidence": 0.9}}]"#,
            facts[0].id, affirmed.id
        ));

        let config = SleepConfig {
            discover_patterns: false,
            consolidate_facts: false,
            discover_connections: false,
            recommend_forgetting: true,
        };
        let pass = SleepPass::new(&store, &model, config, None);
        let outcome = pass.run().await.unwrap();
        assert_eq!(outcome.facts_retracted, 1);
        assert!(store.get_fact(&affirmed.id).unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn causal_connections_become_links() {
        let (store, _dir) = store();
        let mut ep = Episode::new("s1", "user started a stressful new job");
        ep.timestamp = crate::ids::now();
        store.insert_episode(&ep).unwrap();
        let facts = seed_facts(&store, 4);

        let model = ScriptedModel::new();
        model.push_reply(format!(
            r#"[{{"from_id": "{}", "to_id": "{}", "kind": "causal",
                 "description": "the job change drives the new preference", "confidence": 0.8}}]"#,
            ep.id, facts[0].id
        ));

        let config = SleepConfig {
            discover_patterns: false,
            consolidate_facts: false,
            discover_connections: true,
            recommend_forgetting: false,
        };
        let pass = SleepPass::new(&store, &model, config, None);
        let outcome = pass.run().await.unwrap();
        assert_eq!(outcome.connections_added, 1);

        let links = store.all_causal_links().unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].cause_id, ep.id);
        assert_eq!(links[0].cause_kind, CauseKind::Episode);
        assert_eq!(links[0].effect_kind, CauseKind::Fact);
    }
}
