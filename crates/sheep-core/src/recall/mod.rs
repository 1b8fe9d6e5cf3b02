//! Recall Engine
//!
//! Answers natural-language questions against the memory store. The
//! pipeline is: special-path self-reports → question classification →
//! retrieval (session-cached facts, two-hop expansion for inference) →
//! adversarial filter → model synthesis → deterministic calibration.
//! Every failure degrades to a valid answer; recall never errors out.

pub mod adversarial;
mod cache;
pub mod calibrate;
pub mod classify;

pub use adversarial::{EntityIndex, NO_INFORMATION};
pub use cache::RecallCaches;
pub use calibrate::calibrate;
pub use classify::{classify, QuestionType};

use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::extract::temporal;
use crate::llm::{complete_with_retries, CompleteOptions, LlmError, ModelHandle};
use crate::memory::Fact;
use crate::scheduler::SleepScheduler;
use crate::storage::MemoryStore;
use crate::{ids, text};

/// Retry backoff for synthesis completions
const SYNTHESIS_DELAYS: &[StdDuration] = &[
    StdDuration::from_secs(5),
    StdDuration::from_secs(15),
    StdDuration::from_secs(45),
];

/// Facts kept after ranking
const MAX_CONTEXT_FACTS: usize = 100;

/// Facts named verbatim in a degraded answer
const MAX_DEGRADED_FACTS: usize = 5;

/// Retrieval / synthesis mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecallMode {
    /// Extracted facts only
    #[default]
    Memory,
    /// Facts plus the raw conversation transcript
    Hybrid,
}

impl RecallMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecallMode::Memory => "memory",
            RecallMode::Hybrid => "hybrid",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "hybrid" => RecallMode::Hybrid,
            _ => RecallMode::Memory,
        }
    }
}

/// What recall hands back; always well-formed
#[derive(Debug, Clone)]
pub struct RecallOutcome {
    pub answer: String,
    pub mode: RecallMode,
    /// Facts that informed the answer, best first
    pub facts: Vec<Fact>,
    /// Present when the answer is a degraded fallback
    pub error: Option<String>,
}

/// The recall engine; shares the store's caches process-wide
pub struct RecallEngine {
    store: Arc<MemoryStore>,
    model: Option<ModelHandle>,
    caches: Arc<RecallCaches>,
    scheduler: Option<SleepScheduler>,
}

impl RecallEngine {
    /// Build the engine and wire cache invalidation into the store's
    /// fact-write hook.
    pub fn new(store: Arc<MemoryStore>, model: Option<ModelHandle>) -> Self {
        let caches = Arc::new(RecallCaches::new());
        let hook_caches = caches.clone();
        store.set_fact_write_hook(Arc::new(move || hook_caches.invalidate()));
        Self {
            store,
            model,
            caches,
            scheduler: None,
        }
    }

    /// Attach a scheduler handle so self-reports can include its status
    pub fn with_scheduler(mut self, scheduler: SleepScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Answer a question. Never fails; degraded answers carry `error`.
    pub async fn recall(
        &self,
        query: &str,
        session_id: &str,
        mode: RecallMode,
        transcript: Option<&str>,
    ) -> RecallOutcome {
        let query = query.trim();
        if query.is_empty() {
            return RecallOutcome {
                answer: NO_INFORMATION.to_string(),
                mode,
                facts: Vec::new(),
                error: None,
            };
        }

        // Special path: self-reports never touch the model
        if let Some(report) = self.self_report(query) {
            return RecallOutcome {
                answer: report,
                mode,
                facts: Vec::new(),
                error: None,
            };
        }

        let question_type = classify(query);
        let facts = self.retrieve(query, session_id, question_type);

        // Adversarial filter applies to pure memory recall
        if mode == RecallMode::Memory {
            let index = self
                .caches
                .entity_index(|| EntityIndex::build(&self.store.active_facts().unwrap_or_default()));
            if index.is_adversarial(query) {
                return RecallOutcome {
                    answer: NO_INFORMATION.to_string(),
                    mode,
                    facts: Vec::new(),
                    error: None,
                };
            }
        }

        if mode == RecallMode::Memory && facts.is_empty() {
            return RecallOutcome {
                answer: NO_INFORMATION.to_string(),
                mode,
                facts: Vec::new(),
                error: None,
            };
        }

        for fact in &facts {
            let _ = self.store.touch_fact(&fact.id);
        }

        let Some(model) = self.model.as_deref() else {
            return self.degraded(query, mode, facts, "no language model configured");
        };

        let prompt = self.build_prompt(query, question_type, &facts, mode, transcript);
        let opts = CompleteOptions {
            max_tokens: question_type.token_budget(),
            temperature: 0.0,
            system: None,
            json_mode: false,
        };

        match complete_with_retries(model, &prompt, &opts, SYNTHESIS_DELAYS).await {
            Ok(raw) => RecallOutcome {
                answer: calibrate(&raw, question_type),
                mode,
                facts,
                error: None,
            },
            Err(err) => {
                let detail = match &err {
                    LlmError::BadRequest(_) => "provider configuration rejected the request",
                    LlmError::RateLimited(_) => "rate limited after retries",
                    LlmError::Timeout(_) => "synthesis timed out",
                    _ => "language model unavailable",
                };
                tracing::warn!(error = %err, "synthesis failed; returning degraded answer");
                self.degraded(query, mode, facts, detail)
            }
        }
    }

    // ------------------------------------------------------------------
    // Special paths
    // ------------------------------------------------------------------

    fn self_report(&self, query: &str) -> Option<String> {
        let q = query.to_lowercase();
        let is_identity = q.contains("who are you")
            || q.contains("what are you")
            || q.contains("your version")
            || q.contains("which version");
        let is_status =
            q.contains("system status") || q.contains("memory status") || q.contains("health check");
        if !is_identity && !is_status {
            return None;
        }

        let stats = self.store.stats().ok()?;
        let model_state = match &self.model {
            Some(m) => format!("model '{}' configured", m.name()),
            None => "no model configured (pattern-only)".to_string(),
        };
        let scheduler_state = match &self.scheduler {
            Some(s) => {
                let status = s.status();
                format!(
                    "scheduler tracking {} agent(s), {} active",
                    status.known_agents,
                    status.active_agents.len()
                )
            }
            None => "scheduler not attached".to_string(),
        };
        Some(format!(
            "Cognitive memory store v{} for agent '{}': {} active facts ({} total), \
{} episodes, {} causal links, {} procedures; {}; {}.",
            crate::VERSION,
            self.store.agent_id(),
            stats.active_facts,
            stats.total_facts,
            stats.episodes,
            stats.causal_links,
            stats.procedures,
            scheduler_state,
            model_state,
        ))
    }

    // ------------------------------------------------------------------
    // Retrieval
    // ------------------------------------------------------------------

    fn query_tokens(query: &str) -> Vec<String> {
        text::tokenize(query)
            .into_iter()
            .map(|t| t.strip_suffix("'s").map(str::to_string).unwrap_or(t))
            .filter(|t| t.len() >= 3 && !text::is_stopword(t))
            .collect()
    }

    fn fact_text(fact: &Fact) -> String {
        format!(
            "{} {} {}",
            fact.subject,
            fact.predicate.replace('_', " "),
            fact.object
        )
        .to_lowercase()
    }

    /// Session-cached retrieval with two-hop expansion for inference
    fn retrieve(&self, query: &str, session_id: &str, question_type: QuestionType) -> Vec<Fact> {
        let snapshot = self.caches.session_facts(session_id, || {
            self.store.active_facts().unwrap_or_default()
        });
        let tokens = Self::query_tokens(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        // Hop one: facts directly mentioning a question token
        let mut selected: Vec<Fact> = snapshot
            .iter()
            .filter(|f| {
                let haystack = Self::fact_text(f);
                tokens.iter().any(|t| haystack.contains(t.as_str()))
            })
            .cloned()
            .collect();

        // Token scan found nothing: fall back to the store's ranked
        // keyword index, which stems ("moving" matches "moved")
        if selected.is_empty() {
            selected = self.store.search_facts(query, 20).unwrap_or_default();
        }

        // Hop two (inference only): facts whose subject appears in the
        // objects of hop one
        if question_type == QuestionType::Inference {
            let hop_objects: Vec<String> =
                selected.iter().map(|f| f.object.to_lowercase()).collect();
            let known: Vec<String> = selected.iter().map(|f| f.id.clone()).collect();
            for fact in snapshot.iter() {
                if known.contains(&fact.id) {
                    continue;
                }
                let subject = fact.subject.to_lowercase();
                if subject != "user" && hop_objects.iter().any(|o| o.contains(&subject)) {
                    selected.push(fact.clone());
                }
            }
        }

        selected.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        selected.truncate(MAX_CONTEXT_FACTS);
        selected
    }

    // ------------------------------------------------------------------
    // Synthesis
    // ------------------------------------------------------------------

    fn build_prompt(
        &self,
        query: &str,
        question_type: QuestionType,
        facts: &[Fact],
        mode: RecallMode,
        transcript: Option<&str>,
    ) -> String {
        let mut context = String::new();
        if !facts.is_empty() {
            context.push_str("Known facts:\n");
            for fact in facts {
                context.push_str(&format!(
                    "- {} {} {} (confidence {:.2})\n",
                    fact.subject,
                    fact.predicate.replace('_', " "),
                    fact.object,
                    fact.confidence
                ));
            }
        }
        if mode == RecallMode::Hybrid {
            if let Some(t) = transcript {
                context.push_str("\nConversation:\n");
                context.push_str(t);
                context.push('\n');
            }
        }

        format!(
            "Today's date: {date}.\n\n{context}\nQuestion: {query}\n{instruction}",
            date = temporal::format_date(ids::now()),
            instruction = question_type.instruction(),
        )
    }

    /// Degraded answer: name up to five supporting facts verbatim plus a
    /// short diagnostic suffix. Never surfaces an internal failure.
    fn degraded(
        &self,
        _query: &str,
        mode: RecallMode,
        facts: Vec<Fact>,
        detail: &str,
    ) -> RecallOutcome {
        if facts.is_empty() {
            return RecallOutcome {
                answer: NO_INFORMATION.to_string(),
                mode,
                facts,
                error: Some(detail.to_string()),
            };
        }
        let listed = facts
            .iter()
            .take(MAX_DEGRADED_FACTS)
            .map(|f| format!("{} {} {}", f.subject, f.predicate.replace('_', " "), f.object))
            .collect::<Vec<_>>()
            .join("; ");
        RecallOutcome {
            answer: format!("From memory: {listed} [{detail}]"),
            mode,
            facts,
            error: Some(detail.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use tempfile::TempDir;

    fn store() -> (Arc<MemoryStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let s = MemoryStore::open_at("test-agent", dir.path().join("t.sqlite")).unwrap();
        (Arc::new(s), dir)
    }

    fn seed_identity(store: &MemoryStore) {
        store
            .insert_fact(&Fact::new("user", "name_is", "Alex Chen", 0.95))
            .unwrap();
        store
            .insert_fact(&Fact::new("user", "works_at", "TechCorp", 0.9))
            .unwrap();
    }

    #[tokio::test]
    async fn memory_recall_answers_from_facts() {
        let (store, _dir) = store();
        seed_identity(&store);
        let model = Arc::new(ScriptedModel::new());
        model.push_reply("Alex Chen");
        let engine = RecallEngine::new(store, Some(model as ModelHandle));

        let outcome = engine
            .recall("What is my name?", "s1", RecallMode::Memory, None)
            .await;
        assert_eq!(outcome.answer, "Alex Chen");
        assert!(outcome.error.is_none());
        assert!(!outcome.facts.is_empty());
    }

    #[tokio::test]
    async fn empty_memory_returns_the_literal() {
        let (store, _dir) = store();
        let engine = RecallEngine::new(store, None);
        let outcome = engine
            .recall("What is my name?", "s1", RecallMode::Memory, None)
            .await;
        assert_eq!(outcome.answer, NO_INFORMATION);
    }

    #[tokio::test]
    async fn adversarial_question_short_circuits_before_the_model() {
        let (store, _dir) = store();
        for i in 0..25 {
            store
                .insert_fact(&Fact::new("Caroline", "plans", format!("adoption step {i}"), 0.8))
                .unwrap();
            store
                .insert_fact(&Fact::new("Melanie", "enjoys", format!("painting style {i}"), 0.8))
                .unwrap();
        }
        let model = Arc::new(ScriptedModel::new());
        let engine = RecallEngine::new(store, Some(model.clone() as ModelHandle));

        let outcome = engine
            .recall(
                "What are Melanie's adoption plans?",
                "s1",
                RecallMode::Memory,
                None,
            )
            .await;
        assert_eq!(outcome.answer, NO_INFORMATION);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn bad_request_degrades_without_retry() {
        let (store, _dir) = store();
        seed_identity(&store);
        let model = Arc::new(ScriptedModel::new());
        model.push_error(LlmError::BadRequest("missing key".into()));
        let engine = RecallEngine::new(store, Some(model.clone() as ModelHandle));

        let outcome = engine
            .recall("Where does the user work?", "s1", RecallMode::Memory, None)
            .await;
        assert!(outcome.error.is_some());
        assert!(outcome.answer.contains("TechCorp"));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn cache_invalidation_sees_new_facts() {
        let (store, _dir) = store();
        seed_identity(&store);
        let engine = RecallEngine::new(store.clone(), None);

        // Prime the session cache
        let _ = engine
            .recall("Where does the user work?", "s1", RecallMode::Memory, None)
            .await;

        // A write invalidates; the next recall must see the new fact
        store
            .insert_fact(&Fact::new("user", "lives_in", "Seattle", 0.9))
            .unwrap();
        let outcome = engine
            .recall("Where does the user live?", "s1", RecallMode::Memory, None)
            .await;
        assert!(outcome
            .facts
            .iter()
            .any(|f| f.object == "Seattle"));
    }

    #[tokio::test]
    async fn self_report_answers_without_model() {
        let (store, _dir) = store();
        seed_identity(&store);
        let model = Arc::new(ScriptedModel::new());
        let engine = RecallEngine::new(store, Some(model.clone() as ModelHandle));

        let outcome = engine
            .recall("Who are you?", "s1", RecallMode::Memory, None)
            .await;
        assert!(outcome.answer.contains("test-agent"));
        assert!(outcome.answer.contains("2 active facts"));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn hybrid_mode_includes_transcript() {
        let (store, _dir) = store();
        seed_identity(&store);
        let model = Arc::new(ScriptedModel::new());
        model.push_reply("TechCorp");
        let engine = RecallEngine::new(store, Some(model as ModelHandle));

        let outcome = engine
            .recall(
                "Where does the user work?",
                "s1",
                RecallMode::Hybrid,
                Some("[session 1, 9 June 2023]\nuser: I work at TechCorp"),
            )
            .await;
        assert_eq!(outcome.answer, "TechCorp");
        assert_eq!(outcome.mode, RecallMode::Hybrid);
    }

    #[tokio::test]
    async fn two_hop_expansion_pulls_linked_subjects() {
        let (store, _dir) = store();
        store
            .insert_fact(&Fact::new("user", "manager_is", "Sofia", 0.9))
            .unwrap();
        store
            .insert_fact(&Fact::new("Sofia", "works_at", "TechCorp", 0.85))
            .unwrap();
        let model = Arc::new(ScriptedModel::new());
        model.push_reply("Because Sofia works at TechCorp.");
        let engine = RecallEngine::new(store, Some(model as ModelHandle));

        let outcome = engine
            .recall(
                "Why is the user's manager important?",
                "s1",
                RecallMode::Memory,
                None,
            )
            .await;
        // Hop one finds the manager fact, hop two pulls Sofia's facts
        assert!(outcome.facts.iter().any(|f| f.subject == "Sofia"));
    }
}
