//! Consolidation Pipeline
//!
//! One orchestrator per run, executing the sleep-cycle stages strictly in
//! order: bootstrap → window → episodes → facts → contradictions →
//! preferences → procedures → causal links → foresights → profile →
//! LLM sleep → active forgetting → limit enforcement → finalize.
//!
//! Failure policy: window/episode/fact stages, limit enforcement, and
//! finalization are fatal (the run is marked `failed`); everything in
//! between is best-effort and only logs a warning.

pub mod contradiction;
mod profile;
mod sleep;

pub use contradiction::{resolve_contradiction, rule_based_winner, ModelResolution, Verdict, Winner};
pub use profile::{mirror_preferences, rebuild_profile, sync_relationships};
pub use sleep::{SleepConfig, SleepOutcome, SleepPass};

use std::sync::Arc;
use std::time::Duration as StdDuration;
use std::time::Instant;

use crate::extract::{self, ExtractOptions};
use crate::forgetting;
use crate::llm::{cosine_similarity, EmbedderHandle, LanguageModel, ModelHandle};
use crate::memory::{CausalLink, ConsolidationRun, Episode, Fact, Foresight, Procedure, RunStatus};
use crate::session::SessionBatch;
use crate::ids;
use crate::storage::{MemoryLimits, MemoryStore, StoreError};

/// Backoff before bootstrap retries
const BOOTSTRAP_DELAYS: &[StdDuration] = &[
    StdDuration::from_secs(1),
    StdDuration::from_secs(2),
    StdDuration::from_secs(4),
];

/// Backoff before sleep retries
const SLEEP_DELAYS: &[StdDuration] = &[StdDuration::from_secs(2), StdDuration::from_secs(4)];

/// Pipeline error type; carries the stage that failed
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("fatal failure in stage '{stage}': {source}")]
    Fatal {
        stage: &'static str,
        #[source]
        source: StoreError,
    },
}

/// Pipeline tunables
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Subject label for the human speaker
    pub canonical_user: String,
    /// Cap on episodes created per run
    pub max_episodes_per_run: usize,
    /// Causal links kept per episode
    pub max_causal_links_per_episode: usize,
    /// Whether the sleep sub-passes run at all
    pub enable_sleep: bool,
    /// Retention floor for active forgetting
    pub min_retention_score: f64,
    /// Size caps enforced at the end of the run
    pub limits: MemoryLimits,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            canonical_user: "user".to_string(),
            max_episodes_per_run: 20,
            max_causal_links_per_episode: 2,
            enable_sleep: true,
            min_retention_score: forgetting::DEFAULT_MIN_RETENTION_SCORE,
            limits: MemoryLimits::default(),
        }
    }
}

/// Outcome of one run: the finalized run record plus the degradation flag
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run: ConsolidationRun,
    /// True when the run proceeded in pattern-only mode
    pub degraded: bool,
}

/// Fact objects at least this similar count as restatements
const EMBEDDING_DEDUPE_THRESHOLD: f32 = 0.92;

/// The sleep-cycle orchestrator
pub struct ConsolidationPipeline {
    store: Arc<MemoryStore>,
    model: Option<ModelHandle>,
    embedder: Option<EmbedderHandle>,
    config: PipelineConfig,
}

impl ConsolidationPipeline {
    pub fn new(store: Arc<MemoryStore>, model: Option<ModelHandle>, config: PipelineConfig) -> Self {
        Self {
            store,
            model,
            embedder: None,
            config,
        }
    }

    /// Attach the optional embedding capability for semantic fact dedupe
    pub fn with_embedder(mut self, embedder: EmbedderHandle) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Stage 1: probe the model with bounded retries; on failure proceed
    /// pattern-only, recording the degradation without failing the run.
    async fn bootstrap(&self) -> Option<&dyn LanguageModel> {
        let model = self.model.as_deref()?;
        for (attempt, delay) in std::iter::once(&StdDuration::ZERO)
            .chain(BOOTSTRAP_DELAYS.iter())
            .enumerate()
        {
            if !delay.is_zero() {
                tokio::time::sleep(*delay).await;
            }
            match model.health_check().await {
                Ok(()) => return Some(model),
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "model bootstrap attempt failed");
                }
            }
        }
        tracing::warn!("model unavailable; consolidating in pattern-only mode");
        None
    }

    /// Run the full pipeline over the given sessions
    pub async fn run(&self, sessions: &[SessionBatch]) -> Result<RunReport, PipelineError> {
        let started = Instant::now();

        // Stage 1: bootstrap
        let model = self.bootstrap().await;
        let degraded = self.model.is_some() && model.is_none();

        // Stage 2: compute window, open the run record
        let processed_from = self
            .store
            .last_completed_run()
            .map_err(|e| fatal("window", e))?
            .map(|r| r.processed_to)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH);
        let processed_to = ids::now();
        let mut run = ConsolidationRun::open(processed_from, processed_to);
        self.store.open_run(&run).map_err(|e| fatal("window", e))?;
        tracing::info!(
            run = %run.id,
            from = %processed_from,
            to = %processed_to,
            degraded,
            "consolidation run started"
        );

        let result = self
            .run_stages(&mut run, sessions, model, processed_from, processed_to)
            .await;

        // Stage 14: finalize
        run.duration_ms = started.elapsed().as_millis() as i64;
        match result {
            Ok(()) => {
                run.status = RunStatus::Completed;
                self.store
                    .finalize_run(&run)
                    .map_err(|e| fatal("finalize", e))?;
                tracing::info!(
                    run = %run.id,
                    episodes = run.episodes,
                    facts = run.facts,
                    causal_links = run.causal_links,
                    procedures = run.procedures,
                    contradictions = run.contradictions_resolved,
                    pruned = run.memories_pruned,
                    duration_ms = run.duration_ms,
                    "consolidation run completed"
                );
                Ok(RunReport { run, degraded })
            }
            Err(err) => {
                run.status = RunStatus::Failed;
                run.error = Some(err.to_string());
                if let Err(finalize_err) = self.store.finalize_run(&run) {
                    tracing::error!(error = %finalize_err, "could not record failed run");
                }
                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        run: &mut ConsolidationRun,
        sessions: &[SessionBatch],
        model: Option<&dyn LanguageModel>,
        processed_from: chrono::DateTime<chrono::Utc>,
        processed_to: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), PipelineError> {
        let mut episode_budget = self.config.max_episodes_per_run;
        let mut new_facts: Vec<Fact> = Vec::new();
        let mut stored_episodes: Vec<(Episode, String)> = Vec::new();

        // Stages 3-4 (fatal): episodes and facts per session
        for session in sessions {
            let in_window: Vec<_> = session
                .messages
                .iter()
                .filter(|m| m.timestamp > processed_from && m.timestamp <= processed_to)
                .cloned()
                .collect();
            if in_window.is_empty() {
                continue;
            }
            run.sessions += 1;

            let mut window_batch = SessionBatch::new(session.session_id.clone(), in_window);
            window_batch.date = session.date;
            let conversation_date = window_batch.conversation_date();

            let drafts = match model {
                Some(m) => {
                    extract::episodes::build_drafts_with_model(m, &window_batch, episode_budget)
                        .await
                }
                None => extract::episodes::build_drafts(&window_batch, episode_budget),
            };
            episode_budget = episode_budget.saturating_sub(drafts.len());

            for draft in drafts {
                let episode = self
                    .insert_episode_from_draft(&window_batch.session_id, &draft)
                    .map_err(|e| fatal("episodes", e))?;
                run.episodes += 1;

                // Stage 4: facts for this episode (fatal on storage errors,
                // tolerant of extraction errors)
                let date_label = extract::temporal::format_date(conversation_date);
                let candidates = match model {
                    Some(m) => match extract::facts::extract_with_model(
                        m,
                        &draft.transcript,
                        &episode.id,
                        Some(&date_label),
                        &ExtractOptions::default(),
                    )
                    .await
                    {
                        Ok(c) => c,
                        Err(err) => {
                            tracing::warn!(error = %err, "fact extraction fell back to patterns");
                            extract::facts::extract_with_patterns(
                                &draft.transcript,
                                &episode.id,
                                &ExtractOptions::default(),
                            )
                        }
                    },
                    None => extract::facts::extract_with_patterns(
                        &draft.transcript,
                        &episode.id,
                        &ExtractOptions::default(),
                    ),
                };

                for candidate in candidates {
                    let inserted = self
                        .store_fact_candidate(run, model, &candidate)
                        .await
                        .map_err(|e| fatal("facts", e))?;
                    if let Some(fact) = inserted {
                        run.facts += 1;
                        new_facts.push(fact);
                    }
                }

                stored_episodes.push((episode, draft.transcript.clone()));
            }
        }

        // Stage 6 (best-effort): preference wiring
        match mirror_preferences(&self.store, &self.config.canonical_user, &new_facts) {
            Ok(n) if n > 0 => tracing::debug!(mirrored = n, "preferences mirrored"),
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "preference wiring failed"),
        }

        // Stage 7 (best-effort): procedures
        for (episode, transcript) in &stored_episodes {
            let candidates = match model {
                Some(m) => extract::procedures::extract_with_model(
                    m,
                    transcript,
                    &episode.id,
                    &ExtractOptions::default(),
                )
                .await
                .unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "procedure extraction fell back to patterns");
                    extract::procedures::extract_with_patterns(
                        transcript,
                        &episode.id,
                        &ExtractOptions::default(),
                    )
                }),
                None => extract::procedures::extract_with_patterns(
                    transcript,
                    &episode.id,
                    &ExtractOptions::default(),
                ),
            };
            for candidate in candidates {
                match self.store_procedure_candidate(&candidate) {
                    Ok(true) => run.procedures += 1,
                    Ok(false) => {}
                    Err(err) => tracing::warn!(error = %err, "procedure insert failed"),
                }
            }
        }

        // Stage 8 (best-effort): causal links, model-only
        if let Some(m) = model {
            for (episode, transcript) in &stored_episodes {
                let opts = ExtractOptions {
                    max_items: self.config.max_causal_links_per_episode,
                    ..Default::default()
                };
                match extract::causal::extract_with_model(
                    m,
                    transcript,
                    &episode.id,
                    episode.timestamp,
                    &opts,
                )
                .await
                {
                    Ok(candidates) => {
                        for candidate in candidates {
                            match self.store_causal_candidate(episode, &candidate) {
                                Ok(()) => run.causal_links += 1,
                                Err(err) => {
                                    tracing::warn!(error = %err, "causal link insert failed");
                                }
                            }
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "causal extraction failed"),
                }
            }
        }

        // Stage 9 (best-effort): foresights, model-only
        if let Some(m) = model {
            for (episode, transcript) in &stored_episodes {
                match extract::foresight::extract_with_model(
                    m,
                    transcript,
                    &episode.id,
                    episode.timestamp,
                    &ExtractOptions::default(),
                )
                .await
                {
                    Ok(candidates) => {
                        if let Err(err) = self.store_foresights(episode, candidates) {
                            tracing::warn!(error = %err, "foresight insert failed");
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "foresight extraction failed"),
                }
            }
        }

        // Expire foresights whose window has closed
        match self.expire_foresights() {
            Ok(n) if n > 0 => tracing::debug!(expired = n, "foresights deactivated"),
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "foresight expiry failed"),
        }

        // Stage 10 (best-effort): profile discrimination and relationships
        if let Err(err) = rebuild_profile(&self.store, &self.config.canonical_user) {
            tracing::warn!(error = %err, "profile rebuild failed");
        }
        if let Err(err) = sync_relationships(&self.store, &self.config.canonical_user) {
            tracing::warn!(error = %err, "relationship sync failed");
        }

        // Stage 11 (best-effort): LLM sleep with bounded retries
        if self.config.enable_sleep {
            if let Some(m) = model {
                self.run_sleep_with_retries(m, &run.id).await;
            }
        }

        // Stage 12 (best-effort): active forgetting
        match forgetting::run_active_forgetting(
            &self.store,
            self.config.min_retention_score,
            Some(&run.id),
        ) {
            Ok(report) => run.memories_pruned += report.total(),
            Err(err) => tracing::warn!(error = %err, "active forgetting failed"),
        }

        // Stage 13 (fatal): size-limit enforcement
        if self
            .store
            .limits_exceeded(&self.config.limits)
            .map_err(|e| fatal("limits", e))?
        {
            let report = self
                .store
                .enforce_limits(&self.config.limits)
                .map_err(|e| fatal("limits", e))?;
            run.memories_pruned += report.total();
        }

        Ok(())
    }

    /// Deactivate foresights whose expectation window has closed
    fn expire_foresights(&self) -> Result<i64, StoreError> {
        let now = ids::now();
        let mut expired = 0;
        for foresight in self.store.foresights(true)? {
            let closed = foresight
                .end_time
                .map(|end| end < now)
                .unwrap_or(false);
            if closed {
                self.store.deactivate_foresight(&foresight.id)?;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn run_sleep_with_retries(&self, model: &dyn LanguageModel, run_id: &str) {
        for (attempt, delay) in std::iter::once(&StdDuration::ZERO)
            .chain(SLEEP_DELAYS.iter())
            .enumerate()
        {
            if !delay.is_zero() {
                tokio::time::sleep(*delay).await;
            }
            match SleepPass::new(&self.store, model, SleepConfig::default(), Some(run_id))
                .run()
                .await
            {
                Ok(_) => return,
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "sleep pass failed");
                }
            }
        }
    }

    fn insert_episode_from_draft(
        &self,
        session_id: &str,
        draft: &extract::EpisodeDraft,
    ) -> Result<Episode, StoreError> {
        let mut episode = Episode::new(session_id, draft.summary.clone());
        episode.timestamp = draft.timestamp;
        episode.participants = draft.participants.clone();
        episode.topic = draft.topic.clone();
        episode.keywords = draft.keywords.clone();
        episode.emotional_salience = draft.emotional_salience;
        episode.utility_score = draft.utility_score;
        episode.message_ids = draft.message_ids.clone();
        episode.ttl = draft.ttl;
        self.store.insert_episode(&episode)?;
        Ok(episode)
    }

    /// Stage 4/5 per candidate: confirm, insert, or insert-and-resolve.
    /// Returns the newly created fact when one was inserted.
    async fn store_fact_candidate(
        &self,
        run: &mut ConsolidationRun,
        model: Option<&dyn LanguageModel>,
        candidate: &extract::FactCandidate,
    ) -> Result<Option<Fact>, StoreError> {
        let existing = self
            .store
            .facts_about(&candidate.subject, Some(&candidate.predicate))?;

        // Exact restatement re-confirms instead of duplicating
        if let Some(same) = existing
            .iter()
            .find(|f| f.object.eq_ignore_ascii_case(&candidate.object))
        {
            self.store
                .confirm_fact(&same.id, &candidate.evidence, candidate.confidence)?;
            return Ok(None);
        }

        // With an embedder attached, near-identical objects also count as
        // restatements ("SF" vs "San Francisco")
        if let Some(embedder) = &self.embedder {
            if let Ok(candidate_vec) = embedder.embed(&candidate.object).await {
                for same_predicate in &existing {
                    if let Ok(existing_vec) = embedder.embed(&same_predicate.object).await {
                        if cosine_similarity(&candidate_vec, &existing_vec)
                            >= EMBEDDING_DEDUPE_THRESHOLD
                        {
                            self.store.confirm_fact(
                                &same_predicate.id,
                                &candidate.evidence,
                                candidate.confidence,
                            )?;
                            return Ok(None);
                        }
                    }
                }
            }
        }

        let fact = Fact::new(
            candidate.subject.clone(),
            &candidate.predicate,
            candidate.object.clone(),
            candidate.confidence,
        )
        .with_evidence(candidate.evidence.clone());

        match self.store.insert_fact(&fact) {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => return Ok(None),
            Err(err) => return Err(err),
        }

        // Unique-predicate conflict: resolve (best-effort stage 5)
        if fact.has_unique_predicate() {
            for conflicting in &existing {
                match resolve_contradiction(&self.store, model, conflicting, &fact, Some(&run.id))
                    .await
                {
                    Ok(_) => run.contradictions_resolved += 1,
                    Err(err) => {
                        tracing::warn!(error = %err, "contradiction resolution failed");
                    }
                }
            }
        }

        Ok(self.store.get_fact(&fact.id)?)
    }

    fn store_procedure_candidate(
        &self,
        candidate: &extract::ProcedureCandidate,
    ) -> Result<bool, StoreError> {
        if self
            .store
            .find_procedure(&candidate.trigger, &candidate.action)?
            .is_some()
        {
            return Ok(false);
        }
        let mut procedure = Procedure::new(candidate.trigger.clone(), candidate.action.clone());
        procedure.expected_outcome = candidate.expected_outcome.clone();
        procedure.examples = candidate.evidence.clone();
        procedure.tags = candidate.tags.clone();
        self.store.insert_procedure(&procedure)?;
        Ok(true)
    }

    fn store_causal_candidate(
        &self,
        episode: &Episode,
        candidate: &extract::CausalCandidate,
    ) -> Result<(), StoreError> {
        let mut link = CausalLink::new(
            candidate.cause_description.clone(),
            candidate.effect_description.clone(),
            candidate.confidence,
        );
        link.cause_kind = candidate.cause_kind;
        link.effect_kind = candidate.effect_kind;
        // Both sides extracted from the same text: self-referential ids
        link.cause_id = episode.id.clone();
        link.effect_id = episode.id.clone();
        link.mechanism = candidate.mechanism.clone();
        link.temporal_delay = candidate.temporal_delay.clone();
        link.evidence = candidate.evidence.clone();
        self.store.insert_causal_link(&link)
    }

    fn store_foresights(
        &self,
        episode: &Episode,
        candidates: Vec<extract::ForesightCandidate>,
    ) -> Result<(), StoreError> {
        let stored = self.store.foresights(false)?;
        for candidate in candidates {
            let prefix = normalize_prefix(&candidate.description);
            let duplicate = stored
                .iter()
                .any(|f| extract::foresight::prefixes_match(&f.dedupe_prefix(), &prefix));
            if duplicate {
                continue;
            }
            let mut foresight = Foresight::new(candidate.description.clone(), candidate.start_time);
            foresight.end_time = candidate.end_time;
            foresight.duration_days = candidate.duration_days;
            foresight.confidence = candidate.confidence;
            foresight.source_episode_id = Some(episode.id.clone());
            self.store.insert_foresight(&foresight)?;
        }
        Ok(())
    }
}

fn normalize_prefix(description: &str) -> String {
    description.trim().to_lowercase().chars().take(40).collect()
}

fn fatal(stage: &'static str, source: StoreError) -> PipelineError {
    PipelineError::Fatal { stage, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use crate::session::RawMessage;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn store() -> (Arc<MemoryStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let s = MemoryStore::open_at("t", dir.path().join("t.sqlite")).unwrap();
        (Arc::new(s), dir)
    }

    fn batch(session: &str, lines: &[(&str, &str)]) -> SessionBatch {
        let base = Utc.with_ymd_and_hms(2023, 6, 9, 9, 0, 0).unwrap();
        let messages = lines
            .iter()
            .enumerate()
            .map(|(i, (role, content))| {
                RawMessage::new(*role, *content, base + Duration::minutes(i as i64))
            })
            .collect();
        SessionBatch::new(session, messages)
    }

    #[tokio::test]
    async fn pattern_only_run_extracts_facts() {
        let (store, _dir) = store();
        let pipeline =
            ConsolidationPipeline::new(store.clone(), None, PipelineConfig::default());

        let sessions = vec![batch(
            "s1",
            &[
                ("user", "My name is Alex Chen"),
                ("assistant", "Nice to meet you"),
                ("user", "I work at TechCorp"),
                ("assistant", "Cool"),
            ],
        )];
        let report = pipeline.run(&sessions).await.unwrap();
        assert_eq!(report.run.status, RunStatus::Completed);
        assert_eq!(report.run.sessions, 1);
        assert_eq!(report.run.episodes, 1);
        assert!(report.run.facts >= 2);
        assert!(!report.degraded);

        let names = store.facts_about("user", Some("name_is")).unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].object, "Alex Chen");
    }

    #[tokio::test]
    async fn rerun_with_no_new_sessions_is_idempotent() {
        let (store, _dir) = store();
        let pipeline =
            ConsolidationPipeline::new(store.clone(), None, PipelineConfig::default());
        let sessions = vec![batch("s1", &[("user", "I live in Seattle")])];

        let first = pipeline.run(&sessions).await.unwrap();
        assert_eq!(first.run.episodes, 1);

        let second = pipeline.run(&sessions).await.unwrap();
        assert_eq!(second.run.sessions, 0);
        assert_eq!(second.run.episodes, 0);
        assert_eq!(second.run.facts, 0);
        assert_eq!(second.run.causal_links, 0);
        assert_eq!(second.run.procedures, 0);
    }

    #[tokio::test]
    async fn repeated_statement_confirms_instead_of_duplicating() {
        let (store, _dir) = store();
        let pipeline =
            ConsolidationPipeline::new(store.clone(), None, PipelineConfig::default());

        pipeline
            .run(&[batch("s1", &[("user", "I work at TechCorp")])])
            .await
            .unwrap();

        // A later session restates the same fact
        let mut later = batch("s2", &[("user", "I work at TechCorp")]);
        for m in later.messages.iter_mut() {
            m.timestamp = ids::now();
        }
        let report = pipeline.run(&[later]).await.unwrap();
        assert_eq!(report.run.facts, 0);

        let facts = store.facts_about("user", Some("works_at")).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].evidence.len(), 2);
    }

    #[tokio::test]
    async fn contradiction_on_unique_predicate_resolves_to_one_active() {
        let (store, _dir) = store();
        let pipeline =
            ConsolidationPipeline::new(store.clone(), None, PipelineConfig::default());

        pipeline
            .run(&[batch("s1", &[("user", "I work at Google")])])
            .await
            .unwrap();

        // Recency tie-break needs distinct millisecond timestamps
        std::thread::sleep(std::time::Duration::from_millis(5));
        let mut later = batch("s2", &[("user", "I work at GitHub")]);
        for m in later.messages.iter_mut() {
            m.timestamp = ids::now();
        }
        let report = pipeline.run(&[later]).await.unwrap();
        assert_eq!(report.run.contradictions_resolved, 1);

        let actives = store.facts_about("user", Some("works_at")).unwrap();
        assert_eq!(actives.len(), 1);
        assert_eq!(actives[0].object, "GitHub");
    }

    #[tokio::test(start_paused = true)]
    async fn offline_model_degrades_to_pattern_mode() {
        let (store, _dir) = store();
        let model = Arc::new(ScriptedModel::new());
        model.set_offline(true);
        let pipeline = ConsolidationPipeline::new(
            store.clone(),
            Some(model.clone() as ModelHandle),
            PipelineConfig::default(),
        );

        let report = pipeline
            .run(&[batch("s1", &[("user", "I live in Seattle")])])
            .await
            .unwrap();
        assert!(report.degraded);
        assert_eq!(report.run.status, RunStatus::Completed);
        assert_eq!(store.facts_about("user", Some("lives_in")).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn preferences_mirror_during_the_run() {
        let (store, _dir) = store();
        let pipeline =
            ConsolidationPipeline::new(store.clone(), None, PipelineConfig::default());
        pipeline
            .run(&[batch("s1", &[("user", "I really love hiking.")])])
            .await
            .unwrap();
        let prefs = store.preferences().unwrap();
        assert_eq!(prefs.len(), 1);
        assert_eq!(prefs[0].preference, "hiking");
    }
}
