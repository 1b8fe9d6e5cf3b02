//! SQLite Store Implementation
//!
//! One database file per agent under `<home>/.clawdbot/sheep/`. Separate
//! reader/writer connections behind mutexes give interior mutability, so
//! all methods take `&self` and the store can be shared as `Arc<MemoryStore>`.
//!
//! Failure model: unique-constraint violations surface as
//! [`StoreError::Duplicate`] and are recoverable; corruption reported by
//! SQLite poisons the handle, after which every write returns
//! [`StoreError::Poisoned`].

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::ids;
use crate::memory::{
    CausalLink, CausalStrength, CauseKind, ChangeType, ConsolidationRun, CoreMemory, Episode,
    EpisodeTtl, Fact, Foresight, MemoryChange, Preference, Procedure, Relationship, RunStatus,
    Sentiment, TargetType, UserProfile,
};

use super::{migrations, Result, StoreError};

/// Hook fired synchronously after every fact write (insert / update /
/// retract). The recall engine registers its cache invalidation here.
pub(super) type FactWriteHook = Arc<dyn Fn() + Send + Sync>;

// ============================================================================
// FILTERS & STATS
// ============================================================================

/// Attribute filter for fact queries
#[derive(Debug, Clone, Default)]
pub struct FactFilter {
    /// Exact subject match (case-insensitive)
    pub subject: Option<String>,
    /// Exact normalized predicate match
    pub predicate: Option<String>,
    /// Exact object match (case-insensitive)
    pub object: Option<String>,
    /// Restrict to the current belief set
    pub active_only: bool,
}

impl FactFilter {
    /// Filter on active facts about a subject
    pub fn active_about(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            active_only: true,
            ..Default::default()
        }
    }
}

/// Store-wide statistics for health reporting
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub episodes: i64,
    pub active_facts: i64,
    pub total_facts: i64,
    pub causal_links: i64,
    pub procedures: i64,
    pub changes: i64,
    pub foresights: i64,
    pub preferences: i64,
    pub db_size_bytes: u64,
    pub last_run_status: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
}

// ============================================================================
// STORE
// ============================================================================

/// The per-agent memory store
pub struct MemoryStore {
    pub(super) writer: Mutex<Connection>,
    pub(super) reader: Mutex<Connection>,
    agent_id: String,
    path: PathBuf,
    poisoned: AtomicBool,
    fact_write_hook: RwLock<Option<FactWriteHook>>,
}

impl MemoryStore {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -32000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(StoreError::Database)?;
        Ok(())
    }

    /// Resolve the default store file for an agent:
    /// `<home>/.clawdbot/sheep/<agent_id>.sqlite`
    pub fn default_path(agent_id: &str) -> Result<PathBuf> {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .or_else(|| {
                directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
            })
            .ok_or_else(|| StoreError::Init("Could not determine home directory".to_string()))?;

        let dir = home.join(".clawdbot").join("sheep");
        std::fs::create_dir_all(&dir)?;
        // Restrict directory permissions to owner-only on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            let _ = std::fs::set_permissions(&dir, perms);
        }
        Ok(dir.join(format!("{agent_id}.sqlite")))
    }

    /// Open (or create) the store for an agent at the default location
    pub fn open(agent_id: &str) -> Result<Self> {
        let path = Self::default_path(agent_id)?;
        Self::open_at(agent_id, path)
    }

    /// Open (or create) the store at an explicit path
    pub fn open_at(agent_id: &str, path: PathBuf) -> Result<Self> {
        let writer_conn = Connection::open(&path).map_err(StoreError::Database)?;

        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Self::configure_connection(&writer_conn)?;
        migrations::apply_migrations(&writer_conn).map_err(StoreError::Database)?;

        let reader_conn = Connection::open(&path).map_err(StoreError::Database)?;
        Self::configure_connection(&reader_conn)?;

        tracing::info!(agent = %agent_id, path = %path.display(), "memory store opened");

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            agent_id: agent_id.to_string(),
            path,
            poisoned: AtomicBool::new(false),
            fact_write_hook: RwLock::new(None),
        })
    }

    /// The agent this store belongs to
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Register the synchronous fact-write invalidation hook
    pub fn set_fact_write_hook(&self, hook: Arc<dyn Fn() + Send + Sync>) {
        if let Ok(mut slot) = self.fact_write_hook.write() {
            *slot = Some(hook);
        }
    }

    fn notify_fact_write(&self) {
        if let Ok(slot) = self.fact_write_hook.read() {
            if let Some(hook) = slot.as_ref() {
                hook();
            }
        }
    }

    /// Fire the fact-write hook from sibling storage modules (pruning
    /// deletes fact rows without going through the update paths).
    pub(super) fn fire_fact_write_hook(&self) {
        self.notify_fact_write();
    }

    /// Whether the handle has declined further writes
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    fn guard_write(&self) -> Result<()> {
        if self.is_poisoned() {
            return Err(StoreError::Poisoned(
                "handle declined writes after earlier corruption".to_string(),
            ));
        }
        Ok(())
    }

    /// Classify a rusqlite error: constraint violations are recoverable,
    /// corruption poisons the handle.
    pub(super) fn classify(&self, err: rusqlite::Error) -> StoreError {
        if let rusqlite::Error::SqliteFailure(ffi, ref msg) = err {
            match ffi.code {
                ErrorCode::ConstraintViolation => {
                    return StoreError::Duplicate(
                        msg.clone().unwrap_or_else(|| "constraint violation".to_string()),
                    );
                }
                ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => {
                    self.poisoned.store(true, Ordering::SeqCst);
                    tracing::error!(agent = %self.agent_id, "database corruption detected; declining further writes");
                    return StoreError::Poisoned(
                        msg.clone().unwrap_or_else(|| "database corrupt".to_string()),
                    );
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }

    pub(super) fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StoreError::Init("writer lock poisoned".to_string()))
    }

    pub(super) fn lock_reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StoreError::Init("reader lock poisoned".to_string()))
    }

    // ========================================================================
    // JSON LIST COLUMNS
    // ========================================================================

    pub(super) fn encode_list(items: &[String]) -> String {
        serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
    }

    pub(super) fn decode_list(raw: &str) -> Vec<String> {
        serde_json::from_str(raw).unwrap_or_default()
    }

    fn encode_pairs(pairs: &[(String, String)]) -> String {
        serde_json::to_string(pairs).unwrap_or_else(|_| "[]".to_string())
    }

    fn decode_pairs(raw: &str) -> Vec<(String, String)> {
        serde_json::from_str(raw).unwrap_or_default()
    }

    // ========================================================================
    // EPISODES
    // ========================================================================

    fn row_to_episode(row: &Row<'_>) -> rusqlite::Result<Episode> {
        let participants: String = row.get("participants")?;
        let keywords: String = row.get("keywords")?;
        let message_ids: String = row.get("message_ids")?;
        let ttl: String = row.get("ttl")?;
        Ok(Episode {
            id: row.get("id")?,
            timestamp: row.get("timestamp")?,
            summary: row.get("summary")?,
            participants: Self::decode_list(&participants),
            topic: row.get("topic")?,
            keywords: Self::decode_list(&keywords),
            emotional_salience: row.get("emotional_salience")?,
            utility_score: row.get("utility_score")?,
            session_id: row.get("session_id")?,
            message_ids: Self::decode_list(&message_ids),
            ttl: EpisodeTtl::parse_name(&ttl),
            access_count: row.get("access_count")?,
            last_access: row.get("last_access")?,
            created_at: row.get("created_at")?,
        })
    }

    /// Insert an episode
    pub fn insert_episode(&self, ep: &Episode) -> Result<()> {
        self.guard_write()?;
        let writer = self.lock_writer()?;
        writer
            .execute(
                "INSERT INTO episodes (
                    id, timestamp, summary, participants, topic, keywords,
                    emotional_salience, utility_score, session_id, message_ids,
                    ttl, access_count, last_access, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    ep.id,
                    ids::to_rfc3339(ep.timestamp),
                    ep.summary,
                    Self::encode_list(&ep.participants),
                    ep.topic,
                    Self::encode_list(&ep.keywords),
                    ep.emotional_salience,
                    ep.utility_score,
                    ep.session_id,
                    Self::encode_list(&ep.message_ids),
                    ep.ttl.as_str(),
                    ep.access_count,
                    ids::to_rfc3339(ep.last_access),
                    ids::to_rfc3339(ep.created_at),
                ],
            )
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    /// Get an episode by id
    pub fn get_episode(&self, id: &str) -> Result<Option<Episode>> {
        let reader = self.lock_reader()?;
        reader
            .query_row(
                "SELECT * FROM episodes WHERE id = ?1",
                params![id],
                Self::row_to_episode,
            )
            .optional()
            .map_err(StoreError::Database)
    }

    /// All episodes belonging to a session, oldest first
    pub fn episodes_for_session(&self, session_id: &str) -> Result<Vec<Episode>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader
            .prepare("SELECT * FROM episodes WHERE session_id = ?1 ORDER BY timestamp ASC")
            .map_err(StoreError::Database)?;
        let rows = stmt
            .query_map(params![session_id], Self::row_to_episode)
            .map_err(StoreError::Database)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Most recent episodes, newest first
    pub fn recent_episodes(&self, limit: usize) -> Result<Vec<Episode>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader
            .prepare("SELECT * FROM episodes ORDER BY timestamp DESC LIMIT ?1")
            .map_err(StoreError::Database)?;
        let rows = stmt
            .query_map(params![limit as i64], Self::row_to_episode)
            .map_err(StoreError::Database)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Bump access bookkeeping on an episode
    pub fn touch_episode(&self, id: &str) -> Result<()> {
        self.guard_write()?;
        let writer = self.lock_writer()?;
        writer
            .execute(
                "UPDATE episodes SET access_count = access_count + 1, last_access = ?2 WHERE id = ?1",
                params![id, ids::to_rfc3339(ids::now())],
            )
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    /// Update salience/utility scores (the only mutable episode content)
    pub fn update_episode_scores(&self, id: &str, salience: f64, utility: f64) -> Result<()> {
        self.guard_write()?;
        let writer = self.lock_writer()?;
        let changed = writer
            .execute(
                "UPDATE episodes SET emotional_salience = ?2, utility_score = ?3 WHERE id = ?1",
                params![id, salience.clamp(0.0, 1.0), utility.clamp(0.0, 1.0)],
            )
            .map_err(|e| self.classify(e))?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Change the episode's TTL bucket (used by sleep demotions)
    pub fn set_episode_ttl(&self, id: &str, ttl: EpisodeTtl) -> Result<()> {
        self.guard_write()?;
        let writer = self.lock_writer()?;
        writer
            .execute(
                "UPDATE episodes SET ttl = ?2 WHERE id = ?1",
                params![id, ttl.as_str()],
            )
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    /// Hard-delete an episode. Evidence lists referring to it become
    /// dangling weak references, which readers must tolerate.
    pub fn delete_episode(&self, id: &str) -> Result<bool> {
        self.guard_write()?;
        let writer = self.lock_writer()?;
        let deleted = writer
            .execute("DELETE FROM episodes WHERE id = ?1", params![id])
            .map_err(|e| self.classify(e))?;
        Ok(deleted > 0)
    }

    // ========================================================================
    // FACTS
    // ========================================================================

    pub(super) fn row_to_fact(row: &Row<'_>) -> rusqlite::Result<Fact> {
        let evidence: String = row.get("evidence")?;
        let contradictions: String = row.get("contradictions")?;
        Ok(Fact {
            id: row.get("id")?,
            subject: row.get("subject")?,
            predicate: row.get("predicate")?,
            object: row.get("object")?,
            confidence: row.get("confidence")?,
            evidence: Self::decode_list(&evidence),
            first_seen: row.get("first_seen")?,
            last_confirmed: row.get("last_confirmed")?,
            contradictions: Self::decode_list(&contradictions),
            user_affirmed: row.get("user_affirmed")?,
            is_active: row.get("is_active")?,
            retracted_reason: row.get("retracted_reason")?,
            access_count: row.get("access_count")?,
            created_at: row.get("created_at")?,
        })
    }

    /// Insert a fact; records a `create` change and fires the write hook
    pub fn insert_fact(&self, fact: &Fact) -> Result<()> {
        self.guard_write()?;
        {
            let writer = self.lock_writer()?;
            writer
                .execute(
                    "INSERT INTO facts (
                        id, subject, predicate, object, confidence, evidence,
                        first_seen, last_confirmed, contradictions, user_affirmed,
                        is_active, retracted_reason, access_count, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    params![
                        fact.id,
                        fact.subject,
                        fact.predicate,
                        fact.object,
                        fact.confidence,
                        Self::encode_list(&fact.evidence),
                        ids::to_rfc3339(fact.first_seen),
                        ids::to_rfc3339(fact.last_confirmed),
                        Self::encode_list(&fact.contradictions),
                        fact.user_affirmed,
                        fact.is_active,
                        fact.retracted_reason,
                        fact.access_count,
                        ids::to_rfc3339(fact.created_at),
                    ],
                )
                .map_err(|e| self.classify(e))?;
        }

        let change = MemoryChange::new(ChangeType::Create, TargetType::Fact, &fact.id, "fact created")
            .with_values(None, Some(serde_json::to_string(fact)?));
        self.record_change(&change)?;
        self.notify_fact_write();
        Ok(())
    }

    /// Get a fact by id (retracted facts stay readable)
    pub fn get_fact(&self, id: &str) -> Result<Option<Fact>> {
        let reader = self.lock_reader()?;
        reader
            .query_row("SELECT * FROM facts WHERE id = ?1", params![id], Self::row_to_fact)
            .optional()
            .map_err(StoreError::Database)
    }

    /// Query facts by attribute filter, highest confidence first
    pub fn query_facts(&self, filter: &FactFilter) -> Result<Vec<Fact>> {
        let mut sql = String::from("SELECT * FROM facts WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(subject) = &filter.subject {
            args.push(Box::new(subject.to_lowercase()));
            sql.push_str(&format!(" AND LOWER(subject) = ?{}", args.len()));
        }
        if let Some(predicate) = &filter.predicate {
            args.push(Box::new(predicate.clone()));
            sql.push_str(&format!(" AND predicate = ?{}", args.len()));
        }
        if let Some(object) = &filter.object {
            args.push(Box::new(object.to_lowercase()));
            sql.push_str(&format!(" AND LOWER(object) = ?{}", args.len()));
        }
        if filter.active_only {
            sql.push_str(" AND is_active = 1");
        }
        sql.push_str(" ORDER BY confidence DESC, created_at ASC");

        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare(&sql).map_err(StoreError::Database)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt
            .query_map(params_ref.as_slice(), Self::row_to_fact)
            .map_err(StoreError::Database)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// The current belief set
    pub fn active_facts(&self) -> Result<Vec<Fact>> {
        self.query_facts(&FactFilter {
            active_only: true,
            ..Default::default()
        })
    }

    /// Active facts about a subject, optionally narrowed to a predicate
    pub fn facts_about(&self, subject: &str, predicate: Option<&str>) -> Result<Vec<Fact>> {
        self.query_facts(&FactFilter {
            subject: Some(subject.to_string()),
            predicate: predicate.map(str::to_string),
            active_only: true,
            ..Default::default()
        })
    }

    /// Re-confirm an existing fact: bump `last_confirmed`, merge new
    /// evidence, lift confidence to the max of old and new. Records a
    /// `strengthen` change when the confidence moved.
    pub fn confirm_fact(&self, id: &str, evidence: &[String], confidence: f64) -> Result<()> {
        self.guard_write()?;
        let existing = self
            .get_fact(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut merged = existing.evidence.clone();
        for e in evidence {
            if !merged.contains(e) {
                merged.push(e.clone());
            }
        }
        let new_confidence = existing.confidence.max(confidence.clamp(0.0, 1.0));

        {
            let writer = self.lock_writer()?;
            writer
                .execute(
                    "UPDATE facts SET last_confirmed = ?2, evidence = ?3, confidence = ?4 WHERE id = ?1",
                    params![
                        id,
                        ids::to_rfc3339(ids::now()),
                        Self::encode_list(&merged),
                        new_confidence,
                    ],
                )
                .map_err(|e| self.classify(e))?;
        }

        if new_confidence > existing.confidence {
            let change = MemoryChange::new(
                ChangeType::Strengthen,
                TargetType::Fact,
                id,
                "re-confirmed by new evidence",
            )
            .with_values(
                Some(format!("{:.3}", existing.confidence)),
                Some(format!("{new_confidence:.3}")),
            );
            self.record_change(&change)?;
        }
        self.notify_fact_write();
        Ok(())
    }

    /// Update a fact's confidence, recording `strengthen` or `weaken`
    pub fn update_fact_confidence(
        &self,
        id: &str,
        new_confidence: f64,
        reason: &str,
        run_id: Option<&str>,
    ) -> Result<()> {
        self.guard_write()?;
        let existing = self
            .get_fact(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let new_confidence = new_confidence.clamp(0.0, 1.0);

        {
            let writer = self.lock_writer()?;
            writer
                .execute(
                    "UPDATE facts SET confidence = ?2 WHERE id = ?1",
                    params![id, new_confidence],
                )
                .map_err(|e| self.classify(e))?;
        }

        let change_type = if new_confidence >= existing.confidence {
            ChangeType::Strengthen
        } else {
            ChangeType::Weaken
        };
        let change = MemoryChange::new(change_type, TargetType::Fact, id, reason)
            .with_values(
                Some(format!("{:.3}", existing.confidence)),
                Some(format!("{new_confidence:.3}")),
            )
            .with_run(run_id);
        self.record_change(&change)?;
        self.notify_fact_write();
        Ok(())
    }

    /// Replace a fact's object (and confidence), recording a `modify`
    /// change whose values feed point-in-time reconstruction.
    pub fn modify_fact(
        &self,
        id: &str,
        new_object: &str,
        new_confidence: f64,
        reason: &str,
        run_id: Option<&str>,
    ) -> Result<()> {
        self.guard_write()?;
        let existing = self
            .get_fact(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let new_confidence = new_confidence.clamp(0.0, 1.0);

        {
            let writer = self.lock_writer()?;
            writer
                .execute(
                    "UPDATE facts SET object = ?2, confidence = ?3, last_confirmed = ?4 WHERE id = ?1",
                    params![id, new_object, new_confidence, ids::to_rfc3339(ids::now())],
                )
                .map_err(|e| self.classify(e))?;
        }

        let change = MemoryChange::new(ChangeType::Modify, TargetType::Fact, id, reason)
            .with_values(
                Some(serde_json::json!({"object": existing.object, "confidence": existing.confidence}).to_string()),
                Some(serde_json::json!({"object": new_object, "confidence": new_confidence}).to_string()),
            )
            .with_run(run_id);
        self.record_change(&change)?;
        self.notify_fact_write();
        Ok(())
    }

    /// Soft-retract a fact: it stays readable with `is_active = false`
    /// and the reason attached, and a `retract` change is recorded.
    pub fn retract_fact(&self, id: &str, reason: &str, run_id: Option<&str>) -> Result<()> {
        self.guard_write()?;
        let existing = self
            .get_fact(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        {
            let writer = self.lock_writer()?;
            writer
                .execute(
                    "UPDATE facts SET is_active = 0, retracted_reason = ?2 WHERE id = ?1",
                    params![id, reason],
                )
                .map_err(|e| self.classify(e))?;
        }

        let change = MemoryChange::new(ChangeType::Retract, TargetType::Fact, id, reason)
            .with_values(Some(serde_json::to_string(&existing)?), None)
            .with_run(run_id);
        self.record_change(&change)?;
        self.notify_fact_write();
        tracing::debug!(fact = %id, reason, "fact retracted");
        Ok(())
    }

    /// Record a mutual contradiction between two facts
    pub fn add_contradiction(&self, id: &str, other_id: &str) -> Result<()> {
        self.guard_write()?;
        for (a, b) in [(id, other_id), (other_id, id)] {
            let Some(fact) = self.get_fact(a)? else { continue };
            let mut list = fact.contradictions.clone();
            if !list.contains(&b.to_string()) {
                list.push(b.to_string());
                let writer = self.lock_writer()?;
                writer
                    .execute(
                        "UPDATE facts SET contradictions = ?2 WHERE id = ?1",
                        params![a, Self::encode_list(&list)],
                    )
                    .map_err(|e| self.classify(e))?;
            }
        }
        Ok(())
    }

    /// Bump access bookkeeping on a fact
    pub fn touch_fact(&self, id: &str) -> Result<()> {
        self.guard_write()?;
        let writer = self.lock_writer()?;
        writer
            .execute(
                "UPDATE facts SET access_count = access_count + 1 WHERE id = ?1",
                params![id],
            )
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    // ========================================================================
    // CAUSAL LINKS
    // ========================================================================

    fn row_to_causal(row: &Row<'_>) -> rusqlite::Result<CausalLink> {
        let cause_kind: String = row.get("cause_kind")?;
        let effect_kind: String = row.get("effect_kind")?;
        let strength: String = row.get("causal_strength")?;
        let evidence: String = row.get("evidence")?;
        Ok(CausalLink {
            id: row.get("id")?,
            cause_kind: CauseKind::parse_name(&cause_kind),
            cause_id: row.get("cause_id")?,
            cause_description: row.get("cause_description")?,
            effect_kind: CauseKind::parse_name(&effect_kind),
            effect_id: row.get("effect_id")?,
            effect_description: row.get("effect_description")?,
            mechanism: row.get("mechanism")?,
            confidence: row.get("confidence")?,
            evidence: Self::decode_list(&evidence),
            temporal_delay: row.get("temporal_delay")?,
            causal_strength: CausalStrength::parse_name(&strength),
            created_at: row.get("created_at")?,
        })
    }

    /// Insert a causal link
    pub fn insert_causal_link(&self, link: &CausalLink) -> Result<()> {
        self.guard_write()?;
        let writer = self.lock_writer()?;
        writer
            .execute(
                "INSERT INTO causal_links (
                    id, cause_kind, cause_id, cause_description,
                    effect_kind, effect_id, effect_description, mechanism,
                    confidence, evidence, temporal_delay, causal_strength, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    link.id,
                    link.cause_kind.as_str(),
                    link.cause_id,
                    link.cause_description,
                    link.effect_kind.as_str(),
                    link.effect_id,
                    link.effect_description,
                    link.mechanism,
                    link.confidence,
                    Self::encode_list(&link.evidence),
                    link.temporal_delay,
                    link.causal_strength.as_str(),
                    ids::to_rfc3339(link.created_at),
                ],
            )
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    /// Get a causal link by id
    pub fn get_causal_link(&self, id: &str) -> Result<Option<CausalLink>> {
        let reader = self.lock_reader()?;
        reader
            .query_row(
                "SELECT * FROM causal_links WHERE id = ?1",
                params![id],
                Self::row_to_causal,
            )
            .optional()
            .map_err(StoreError::Database)
    }

    /// All causal links, highest confidence first
    pub fn all_causal_links(&self) -> Result<Vec<CausalLink>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader
            .prepare("SELECT * FROM causal_links ORDER BY confidence DESC")
            .map_err(StoreError::Database)?;
        let rows = stmt
            .query_map([], Self::row_to_causal)
            .map_err(StoreError::Database)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Links whose effect description contains the given text
    /// (case-insensitive substring match), highest confidence first
    pub fn causal_links_for_effect(&self, effect_text: &str) -> Result<Vec<CausalLink>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader
            .prepare(
                "SELECT * FROM causal_links
                 WHERE LOWER(effect_description) LIKE ?1
                 ORDER BY confidence DESC",
            )
            .map_err(StoreError::Database)?;
        let needle = format!("%{}%", effect_text.to_lowercase());
        let rows = stmt
            .query_map(params![needle], Self::row_to_causal)
            .map_err(StoreError::Database)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // ========================================================================
    // PROCEDURES
    // ========================================================================

    fn row_to_procedure(row: &Row<'_>) -> rusqlite::Result<Procedure> {
        let examples: String = row.get("examples")?;
        let tags: String = row.get("tags")?;
        Ok(Procedure {
            id: row.get("id")?,
            trigger: row.get("trigger_text")?,
            action: row.get("action_text")?,
            expected_outcome: row.get("expected_outcome")?,
            examples: Self::decode_list(&examples),
            times_used: row.get("times_used")?,
            times_succeeded: row.get("times_succeeded")?,
            tags: Self::decode_list(&tags),
            created_at: row.get("created_at")?,
        })
    }

    /// Insert a procedure
    pub fn insert_procedure(&self, proc: &Procedure) -> Result<()> {
        self.guard_write()?;
        let writer = self.lock_writer()?;
        writer
            .execute(
                "INSERT INTO procedures (
                    id, trigger_text, action_text, expected_outcome, examples,
                    times_used, times_succeeded, tags, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    proc.id,
                    proc.trigger,
                    proc.action,
                    proc.expected_outcome,
                    Self::encode_list(&proc.examples),
                    proc.times_used,
                    proc.times_succeeded,
                    Self::encode_list(&proc.tags),
                    ids::to_rfc3339(proc.created_at),
                ],
            )
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    /// All procedures
    pub fn all_procedures(&self) -> Result<Vec<Procedure>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader
            .prepare("SELECT * FROM procedures ORDER BY created_at ASC")
            .map_err(StoreError::Database)?;
        let rows = stmt
            .query_map([], Self::row_to_procedure)
            .map_err(StoreError::Database)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Find a procedure by lowercase trigger + action equality
    pub fn find_procedure(&self, trigger: &str, action: &str) -> Result<Option<Procedure>> {
        let reader = self.lock_reader()?;
        reader
            .query_row(
                "SELECT * FROM procedures
                 WHERE LOWER(trigger_text) = ?1 AND LOWER(action_text) = ?2",
                params![trigger.trim().to_lowercase(), action.trim().to_lowercase()],
                Self::row_to_procedure,
            )
            .optional()
            .map_err(StoreError::Database)
    }

    /// Record one application of a procedure
    pub fn record_procedure_use(&self, id: &str, succeeded: bool) -> Result<()> {
        self.guard_write()?;
        let writer = self.lock_writer()?;
        writer
            .execute(
                "UPDATE procedures SET times_used = times_used + 1,
                        times_succeeded = times_succeeded + ?2
                 WHERE id = ?1",
                params![id, i64::from(succeeded)],
            )
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    // ========================================================================
    // CHANGE LOG
    // ========================================================================

    pub(super) fn row_to_change(row: &Row<'_>) -> rusqlite::Result<MemoryChange> {
        let change_type: String = row.get("change_type")?;
        let target_type: String = row.get("target_type")?;
        Ok(MemoryChange {
            id: row.get("id")?,
            change_type: ChangeType::parse_name(&change_type).unwrap_or(ChangeType::Modify),
            target_type: TargetType::parse_name(&target_type).unwrap_or(TargetType::Fact),
            target_id: row.get("target_id")?,
            previous_value: row.get("previous_value")?,
            new_value: row.get("new_value")?,
            reason: row.get("reason")?,
            trigger_episode_id: row.get("trigger_episode_id")?,
            consolidation_run_id: row.get("consolidation_run_id")?,
            created_at: row.get("created_at")?,
        })
    }

    /// Append a change record. Change rows are never mutated.
    pub fn record_change(&self, change: &MemoryChange) -> Result<()> {
        self.guard_write()?;
        let writer = self.lock_writer()?;
        writer
            .execute(
                "INSERT INTO memory_changes (
                    id, change_type, target_type, target_id, previous_value,
                    new_value, reason, trigger_episode_id, consolidation_run_id, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    change.id,
                    change.change_type.as_str(),
                    change.target_type.as_str(),
                    change.target_id,
                    change.previous_value,
                    change.new_value,
                    change.reason,
                    change.trigger_episode_id,
                    change.consolidation_run_id,
                    ids::to_rfc3339(change.created_at),
                ],
            )
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    /// All changes recorded for a target, oldest first
    pub fn changes_for(&self, target_id: &str) -> Result<Vec<MemoryChange>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader
            .prepare("SELECT * FROM memory_changes WHERE target_id = ?1 ORDER BY created_at ASC")
            .map_err(StoreError::Database)?;
        let rows = stmt
            .query_map(params![target_id], Self::row_to_change)
            .map_err(StoreError::Database)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // ========================================================================
    // CONSOLIDATION RUNS
    // ========================================================================

    fn row_to_run(row: &Row<'_>) -> rusqlite::Result<ConsolidationRun> {
        let status: String = row.get("status")?;
        Ok(ConsolidationRun {
            id: row.get("id")?,
            processed_from: row.get("processed_from")?,
            processed_to: row.get("processed_to")?,
            sessions: row.get("sessions")?,
            episodes: row.get("episodes")?,
            facts: row.get("facts")?,
            causal_links: row.get("causal_links")?,
            procedures: row.get("procedures")?,
            contradictions_resolved: row.get("contradictions_resolved")?,
            memories_pruned: row.get("memories_pruned")?,
            duration_ms: row.get("duration_ms")?,
            status: RunStatus::parse_name(&status),
            error: row.get("error")?,
            started_at: row.get("started_at")?,
        })
    }

    /// Open a run record (status `running`)
    pub fn open_run(&self, run: &ConsolidationRun) -> Result<()> {
        self.guard_write()?;
        let writer = self.lock_writer()?;
        writer
            .execute(
                "INSERT INTO consolidation_runs (
                    id, processed_from, processed_to, sessions, episodes, facts,
                    causal_links, procedures, contradictions_resolved,
                    memories_pruned, duration_ms, status, error, started_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    run.id,
                    ids::to_rfc3339(run.processed_from),
                    ids::to_rfc3339(run.processed_to),
                    run.sessions,
                    run.episodes,
                    run.facts,
                    run.causal_links,
                    run.procedures,
                    run.contradictions_resolved,
                    run.memories_pruned,
                    run.duration_ms,
                    run.status.as_str(),
                    run.error,
                    ids::to_rfc3339(run.started_at),
                ],
            )
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    /// Write final counters and status to a run record
    pub fn finalize_run(&self, run: &ConsolidationRun) -> Result<()> {
        self.guard_write()?;
        let writer = self.lock_writer()?;
        writer
            .execute(
                "UPDATE consolidation_runs SET
                    sessions = ?2, episodes = ?3, facts = ?4, causal_links = ?5,
                    procedures = ?6, contradictions_resolved = ?7,
                    memories_pruned = ?8, duration_ms = ?9, status = ?10, error = ?11
                 WHERE id = ?1",
                params![
                    run.id,
                    run.sessions,
                    run.episodes,
                    run.facts,
                    run.causal_links,
                    run.procedures,
                    run.contradictions_resolved,
                    run.memories_pruned,
                    run.duration_ms,
                    run.status.as_str(),
                    run.error,
                ],
            )
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    /// Get a run record by id
    pub fn get_run(&self, id: &str) -> Result<Option<ConsolidationRun>> {
        let reader = self.lock_reader()?;
        reader
            .query_row(
                "SELECT * FROM consolidation_runs WHERE id = ?1",
                params![id],
                Self::row_to_run,
            )
            .optional()
            .map_err(StoreError::Database)
    }

    /// Most recent completed run, if any; its `processed_to` seeds the
    /// next run's window.
    pub fn last_completed_run(&self) -> Result<Option<ConsolidationRun>> {
        let reader = self.lock_reader()?;
        reader
            .query_row(
                "SELECT * FROM consolidation_runs WHERE status = 'completed'
                 ORDER BY started_at DESC LIMIT 1",
                [],
                Self::row_to_run,
            )
            .optional()
            .map_err(StoreError::Database)
    }

    // ========================================================================
    // PER-USER ENTITIES
    // ========================================================================

    /// Insert or replace the profile for a user
    pub fn upsert_profile(&self, profile: &UserProfile) -> Result<()> {
        self.guard_write()?;
        let writer = self.lock_writer()?;
        writer
            .execute(
                "INSERT INTO user_profiles (id, user, stable_traits, transient_traits, summary, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user) DO UPDATE SET
                    stable_traits = excluded.stable_traits,
                    transient_traits = excluded.transient_traits,
                    summary = excluded.summary,
                    updated_at = excluded.updated_at",
                params![
                    profile.id,
                    profile.user,
                    Self::encode_pairs(&profile.stable_traits),
                    Self::encode_pairs(&profile.transient_traits),
                    profile.summary,
                    ids::to_rfc3339(profile.updated_at),
                ],
            )
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    /// Get the profile for a user
    pub fn get_profile(&self, user: &str) -> Result<Option<UserProfile>> {
        let reader = self.lock_reader()?;
        reader
            .query_row(
                "SELECT * FROM user_profiles WHERE user = ?1",
                params![user],
                |row| {
                    let stable: String = row.get("stable_traits")?;
                    let transient: String = row.get("transient_traits")?;
                    Ok(UserProfile {
                        id: row.get("id")?,
                        user: row.get("user")?,
                        stable_traits: Self::decode_pairs(&stable),
                        transient_traits: Self::decode_pairs(&transient),
                        summary: row.get("summary")?,
                        updated_at: row.get("updated_at")?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::Database)
    }

    /// Insert a preference
    pub fn insert_preference(&self, pref: &Preference) -> Result<()> {
        self.guard_write()?;
        let writer = self.lock_writer()?;
        writer
            .execute(
                "INSERT INTO preferences (id, category, preference, sentiment, confidence, source_fact_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    pref.id,
                    pref.category,
                    pref.preference,
                    pref.sentiment.as_str(),
                    pref.confidence,
                    pref.source_fact_id,
                    ids::to_rfc3339(pref.created_at),
                ],
            )
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    /// All preferences
    pub fn preferences(&self) -> Result<Vec<Preference>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader
            .prepare("SELECT * FROM preferences ORDER BY created_at ASC")
            .map_err(StoreError::Database)?;
        let rows = stmt
            .query_map([], |row| {
                let sentiment: String = row.get("sentiment")?;
                Ok(Preference {
                    id: row.get("id")?,
                    category: row.get("category")?,
                    preference: row.get("preference")?,
                    sentiment: Sentiment::parse_name(&sentiment),
                    confidence: row.get("confidence")?,
                    source_fact_id: row.get("source_fact_id")?,
                    created_at: row.get("created_at")?,
                })
            })
            .map_err(StoreError::Database)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Insert a relationship
    pub fn insert_relationship(&self, rel: &Relationship) -> Result<()> {
        self.guard_write()?;
        let writer = self.lock_writer()?;
        writer
            .execute(
                "INSERT INTO relationships (id, person, relation_type, closeness, fact_ids, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    rel.id,
                    rel.person,
                    rel.relation_type,
                    rel.closeness,
                    Self::encode_list(&rel.fact_ids),
                    ids::to_rfc3339(rel.created_at),
                ],
            )
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    /// All relationships
    pub fn relationships(&self) -> Result<Vec<Relationship>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader
            .prepare("SELECT * FROM relationships ORDER BY created_at ASC")
            .map_err(StoreError::Database)?;
        let rows = stmt
            .query_map([], |row| {
                let fact_ids: String = row.get("fact_ids")?;
                Ok(Relationship {
                    id: row.get("id")?,
                    person: row.get("person")?,
                    relation_type: row.get("relation_type")?,
                    closeness: row.get("closeness")?,
                    fact_ids: Self::decode_list(&fact_ids),
                    created_at: row.get("created_at")?,
                })
            })
            .map_err(StoreError::Database)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Insert a core memory
    pub fn insert_core_memory(&self, cm: &CoreMemory) -> Result<()> {
        self.guard_write()?;
        let writer = self.lock_writer()?;
        writer
            .execute(
                "INSERT INTO core_memories (id, content, category, importance, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    cm.id,
                    cm.content,
                    cm.category,
                    cm.importance,
                    ids::to_rfc3339(cm.created_at),
                ],
            )
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    /// All core memories
    pub fn core_memories(&self) -> Result<Vec<CoreMemory>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader
            .prepare("SELECT * FROM core_memories ORDER BY importance DESC")
            .map_err(StoreError::Database)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CoreMemory {
                    id: row.get("id")?,
                    content: row.get("content")?,
                    category: row.get("category")?,
                    importance: row.get("importance")?,
                    created_at: row.get("created_at")?,
                })
            })
            .map_err(StoreError::Database)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn row_to_foresight(row: &Row<'_>) -> rusqlite::Result<Foresight> {
        Ok(Foresight {
            id: row.get("id")?,
            description: row.get("description")?,
            start_time: row.get("start_time")?,
            end_time: row.get("end_time")?,
            duration_days: row.get("duration_days")?,
            is_active: row.get("is_active")?,
            confidence: row.get("confidence")?,
            source_episode_id: row.get("source_episode_id")?,
            created_at: row.get("created_at")?,
        })
    }

    /// Insert a foresight
    pub fn insert_foresight(&self, fs: &Foresight) -> Result<()> {
        self.guard_write()?;
        let writer = self.lock_writer()?;
        writer
            .execute(
                "INSERT INTO foresights (
                    id, description, start_time, end_time, duration_days,
                    is_active, confidence, source_episode_id, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    fs.id,
                    fs.description,
                    ids::to_rfc3339(fs.start_time),
                    fs.end_time.map(ids::to_rfc3339),
                    fs.duration_days,
                    fs.is_active,
                    fs.confidence,
                    fs.source_episode_id,
                    ids::to_rfc3339(fs.created_at),
                ],
            )
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    /// Foresights, optionally only live ones
    pub fn foresights(&self, active_only: bool) -> Result<Vec<Foresight>> {
        let reader = self.lock_reader()?;
        let sql = if active_only {
            "SELECT * FROM foresights WHERE is_active = 1 ORDER BY start_time ASC"
        } else {
            "SELECT * FROM foresights ORDER BY start_time ASC"
        };
        let mut stmt = reader.prepare(sql).map_err(StoreError::Database)?;
        let rows = stmt
            .query_map([], Self::row_to_foresight)
            .map_err(StoreError::Database)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Mark a foresight as no longer live
    pub fn deactivate_foresight(&self, id: &str) -> Result<()> {
        self.guard_write()?;
        let writer = self.lock_writer()?;
        writer
            .execute(
                "UPDATE foresights SET is_active = 0 WHERE id = ?1",
                params![id],
            )
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    // ========================================================================
    // STATS
    // ========================================================================

    fn count(&self, sql: &str) -> Result<i64> {
        let reader = self.lock_reader()?;
        reader
            .query_row(sql, [], |row| row.get(0))
            .map_err(StoreError::Database)
    }

    /// Store-wide statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let last_run = self.last_completed_run()?;
        Ok(StoreStats {
            episodes: self.count("SELECT COUNT(*) FROM episodes")?,
            active_facts: self.count("SELECT COUNT(*) FROM facts WHERE is_active = 1")?,
            total_facts: self.count("SELECT COUNT(*) FROM facts")?,
            causal_links: self.count("SELECT COUNT(*) FROM causal_links")?,
            procedures: self.count("SELECT COUNT(*) FROM procedures")?,
            changes: self.count("SELECT COUNT(*) FROM memory_changes")?,
            foresights: self.count("SELECT COUNT(*) FROM foresights")?,
            preferences: self.count("SELECT COUNT(*) FROM preferences")?,
            db_size_bytes: std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0),
            last_run_status: last_run.as_ref().map(|r| r.status.as_str().to_string()),
            last_run_at: last_run.map(|r| r.started_at),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (MemoryStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open_at("test-agent", dir.path().join("test.sqlite")).unwrap();
        (store, dir)
    }

    #[test]
    fn episode_round_trip() {
        let (store, _dir) = test_store();
        let mut ep = Episode::new("s1", "user talked about a new job");
        ep.participants = vec!["user".into(), "assistant".into()];
        ep.keywords = vec!["job".into(), "techcorp".into()];
        store.insert_episode(&ep).unwrap();

        let back = store.get_episode(&ep.id).unwrap().unwrap();
        assert_eq!(back.summary, ep.summary);
        assert_eq!(back.participants, ep.participants);
        assert_eq!(back.ttl, EpisodeTtl::Month);

        store.touch_episode(&ep.id).unwrap();
        let touched = store.get_episode(&ep.id).unwrap().unwrap();
        assert_eq!(touched.access_count, 1);
    }

    #[test]
    fn fact_insert_records_create_change() {
        let (store, _dir) = test_store();
        let fact = Fact::new("user", "works_at", "TechCorp", 0.9);
        store.insert_fact(&fact).unwrap();

        let changes = store.changes_for(&fact.id).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Create);
    }

    #[test]
    fn retraction_preserves_history() {
        let (store, _dir) = test_store();
        let fact = Fact::new("user", "works_at", "Google", 0.9);
        store.insert_fact(&fact).unwrap();
        store
            .retract_fact(&fact.id, "superseded by newer statement", None)
            .unwrap();

        let back = store.get_fact(&fact.id).unwrap().unwrap();
        assert!(!back.is_active);
        assert_eq!(
            back.retracted_reason.as_deref(),
            Some("superseded by newer statement")
        );

        let changes = store.changes_for(&fact.id).unwrap();
        assert!(changes
            .iter()
            .any(|c| c.change_type == ChangeType::Retract));
    }

    #[test]
    fn duplicate_insert_is_recoverable() {
        let (store, _dir) = test_store();
        let fact = Fact::new("user", "likes", "espresso", 0.8);
        store.insert_fact(&fact).unwrap();
        let err = store.insert_fact(&fact).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        // The store keeps working after a duplicate
        assert_eq!(store.active_facts().unwrap().len(), 1);
    }

    #[test]
    fn query_facts_filters_and_ranks() {
        let (store, _dir) = test_store();
        store
            .insert_fact(&Fact::new("user", "likes", "espresso", 0.6))
            .unwrap();
        store
            .insert_fact(&Fact::new("user", "likes", "hiking", 0.9))
            .unwrap();
        store
            .insert_fact(&Fact::new("Melanie", "likes", "painting", 0.8))
            .unwrap();

        let about_user = store.facts_about("user", Some("likes")).unwrap();
        assert_eq!(about_user.len(), 2);
        assert_eq!(about_user[0].object, "hiking"); // higher confidence first

        let filter = FactFilter {
            object: Some("Painting".into()),
            active_only: true,
            ..Default::default()
        };
        let by_object = store.query_facts(&filter).unwrap();
        assert_eq!(by_object.len(), 1);
        assert_eq!(by_object[0].subject, "Melanie");
    }

    #[test]
    fn fact_write_hook_fires_on_writes() {
        let (store, _dir) = test_store();
        let counter = Arc::new(AtomicBool::new(false));
        let flag = counter.clone();
        store.set_fact_write_hook(Arc::new(move || {
            flag.store(true, Ordering::SeqCst);
        }));

        let fact = Fact::new("user", "lives_in", "Seattle", 0.8);
        store.insert_fact(&fact).unwrap();
        assert!(counter.load(Ordering::SeqCst));
    }

    #[test]
    fn procedure_dedupe_lookup_is_case_insensitive() {
        let (store, _dir) = test_store();
        let mut p = Procedure::new("When deploys fail", "Roll back first");
        p.examples = vec!["ep-1".into()];
        store.insert_procedure(&p).unwrap();

        let found = store
            .find_procedure("when deploys FAIL", "roll back first")
            .unwrap();
        assert!(found.is_some());

        store.record_procedure_use(&p.id, true).unwrap();
        store.record_procedure_use(&p.id, false).unwrap();
        let back = store.all_procedures().unwrap().remove(0);
        assert_eq!(back.times_used, 2);
        assert_eq!(back.times_succeeded, 1);
        assert!((back.success_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn run_lifecycle() {
        let (store, _dir) = test_store();
        let mut run = ConsolidationRun::open(ids::now(), ids::now());
        store.open_run(&run).unwrap();
        assert!(store.last_completed_run().unwrap().is_none());

        run.facts = 4;
        run.status = RunStatus::Completed;
        store.finalize_run(&run).unwrap();

        let last = store.last_completed_run().unwrap().unwrap();
        assert_eq!(last.facts, 4);
        assert_eq!(last.status, RunStatus::Completed);
    }

    #[test]
    fn profile_upsert_replaces() {
        let (store, _dir) = test_store();
        let mut profile = UserProfile::new("user");
        profile.stable_traits = vec![("works_at".into(), "TechCorp".into())];
        store.upsert_profile(&profile).unwrap();

        profile.stable_traits = vec![("works_at".into(), "GitHub".into())];
        store.upsert_profile(&profile).unwrap();

        let back = store.get_profile("user").unwrap().unwrap();
        assert_eq!(back.stable_traits[0].1, "GitHub");
    }
}
