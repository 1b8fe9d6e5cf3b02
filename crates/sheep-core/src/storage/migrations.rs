//! Database Migrations
//!
//! Schema migration definitions for the per-agent store. Migrations are
//! linear and idempotent: each one only adds tables or columns, never
//! destroys data, and records itself in `schema_version`.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: episodes, facts, causal links, procedures, change log, runs",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Per-user entities: preferences, relationships, core memories, foresights, profile",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "FTS5 keyword index over facts with porter tokenizer",
        up: MIGRATION_V3_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Core entity tables, change log, run records
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS episodes (
    id TEXT PRIMARY KEY,
    timestamp TEXT NOT NULL,
    summary TEXT NOT NULL,
    participants TEXT NOT NULL DEFAULT '[]',
    topic TEXT NOT NULL DEFAULT '',
    keywords TEXT NOT NULL DEFAULT '[]',
    emotional_salience REAL NOT NULL DEFAULT 0.0,
    utility_score REAL NOT NULL DEFAULT 0.5,
    session_id TEXT NOT NULL,
    message_ids TEXT NOT NULL DEFAULT '[]',
    ttl TEXT NOT NULL DEFAULT '30d',
    access_count INTEGER NOT NULL DEFAULT 0,
    last_access TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_episodes_session ON episodes(session_id);
CREATE INDEX IF NOT EXISTS idx_episodes_timestamp ON episodes(timestamp);
CREATE INDEX IF NOT EXISTS idx_episodes_utility ON episodes(utility_score);

CREATE TABLE IF NOT EXISTS facts (
    id TEXT PRIMARY KEY,
    subject TEXT NOT NULL,
    predicate TEXT NOT NULL,
    object TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.5,
    evidence TEXT NOT NULL DEFAULT '[]',
    first_seen TEXT NOT NULL,
    last_confirmed TEXT NOT NULL,
    contradictions TEXT NOT NULL DEFAULT '[]',
    user_affirmed INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    retracted_reason TEXT,
    access_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_facts_subject ON facts(subject);
CREATE INDEX IF NOT EXISTS idx_facts_predicate ON facts(predicate);
CREATE INDEX IF NOT EXISTS idx_facts_subject_predicate ON facts(subject, predicate);
CREATE INDEX IF NOT EXISTS idx_facts_active ON facts(is_active);
CREATE INDEX IF NOT EXISTS idx_facts_created ON facts(created_at);

CREATE TABLE IF NOT EXISTS causal_links (
    id TEXT PRIMARY KEY,
    cause_kind TEXT NOT NULL DEFAULT 'episode',
    cause_id TEXT NOT NULL DEFAULT '',
    cause_description TEXT NOT NULL,
    effect_kind TEXT NOT NULL DEFAULT 'episode',
    effect_id TEXT NOT NULL DEFAULT '',
    effect_description TEXT NOT NULL,
    mechanism TEXT NOT NULL DEFAULT '',
    confidence REAL NOT NULL DEFAULT 0.5,
    evidence TEXT NOT NULL DEFAULT '[]',
    temporal_delay TEXT,
    causal_strength TEXT NOT NULL DEFAULT 'contributing',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_causal_confidence ON causal_links(confidence);
CREATE INDEX IF NOT EXISTS idx_causal_effect ON causal_links(effect_description);

-- "trigger" is an SQL keyword; the columns carry a _text suffix
CREATE TABLE IF NOT EXISTS procedures (
    id TEXT PRIMARY KEY,
    trigger_text TEXT NOT NULL,
    action_text TEXT NOT NULL,
    expected_outcome TEXT,
    examples TEXT NOT NULL DEFAULT '[]',
    times_used INTEGER NOT NULL DEFAULT 0,
    times_succeeded INTEGER NOT NULL DEFAULT 0,
    tags TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_procedures_trigger ON procedures(trigger_text);

-- Append-only differential log; rows are never updated or deleted
CREATE TABLE IF NOT EXISTS memory_changes (
    id TEXT PRIMARY KEY,
    change_type TEXT NOT NULL,
    target_type TEXT NOT NULL,
    target_id TEXT NOT NULL,
    previous_value TEXT,
    new_value TEXT,
    reason TEXT NOT NULL DEFAULT '',
    trigger_episode_id TEXT,
    consolidation_run_id TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_changes_target ON memory_changes(target_id);
CREATE INDEX IF NOT EXISTS idx_changes_created ON memory_changes(created_at);

CREATE TABLE IF NOT EXISTS consolidation_runs (
    id TEXT PRIMARY KEY,
    processed_from TEXT NOT NULL,
    processed_to TEXT NOT NULL,
    sessions INTEGER NOT NULL DEFAULT 0,
    episodes INTEGER NOT NULL DEFAULT 0,
    facts INTEGER NOT NULL DEFAULT 0,
    causal_links INTEGER NOT NULL DEFAULT 0,
    procedures INTEGER NOT NULL DEFAULT 0,
    contradictions_resolved INTEGER NOT NULL DEFAULT 0,
    memories_pruned INTEGER NOT NULL DEFAULT 0,
    duration_ms INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'running',
    error TEXT,
    started_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_runs_status ON consolidation_runs(status);
CREATE INDEX IF NOT EXISTS idx_runs_started ON consolidation_runs(started_at);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: Per-user secondary entities
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS preferences (
    id TEXT PRIMARY KEY,
    category TEXT NOT NULL DEFAULT 'general',
    preference TEXT NOT NULL,
    sentiment TEXT NOT NULL DEFAULT 'positive',
    confidence REAL NOT NULL DEFAULT 0.5,
    source_fact_id TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS relationships (
    id TEXT PRIMARY KEY,
    person TEXT NOT NULL,
    relation_type TEXT NOT NULL,
    closeness REAL NOT NULL DEFAULT 0.5,
    fact_ids TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS core_memories (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'identity',
    importance REAL NOT NULL DEFAULT 0.5,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS foresights (
    id TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT,
    duration_days INTEGER,
    is_active INTEGER NOT NULL DEFAULT 1,
    confidence REAL NOT NULL DEFAULT 0.6,
    source_episode_id TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_foresights_active ON foresights(is_active);

CREATE TABLE IF NOT EXISTS user_profiles (
    id TEXT PRIMARY KEY,
    user TEXT NOT NULL UNIQUE,
    stable_traits TEXT NOT NULL DEFAULT '[]',
    transient_traits TEXT NOT NULL DEFAULT '[]',
    summary TEXT NOT NULL DEFAULT '',
    updated_at TEXT NOT NULL
);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// V3: FTS5 keyword index over (subject, predicate, object)
///
/// Maintained automatically by triggers so ranked keyword retrieval never
/// drifts from the facts table.
const MIGRATION_V3_UP: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS facts_fts USING fts5(
    id, subject, predicate, object,
    content='facts',
    content_rowid='rowid',
    tokenize='porter ascii'
);

INSERT INTO facts_fts(facts_fts) VALUES('rebuild');

CREATE TRIGGER IF NOT EXISTS facts_ai AFTER INSERT ON facts BEGIN
    INSERT INTO facts_fts(rowid, id, subject, predicate, object)
    VALUES (NEW.rowid, NEW.id, NEW.subject, NEW.predicate, NEW.object);
END;

CREATE TRIGGER IF NOT EXISTS facts_ad AFTER DELETE ON facts BEGIN
    INSERT INTO facts_fts(facts_fts, rowid, id, subject, predicate, object)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.subject, OLD.predicate, OLD.object);
END;

CREATE TRIGGER IF NOT EXISTS facts_au AFTER UPDATE ON facts BEGIN
    INSERT INTO facts_fts(facts_fts, rowid, id, subject, predicate, object)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.subject, OLD.predicate, OLD.object);
    INSERT INTO facts_fts(rowid, id, subject, predicate, object)
    VALUES (NEW.rowid, NEW.id, NEW.subject, NEW.predicate, NEW.object);
END;

UPDATE schema_version SET version = 3, applied_at = datetime('now');
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );

            // execute_batch handles multi-statement SQL including triggers
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn migrations_apply_cleanly_and_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let applied = apply_migrations(&conn).unwrap();
        assert_eq!(applied as usize, MIGRATIONS.len());
        assert_eq!(
            get_current_version(&conn).unwrap(),
            MIGRATIONS.last().unwrap().version
        );

        // Second pass is a no-op
        let applied = apply_migrations(&conn).unwrap();
        assert_eq!(applied, 0);
    }

    #[test]
    fn versions_are_strictly_increasing() {
        let mut prev = 0;
        for m in MIGRATIONS {
            assert!(m.version > prev);
            prev = m.version;
        }
    }

    #[test]
    fn fts_triggers_track_fact_rows() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO facts (id, subject, predicate, object, first_seen, last_confirmed, created_at)
             VALUES ('fact-1', 'user', 'works_at', 'TechCorp', datetime('now'), datetime('now'), datetime('now'))",
            [],
        )
        .unwrap();

        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM facts_fts WHERE facts_fts MATCH 'techcorp'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);
    }
}
