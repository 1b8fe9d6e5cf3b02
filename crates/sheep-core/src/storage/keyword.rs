//! Ranked Keyword Retrieval over Facts
//!
//! FTS5 index across (subject, predicate, object), kept in sync by the
//! triggers installed in migration v3. Queries are sanitized before they
//! reach the MATCH operator so user text can never inject FTS syntax.

use super::{MemoryStore, Result, StoreError};
use crate::memory::Fact;

/// Sanitize free text into an FTS5 query: keep alphanumeric tokens,
/// quote each one, and OR them together. Returns `None` when nothing
/// searchable remains.
pub fn sanitize_fts_query(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

impl MemoryStore {
    /// Keyword-ranked fact search (bm25 order). Retracted facts are
    /// excluded; call sites that want history should use the change log.
    pub fn search_facts(&self, query: &str, limit: usize) -> Result<Vec<Fact>> {
        let Some(match_expr) = sanitize_fts_query(query) else {
            return Ok(Vec::new());
        };

        let reader = self.lock_reader()?;
        let mut stmt = reader
            .prepare(
                "SELECT f.* FROM facts f
                 JOIN facts_fts ft ON f.rowid = ft.rowid
                 WHERE facts_fts MATCH ?1 AND f.is_active = 1
                 ORDER BY rank
                 LIMIT ?2",
            )
            .map_err(StoreError::Database)?;
        let rows = stmt
            .query_map(
                rusqlite::params![match_expr, limit as i64],
                Self::row_to_fact,
            )
            .map_err(StoreError::Database)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Fact;
    use tempfile::TempDir;

    fn test_store() -> (MemoryStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open_at("test-agent", dir.path().join("test.sqlite")).unwrap();
        (store, dir)
    }

    #[test]
    fn sanitizer_quotes_and_joins_tokens() {
        assert_eq!(
            sanitize_fts_query("Where does Alex work?").unwrap(),
            "\"where\" OR \"does\" OR \"alex\" OR \"work\""
        );
        assert!(sanitize_fts_query("?!...").is_none());
    }

    #[test]
    fn sanitizer_neutralizes_fts_operators() {
        let q = sanitize_fts_query("NEAR(\"x\") OR *").unwrap();
        assert_eq!(q, "\"near\" OR \"x\" OR \"or\"");
    }

    #[test]
    fn search_finds_facts_by_any_column() {
        let (store, _dir) = test_store();
        store
            .insert_fact(&Fact::new("user", "works_at", "TechCorp", 0.9))
            .unwrap();
        store
            .insert_fact(&Fact::new("Melanie", "likes", "painting", 0.8))
            .unwrap();

        let by_object = store.search_facts("techcorp", 10).unwrap();
        assert_eq!(by_object.len(), 1);
        assert_eq!(by_object[0].subject, "user");

        let by_subject = store.search_facts("melanie", 10).unwrap();
        assert_eq!(by_subject.len(), 1);
        assert_eq!(by_subject[0].object, "painting");
    }

    #[test]
    fn retracted_facts_drop_out_of_search() {
        let (store, _dir) = test_store();
        let fact = Fact::new("user", "works_at", "Initech", 0.9);
        store.insert_fact(&fact).unwrap();
        assert_eq!(store.search_facts("initech", 10).unwrap().len(), 1);

        store.retract_fact(&fact.id, "left the company", None).unwrap();
        assert!(store.search_facts("initech", 10).unwrap().is_empty());
    }
}
