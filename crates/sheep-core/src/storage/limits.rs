//! Size Limits & Retention-Ordered Pruning
//!
//! Per-category caps plus a weighted total budget bound storage growth.
//! Pruning removes the least valuable rows first, in a fixed priority
//! order per entity. User-affirmed facts are never pruned here.

use super::{MemoryStore, Result, StoreError};

/// Approximate row weights for the total budget
const EPISODE_WEIGHT: i64 = 3;
const FACT_WEIGHT: i64 = 1;
const CAUSAL_LINK_WEIGHT: i64 = 2;
const PROCEDURE_WEIGHT: i64 = 2;

/// Per-category caps and the weighted total budget
#[derive(Debug, Clone)]
pub struct MemoryLimits {
    pub max_episodes: i64,
    pub max_facts: i64,
    pub max_causal_links: i64,
    pub max_procedures: i64,
    /// Weighted sum cap; see the per-row weights above
    pub max_total_weight: i64,
}

impl Default for MemoryLimits {
    fn default() -> Self {
        Self {
            max_episodes: 2000,
            max_facts: 10_000,
            max_causal_links: 3000,
            max_procedures: 1000,
            max_total_weight: 40_000,
        }
    }
}

/// How many rows each category lost during enforcement
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub episodes_pruned: i64,
    pub facts_pruned: i64,
    pub causal_links_pruned: i64,
    pub procedures_pruned: i64,
}

impl PruneReport {
    pub fn total(&self) -> i64 {
        self.episodes_pruned + self.facts_pruned + self.causal_links_pruned + self.procedures_pruned
    }
}

impl MemoryStore {
    fn scalar(&self, sql: &str) -> Result<i64> {
        let reader = self.lock_reader()?;
        reader
            .query_row(sql, [], |row| row.get(0))
            .map_err(StoreError::Database)
    }

    /// Collect ids to prune with the given ordering, then delete them.
    fn prune_rows(&self, select_sql: &str, delete_sql: &str, count: i64) -> Result<i64> {
        if count <= 0 {
            return Ok(0);
        }
        let ids: Vec<String> = {
            let reader = self.lock_reader()?;
            let mut stmt = reader.prepare(select_sql).map_err(StoreError::Database)?;
            stmt.query_map(rusqlite::params![count], |row| row.get(0))
                .map_err(StoreError::Database)?
                .filter_map(|r| r.ok())
                .collect()
        };

        let mut pruned = 0;
        for id in ids {
            let writer = self.lock_writer()?;
            pruned += writer
                .execute(delete_sql, rusqlite::params![id])
                .map_err(|e| self.classify(e))? as i64;
        }
        Ok(pruned)
    }

    /// Episodes: ascending utility, then ascending timestamp
    fn prune_episodes(&self, count: i64) -> Result<i64> {
        self.prune_rows(
            "SELECT id FROM episodes ORDER BY utility_score ASC, timestamp ASC LIMIT ?1",
            "DELETE FROM episodes WHERE id = ?1",
            count,
        )
    }

    /// Facts: inactive first, then ascending confidence, then ascending
    /// creation time. User-affirmed facts are exempt.
    fn prune_facts(&self, count: i64) -> Result<i64> {
        let pruned = self.prune_rows(
            "SELECT id FROM facts WHERE user_affirmed = 0
             ORDER BY is_active ASC, confidence ASC, created_at ASC LIMIT ?1",
            "DELETE FROM facts WHERE id = ?1",
            count,
        )?;
        if pruned > 0 {
            self.fire_fact_write_hook();
        }
        Ok(pruned)
    }

    /// Causal links: ascending confidence
    fn prune_causal_links(&self, count: i64) -> Result<i64> {
        self.prune_rows(
            "SELECT id FROM causal_links ORDER BY confidence ASC LIMIT ?1",
            "DELETE FROM causal_links WHERE id = ?1",
            count,
        )
    }

    /// Procedures: ascending success rate, then ascending usage
    fn prune_procedures(&self, count: i64) -> Result<i64> {
        self.prune_rows(
            "SELECT id FROM procedures
             ORDER BY (CAST(times_succeeded AS REAL) / MAX(1, times_used)) ASC,
                      times_used ASC
             LIMIT ?1",
            "DELETE FROM procedures WHERE id = ?1",
            count,
        )
    }

    /// Whether any cap or the total budget is exceeded
    pub fn limits_exceeded(&self, limits: &MemoryLimits) -> Result<bool> {
        let episodes = self.scalar("SELECT COUNT(*) FROM episodes")?;
        let facts = self.scalar("SELECT COUNT(*) FROM facts")?;
        let links = self.scalar("SELECT COUNT(*) FROM causal_links")?;
        let procedures = self.scalar("SELECT COUNT(*) FROM procedures")?;
        let weight = episodes * EPISODE_WEIGHT
            + facts * FACT_WEIGHT
            + links * CAUSAL_LINK_WEIGHT
            + procedures * PROCEDURE_WEIGHT;
        Ok(episodes > limits.max_episodes
            || facts > limits.max_facts
            || links > limits.max_causal_links
            || procedures > limits.max_procedures
            || weight > limits.max_total_weight)
    }

    /// Enforce all caps and the total budget; returns per-category counts
    pub fn enforce_limits(&self, limits: &MemoryLimits) -> Result<PruneReport> {
        self.guard_limits_sanity(limits);
        let mut report = PruneReport::default();

        let episodes = self.scalar("SELECT COUNT(*) FROM episodes")?;
        report.episodes_pruned += self.prune_episodes(episodes - limits.max_episodes)?;

        let facts = self.scalar("SELECT COUNT(*) FROM facts")?;
        report.facts_pruned += self.prune_facts(facts - limits.max_facts)?;

        let links = self.scalar("SELECT COUNT(*) FROM causal_links")?;
        report.causal_links_pruned += self.prune_causal_links(links - limits.max_causal_links)?;

        let procedures = self.scalar("SELECT COUNT(*) FROM procedures")?;
        report.procedures_pruned += self.prune_procedures(procedures - limits.max_procedures)?;

        // Total budget: prune by entity priority until under the cap. The
        // loop re-reads counts because each pass may empty a category.
        loop {
            let episodes = self.scalar("SELECT COUNT(*) FROM episodes")?;
            let facts = self.scalar("SELECT COUNT(*) FROM facts")?;
            let links = self.scalar("SELECT COUNT(*) FROM causal_links")?;
            let procedures = self.scalar("SELECT COUNT(*) FROM procedures")?;
            let weight = episodes * EPISODE_WEIGHT
                + facts * FACT_WEIGHT
                + links * CAUSAL_LINK_WEIGHT
                + procedures * PROCEDURE_WEIGHT;
            if weight <= limits.max_total_weight {
                break;
            }
            let excess = weight - limits.max_total_weight;
            let pruned = if episodes > 0 {
                let n = (excess + EPISODE_WEIGHT - 1) / EPISODE_WEIGHT;
                let p = self.prune_episodes(n.min(episodes))?;
                report.episodes_pruned += p;
                p
            } else if links > 0 {
                let n = (excess + CAUSAL_LINK_WEIGHT - 1) / CAUSAL_LINK_WEIGHT;
                let p = self.prune_causal_links(n.min(links))?;
                report.causal_links_pruned += p;
                p
            } else if procedures > 0 {
                let n = (excess + PROCEDURE_WEIGHT - 1) / PROCEDURE_WEIGHT;
                let p = self.prune_procedures(n.min(procedures))?;
                report.procedures_pruned += p;
                p
            } else if facts > 0 {
                let p = self.prune_facts(excess.min(facts))?;
                report.facts_pruned += p;
                p
            } else {
                0
            };
            // Only user-affirmed facts may remain; stop rather than spin.
            if pruned == 0 {
                break;
            }
        }

        if report.total() > 0 {
            tracing::info!(
                episodes = report.episodes_pruned,
                facts = report.facts_pruned,
                causal_links = report.causal_links_pruned,
                procedures = report.procedures_pruned,
                "memory limits enforced"
            );
        }
        Ok(report)
    }

    fn guard_limits_sanity(&self, limits: &MemoryLimits) {
        debug_assert!(limits.max_episodes >= 0);
        debug_assert!(limits.max_facts >= 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{CausalLink, Episode, Fact, Procedure};
    use tempfile::TempDir;

    fn test_store() -> (MemoryStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open_at("test-agent", dir.path().join("test.sqlite")).unwrap();
        (store, dir)
    }

    #[test]
    fn caps_are_enforced_per_category() {
        let (store, _dir) = test_store();
        for i in 0..6 {
            let mut ep = Episode::new("s1", format!("episode {i}"));
            ep.utility_score = i as f64 / 10.0;
            store.insert_episode(&ep).unwrap();
        }
        for i in 0..6 {
            store
                .insert_fact(&Fact::new("user", "likes", format!("thing {i}"), 0.1 * i as f64))
                .unwrap();
        }

        let limits = MemoryLimits {
            max_episodes: 4,
            max_facts: 3,
            max_causal_links: 10,
            max_procedures: 10,
            max_total_weight: 100_000,
        };
        let report = store.enforce_limits(&limits).unwrap();
        assert_eq!(report.episodes_pruned, 2);
        assert_eq!(report.facts_pruned, 3);

        let stats = store.stats().unwrap();
        assert_eq!(stats.episodes, 4);
        assert_eq!(stats.total_facts, 3);
    }

    #[test]
    fn user_affirmed_facts_survive_enforcement() {
        let (store, _dir) = test_store();
        let keeper = Fact::new("user", "name_is", "Alex Chen", 0.2).affirmed();
        store.insert_fact(&keeper).unwrap();
        for i in 0..5 {
            store
                .insert_fact(&Fact::new("user", "likes", format!("thing {i}"), 0.9))
                .unwrap();
        }

        let limits = MemoryLimits {
            max_facts: 2,
            ..Default::default()
        };
        store.enforce_limits(&limits).unwrap();

        let kept = store.get_fact(&keeper.id).unwrap();
        assert!(kept.is_some(), "user-affirmed fact must never be pruned");
    }

    #[test]
    fn lowest_utility_episodes_go_first() {
        let (store, _dir) = test_store();
        let mut low = Episode::new("s1", "low value chatter");
        low.utility_score = 0.1;
        let mut high = Episode::new("s1", "high value decision");
        high.utility_score = 0.9;
        store.insert_episode(&low).unwrap();
        store.insert_episode(&high).unwrap();

        let limits = MemoryLimits {
            max_episodes: 1,
            ..Default::default()
        };
        store.enforce_limits(&limits).unwrap();
        assert!(store.get_episode(&low.id).unwrap().is_none());
        assert!(store.get_episode(&high.id).unwrap().is_some());
    }

    #[test]
    fn weakest_links_and_procedures_go_first() {
        let (store, _dir) = test_store();
        let weak = CausalLink::new("a", "b", 0.2);
        let strong = CausalLink::new("c", "d", 0.9);
        store.insert_causal_link(&weak).unwrap();
        store.insert_causal_link(&strong).unwrap();

        let mut flaky = Procedure::new("t1", "a1");
        flaky.times_used = 4;
        flaky.times_succeeded = 1;
        let mut solid = Procedure::new("t2", "a2");
        solid.times_used = 4;
        solid.times_succeeded = 4;
        store.insert_procedure(&flaky).unwrap();
        store.insert_procedure(&solid).unwrap();

        let limits = MemoryLimits {
            max_causal_links: 1,
            max_procedures: 1,
            ..Default::default()
        };
        store.enforce_limits(&limits).unwrap();

        assert!(store.get_causal_link(&weak.id).unwrap().is_none());
        assert!(store.get_causal_link(&strong.id).unwrap().is_some());
        let remaining = store.all_procedures().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, solid.id);
    }
}
