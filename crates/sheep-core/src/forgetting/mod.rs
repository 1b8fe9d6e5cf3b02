//! Forgetting & Retention Scoring
//!
//! A composite retention score in [0,1] per item decides what stays.
//! The scorers are pure functions over the entity plus a small summary
//! from the store (the referenced-by-active-fact flag), so they are
//! cheap to re-evaluate and easy to test. Weights are fixed within a
//! build.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::memory::{Episode, EpisodeTtl, Fact};
use crate::storage::{MemoryStore, Result};

/// Default score below which active forgetting removes an item
pub const DEFAULT_MIN_RETENTION_SCORE: f64 = 0.2;

// Episode factor weights
const EP_ACCESS_WEIGHT: f64 = 0.20;
const EP_RECENCY_WEIGHT: f64 = 0.25;
const EP_SALIENCE_WEIGHT: f64 = 0.20;
const EP_UTILITY_WEIGHT: f64 = 0.20;
const EP_TTL_WEIGHT: f64 = 0.10;
const EP_REFERENCED_BOOST: f64 = 0.05;

// Fact factor weights
const FACT_CONFIDENCE_WEIGHT: f64 = 0.30;
const FACT_RECENCY_WEIGHT: f64 = 0.25;
const FACT_ACCESS_WEIGHT: f64 = 0.15;
const FACT_EVIDENCE_WEIGHT: f64 = 0.15;
const FACT_AFFIRMED_FLOOR: f64 = 0.9;
const FACT_CONTRADICTION_PENALTY: f64 = 0.08;
const FACT_CONTRADICTION_PENALTY_CAP: f64 = 0.25;

/// Accesses needed to saturate the access factor
const ACCESS_SATURATION: f64 = 10.0;
/// Days over which recency halves-ish
const RECENCY_SCALE_DAYS: f64 = 30.0;

fn access_factor(access_count: i64) -> f64 {
    (access_count as f64 / ACCESS_SATURATION).min(1.0)
}

fn recency_factor(last: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let days = (now - last).num_hours().max(0) as f64 / 24.0;
    1.0 / (1.0 + days / RECENCY_SCALE_DAYS)
}

fn ttl_factor(ttl: EpisodeTtl) -> f64 {
    match ttl {
        EpisodeTtl::Week => 0.25,
        EpisodeTtl::Month => 0.5,
        EpisodeTtl::Quarter => 0.75,
        EpisodeTtl::Permanent => 1.0,
    }
}

/// Composite retention score for an episode
pub fn episode_retention(
    episode: &Episode,
    now: DateTime<Utc>,
    referenced_by_active_fact: bool,
) -> f64 {
    let score = EP_ACCESS_WEIGHT * access_factor(episode.access_count)
        + EP_RECENCY_WEIGHT * recency_factor(episode.last_access.max(episode.timestamp), now)
        + EP_SALIENCE_WEIGHT * episode.emotional_salience.clamp(0.0, 1.0)
        + EP_UTILITY_WEIGHT * episode.utility_score.clamp(0.0, 1.0)
        + EP_TTL_WEIGHT * ttl_factor(episode.ttl)
        + if referenced_by_active_fact {
            EP_REFERENCED_BOOST
        } else {
            0.0
        };
    score.clamp(0.0, 1.0)
}

/// Composite retention score for a fact. User-affirmed facts are floored
/// high enough that forgetting can never reach them.
pub fn fact_retention(fact: &Fact, now: DateTime<Utc>) -> f64 {
    let evidence_factor = (fact.evidence.len() as f64 / 3.0).min(1.0);
    let penalty = (fact.contradictions.len() as f64 * FACT_CONTRADICTION_PENALTY)
        .min(FACT_CONTRADICTION_PENALTY_CAP);

    let mut score = FACT_CONFIDENCE_WEIGHT * fact.confidence.clamp(0.0, 1.0)
        + FACT_RECENCY_WEIGHT * recency_factor(fact.last_confirmed, now)
        + FACT_ACCESS_WEIGHT * access_factor(fact.access_count)
        + FACT_EVIDENCE_WEIGHT * evidence_factor
        - penalty;

    if fact.user_affirmed {
        score = score.max(FACT_AFFIRMED_FLOOR);
    }
    score.clamp(0.0, 1.0)
}

/// What active forgetting removed
#[derive(Debug, Clone, Default)]
pub struct ForgettingReport {
    pub facts_retracted: i64,
    pub episodes_deleted: i64,
}

impl ForgettingReport {
    pub fn total(&self) -> i64 {
        self.facts_retracted + self.episodes_deleted
    }
}

/// Retract facts and hard-delete episodes scoring below `min_score`.
///
/// User-affirmed facts are never retracted here. Episodes referenced by
/// an active fact get the reference boost before scoring.
pub fn run_active_forgetting(
    store: &MemoryStore,
    min_score: f64,
    run_id: Option<&str>,
) -> Result<ForgettingReport> {
    let now = crate::ids::now();
    let mut report = ForgettingReport::default();

    let active = store.active_facts()?;
    let referenced: HashSet<&str> = active
        .iter()
        .flat_map(|f| f.evidence.iter())
        .map(String::as_str)
        .collect();

    for fact in &active {
        if fact.user_affirmed {
            continue;
        }
        let score = fact_retention(fact, now);
        if score < min_score {
            store.retract_fact(
                &fact.id,
                &format!("active forgetting: retention {score:.2} below {min_score:.2}"),
                run_id,
            )?;
            report.facts_retracted += 1;
        }
    }

    // The referenced set is the pre-pass belief set: facts retracted
    // above still protect their evidence episodes until the next run.
    for episode in store.recent_episodes(100_000)? {
        let boost = referenced.contains(episode.id.as_str());
        let score = episode_retention(&episode, now, boost);
        if score < min_score {
            store.delete_episode(&episode.id)?;
            report.episodes_deleted += 1;
        }
    }

    if report.total() > 0 {
        tracing::info!(
            facts = report.facts_retracted,
            episodes = report.episodes_deleted,
            "active forgetting pass complete"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn fresh_salient_episode_scores_high() {
        let mut ep = Episode::new("s1", "big news");
        ep.emotional_salience = 0.9;
        ep.utility_score = 0.8;
        ep.ttl = EpisodeTtl::Permanent;
        let score = episode_retention(&ep, ids::now(), true);
        assert!(score > 0.6, "got {score}");
    }

    #[test]
    fn stale_unused_episode_scores_low() {
        let mut ep = Episode::new("s1", "idle chatter");
        ep.timestamp = ids::now() - Duration::days(120);
        ep.last_access = ep.timestamp;
        ep.emotional_salience = 0.0;
        ep.utility_score = 0.1;
        ep.ttl = EpisodeTtl::Week;
        let score = episode_retention(&ep, ids::now(), false);
        assert!(score < 0.2, "got {score}");
    }

    #[test]
    fn referenced_boost_is_additive() {
        let ep = Episode::new("s1", "x");
        let now = ids::now();
        let unboosted = episode_retention(&ep, now, false);
        let boosted = episode_retention(&ep, now, true);
        assert!((boosted - unboosted - EP_REFERENCED_BOOST).abs() < 1e-9);
    }

    #[test]
    fn affirmed_facts_are_floored() {
        let mut fact = Fact::new("user", "name_is", "Alex Chen", 0.1);
        fact.last_confirmed = ids::now() - Duration::days(365);
        fact.user_affirmed = true;
        assert!(fact_retention(&fact, ids::now()) >= 0.9);
    }

    #[test]
    fn contradictions_penalize_with_a_cap() {
        let now = ids::now();
        let base = Fact::new("user", "works_at", "TechCorp", 0.8);
        let clean = fact_retention(&base, now);

        let mut contradicted = base.clone();
        contradicted.contradictions = vec!["fact-a".into(), "fact-b".into()];
        let penalized = fact_retention(&contradicted, now);
        assert!((clean - penalized - 0.16).abs() < 1e-9);

        let mut heavy = base.clone();
        heavy.contradictions = (0..10).map(|i| format!("fact-{i}")).collect();
        let capped = fact_retention(&heavy, now);
        assert!((clean - capped - FACT_CONTRADICTION_PENALTY_CAP).abs() < 1e-9);
    }

    #[test]
    fn active_forgetting_spares_affirmed_facts() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open_at("t", dir.path().join("t.sqlite")).unwrap();

        let mut weak = Fact::new("user", "likes", "that one song", 0.05);
        weak.last_confirmed = ids::now() - Duration::days(300);
        // created_at drives nothing here; last_confirmed is stale enough
        store.insert_fact(&weak).unwrap();

        let affirmed = Fact::new("user", "name_is", "Alex Chen", 0.05).affirmed();
        store.insert_fact(&affirmed).unwrap();

        let report = run_active_forgetting(&store, 0.35, None).unwrap();
        assert_eq!(report.facts_retracted, 1);

        let weak_back = store.get_fact(&weak.id).unwrap().unwrap();
        assert!(!weak_back.is_active);
        let affirmed_back = store.get_fact(&affirmed.id).unwrap().unwrap();
        assert!(affirmed_back.is_active);
    }
}
