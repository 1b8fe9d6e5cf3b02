//! Point-in-time Queries & Belief Timeline
//!
//! A fact's state "as of" a timestamp is reconstructed by combining its
//! creation record with the latest change record at or before that time.
//! The change log is append-only, so reconstruction is deterministic.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::memory::{ChangeType, Fact, MemoryChange};

use super::{FactFilter, MemoryStore, Result, StoreError};

/// What a belief-timeline entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BeliefEventKind {
    Created,
    Updated,
    Retracted,
}

/// One entry in a subject's belief timeline
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeliefEvent {
    pub kind: BeliefEventKind,
    pub fact_id: String,
    pub predicate: String,
    pub value: String,
    pub confidence: f64,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Value carried by a `modify` change record
#[derive(Debug, serde::Deserialize)]
struct ModifyPayload {
    object: String,
    confidence: f64,
}

impl MemoryStore {
    /// Facts that formed the active belief set at `as_of`.
    ///
    /// A fact qualifies when it was created at or before `as_of` and no
    /// retract change exists at or before `as_of`. The object/confidence
    /// reflect the latest `modify` change at or before `as_of`.
    pub fn facts_as_of(&self, as_of: DateTime<Utc>, filter: &FactFilter) -> Result<Vec<Fact>> {
        // Pull candidates matching subject/predicate regardless of the
        // current active flag; activity "then" is decided by the log.
        let candidates = self.query_facts(&FactFilter {
            subject: filter.subject.clone(),
            predicate: filter.predicate.clone(),
            object: None,
            active_only: false,
        })?;

        let mut result = Vec::new();
        for mut fact in candidates {
            if fact.created_at > as_of {
                continue;
            }

            let changes = self.changes_for(&fact.id)?;
            let mut retracted = false;
            let mut last_modify: Option<&MemoryChange> = None;
            for change in &changes {
                if change.created_at > as_of {
                    continue;
                }
                match change.change_type {
                    ChangeType::Retract => retracted = true,
                    ChangeType::Modify => last_modify = Some(change),
                    _ => {}
                }
            }
            if retracted {
                continue;
            }

            if let Some(modify) = last_modify {
                if let Some(raw) = &modify.new_value {
                    if let Ok(payload) = serde_json::from_str::<ModifyPayload>(raw) {
                        fact.object = payload.object;
                        fact.confidence = payload.confidence;
                    }
                }
            } else if fact.created_at <= as_of {
                // The row may carry later in-place modifications; restore
                // the creation-time object from the create record.
                if let Some(create) = changes
                    .iter()
                    .find(|c| c.change_type == ChangeType::Create)
                {
                    if let Some(raw) = &create.new_value {
                        if let Ok(original) = serde_json::from_str::<Fact>(raw) {
                            fact.object = original.object;
                            fact.confidence = original.confidence;
                        }
                    }
                }
            }

            if let Some(object) = &filter.object {
                if !fact.object.eq_ignore_ascii_case(object) {
                    continue;
                }
            }
            fact.is_active = true;
            result.push(fact);
        }
        Ok(result)
    }

    /// Chronological belief history for a subject: one `created` event per
    /// fact plus one `updated`/`retracted` event per recorded change.
    pub fn belief_timeline(&self, subject: &str) -> Result<Vec<BeliefEvent>> {
        let facts = self.query_facts(&FactFilter {
            subject: Some(subject.to_string()),
            active_only: false,
            ..Default::default()
        })?;

        let mut events = Vec::new();
        for fact in &facts {
            let changes = self.changes_for(&fact.id)?;

            // Creation-time value comes from the create record when present
            let (created_value, created_confidence) = changes
                .iter()
                .find(|c| c.change_type == ChangeType::Create)
                .and_then(|c| c.new_value.as_deref())
                .and_then(|raw| serde_json::from_str::<Fact>(raw).ok())
                .map(|f| (f.object, f.confidence))
                .unwrap_or_else(|| (fact.object.clone(), fact.confidence));

            events.push(BeliefEvent {
                kind: BeliefEventKind::Created,
                fact_id: fact.id.clone(),
                predicate: fact.predicate.clone(),
                value: created_value,
                confidence: created_confidence,
                reason: String::new(),
                timestamp: fact.created_at,
            });

            for change in changes {
                let event = match change.change_type {
                    ChangeType::Create => continue,
                    ChangeType::Retract => BeliefEvent {
                        kind: BeliefEventKind::Retracted,
                        fact_id: fact.id.clone(),
                        predicate: fact.predicate.clone(),
                        value: fact.object.clone(),
                        confidence: fact.confidence,
                        reason: change.reason.clone(),
                        timestamp: change.created_at,
                    },
                    ChangeType::Modify => {
                        let payload = change
                            .new_value
                            .as_deref()
                            .and_then(|raw| serde_json::from_str::<ModifyPayload>(raw).ok());
                        BeliefEvent {
                            kind: BeliefEventKind::Updated,
                            fact_id: fact.id.clone(),
                            predicate: fact.predicate.clone(),
                            value: payload
                                .as_ref()
                                .map(|p| p.object.clone())
                                .unwrap_or_else(|| fact.object.clone()),
                            confidence: payload.map(|p| p.confidence).unwrap_or(fact.confidence),
                            reason: change.reason.clone(),
                            timestamp: change.created_at,
                        }
                    }
                    ChangeType::Strengthen | ChangeType::Weaken => BeliefEvent {
                        kind: BeliefEventKind::Updated,
                        fact_id: fact.id.clone(),
                        predicate: fact.predicate.clone(),
                        value: fact.object.clone(),
                        confidence: change
                            .new_value
                            .as_deref()
                            .and_then(|v| v.parse::<f64>().ok())
                            .unwrap_or(fact.confidence),
                        reason: change.reason.clone(),
                        timestamp: change.created_at,
                    },
                };
                events.push(event);
            }
        }

        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(events)
    }

    /// All change records at or after `since`, oldest first
    pub fn changes_since(&self, since: DateTime<Utc>) -> Result<Vec<MemoryChange>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader
            .prepare("SELECT * FROM memory_changes WHERE created_at >= ?1 ORDER BY created_at ASC")
            .map_err(StoreError::Database)?;
        let rows = stmt
            .query_map(
                rusqlite::params![crate::ids::to_rfc3339(since)],
                Self::row_to_change,
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
    use crate::ids;
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;

    fn test_store() -> (MemoryStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open_at("test-agent", dir.path().join("test.sqlite")).unwrap();
        (store, dir)
    }

    #[test]
    fn point_in_time_tracks_create_modify_retract() {
        let (store, _dir) = test_store();

        let fact = Fact::new("user", "lives_in", "Seattle", 0.8);
        store.insert_fact(&fact).unwrap();
        let t1 = ids::now();

        std::thread::sleep(StdDuration::from_millis(10));
        store
            .modify_fact(&fact.id, "San Francisco", 0.85, "user moved", None)
            .unwrap();
        let t2 = ids::now();

        std::thread::sleep(StdDuration::from_millis(10));
        store.retract_fact(&fact.id, "no longer relevant", None).unwrap();
        let t3 = ids::now();

        let filter = FactFilter::active_about("user");

        let at_t1 = store.facts_as_of(t1, &filter).unwrap();
        assert_eq!(at_t1.len(), 1);
        assert_eq!(at_t1[0].object, "Seattle");

        let at_t2 = store.facts_as_of(t2, &filter).unwrap();
        assert_eq!(at_t2.len(), 1);
        assert_eq!(at_t2[0].object, "San Francisco");

        let at_t3 = store.facts_as_of(t3, &filter).unwrap();
        assert!(at_t3.is_empty());
    }

    #[test]
    fn timeline_is_chronological_with_reasons() {
        let (store, _dir) = test_store();
        let fact = Fact::new("user", "works_at", "Google", 0.9);
        store.insert_fact(&fact).unwrap();
        std::thread::sleep(StdDuration::from_millis(5));
        store
            .retract_fact(&fact.id, "contradicted by newer statement", None)
            .unwrap();

        let timeline = store.belief_timeline("user").unwrap();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].kind, BeliefEventKind::Created);
        assert_eq!(timeline[1].kind, BeliefEventKind::Retracted);
        assert_eq!(timeline[1].reason, "contradicted by newer statement");
        assert!(timeline[0].timestamp <= timeline[1].timestamp);
    }

    #[test]
    fn changes_since_returns_recent_entries() {
        let (store, _dir) = test_store();
        let before = ids::now() - chrono::Duration::seconds(5);
        store
            .insert_fact(&Fact::new("user", "likes", "espresso", 0.7))
            .unwrap();
        let changes = store.changes_since(before).unwrap();
        assert_eq!(changes.len(), 1);

        let future = ids::now() + chrono::Duration::seconds(60);
        assert!(store.changes_since(future).unwrap().is_empty());
    }
}
