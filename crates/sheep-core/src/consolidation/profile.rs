//! Preference Wiring & Profile Discrimination
//!
//! Preference-predicate facts about the canonical user are mirrored into
//! the preference table with derived sentiment. The dynamic user profile
//! separates stable traits (durable biography) from transient ones and
//! carries a short synthesized summary.

use crate::memory::{Fact, Preference, Relationship, Sentiment, UserProfile};
use crate::storage::{MemoryStore, Result};

/// Predicates treated as stable biography in the profile
const STABLE_PREDICATES: &[&str] = &["name_is", "works_at", "lives_in", "born_in", "married_to"];

/// Predicates whose object names a person in the user's life
const RELATIONSHIP_PREDICATES: &[(&str, &str)] = &[
    ("married_to", "spouse"),
    ("has_sibling", "sibling"),
    ("has_child", "child"),
    ("friend_of", "friend"),
    ("manager_is", "manager"),
    ("works_with", "colleague"),
];

/// Mirror new preference facts into the preference table.
///
/// Only facts whose subject is the canonical user qualify; sentiment is
/// derived from the predicate. Returns how many were mirrored.
pub fn mirror_preferences(
    store: &MemoryStore,
    canonical_user: &str,
    new_facts: &[Fact],
) -> Result<i64> {
    let existing = store.preferences()?;
    let mut mirrored = 0;

    for fact in new_facts {
        if !fact.has_preference_predicate()
            || !fact.subject.eq_ignore_ascii_case(canonical_user)
            || !fact.is_active
        {
            continue;
        }
        let duplicate = existing.iter().any(|p| {
            p.preference.eq_ignore_ascii_case(&fact.object)
                && p.sentiment == Sentiment::from_predicate(&fact.predicate)
        });
        if duplicate {
            continue;
        }
        let mut pref = Preference::new(
            fact.object.clone(),
            Sentiment::from_predicate(&fact.predicate),
            fact.confidence,
        );
        pref.source_fact_id = Some(fact.id.clone());
        store.insert_preference(&pref)?;
        mirrored += 1;
    }
    Ok(mirrored)
}

/// Mirror relationship-predicate facts into the relationship table.
/// Returns how many new relationships were recorded.
pub fn sync_relationships(store: &MemoryStore, canonical_user: &str) -> Result<i64> {
    let facts = store.facts_about(canonical_user, None)?;
    let existing = store.relationships()?;
    let mut added = 0;

    for fact in &facts {
        let Some((_, relation_type)) = RELATIONSHIP_PREDICATES
            .iter()
            .find(|(predicate, _)| *predicate == fact.predicate)
        else {
            continue;
        };
        if existing
            .iter()
            .any(|r| r.person.eq_ignore_ascii_case(&fact.object))
        {
            continue;
        }
        let mut relationship = Relationship::new(fact.object.clone(), *relation_type);
        relationship.closeness = fact.confidence.clamp(0.0, 1.0);
        relationship.fact_ids = vec![fact.id.clone()];
        store.insert_relationship(&relationship)?;
        added += 1;
    }
    Ok(added)
}

/// Rebuild the user profile from the current belief set
pub fn rebuild_profile(store: &MemoryStore, canonical_user: &str) -> Result<UserProfile> {
    let facts = store.facts_about(canonical_user, None)?;

    let mut profile = match store.get_profile(canonical_user)? {
        Some(existing) => existing,
        None => UserProfile::new(canonical_user),
    };
    profile.stable_traits.clear();
    profile.transient_traits.clear();

    for fact in &facts {
        let pair = (fact.predicate.clone(), fact.object.clone());
        if STABLE_PREDICATES.contains(&fact.predicate.as_str()) {
            profile.stable_traits.push(pair);
        } else {
            profile.transient_traits.push(pair);
        }
    }

    profile.summary = summarize(&profile);
    profile.updated_at = crate::ids::now();
    store.upsert_profile(&profile)?;
    Ok(profile)
}

fn summarize(profile: &UserProfile) -> String {
    let mut parts: Vec<String> = Vec::new();
    for (predicate, object) in profile.stable_traits.iter().take(4) {
        parts.push(match predicate.as_str() {
            "name_is" => format!("named {object}"),
            "works_at" => format!("works at {object}"),
            "lives_in" => format!("lives in {object}"),
            "born_in" => format!("born in {object}"),
            "married_to" => format!("married to {object}"),
            other => format!("{} {object}", other.replace('_', " ")),
        });
    }
    if parts.is_empty() {
        return String::from("No stable traits known yet.");
    }
    format!("User is {}.", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (MemoryStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let s = MemoryStore::open_at("t", dir.path().join("t.sqlite")).unwrap();
        (s, dir)
    }

    #[test]
    fn preferences_mirror_with_sentiment() {
        let (store, _dir) = store();
        let likes = Fact::new("user", "likes", "hiking", 0.8);
        let hates = Fact::new("user", "hates", "mondays", 0.7);
        let other = Fact::new("Melanie", "likes", "painting", 0.8);
        for f in [&likes, &hates, &other] {
            store.insert_fact(f).unwrap();
        }

        let mirrored =
            mirror_preferences(&store, "user", &[likes.clone(), hates.clone(), other.clone()])
                .unwrap();
        assert_eq!(mirrored, 2);

        let prefs = store.preferences().unwrap();
        let hiking = prefs.iter().find(|p| p.preference == "hiking").unwrap();
        assert_eq!(hiking.sentiment, Sentiment::Positive);
        let mondays = prefs.iter().find(|p| p.preference == "mondays").unwrap();
        assert_eq!(mondays.sentiment, Sentiment::Negative);
    }

    #[test]
    fn mirroring_twice_does_not_duplicate() {
        let (store, _dir) = store();
        let likes = Fact::new("user", "likes", "hiking", 0.8);
        store.insert_fact(&likes).unwrap();
        mirror_preferences(&store, "user", std::slice::from_ref(&likes)).unwrap();
        let mirrored = mirror_preferences(&store, "user", std::slice::from_ref(&likes)).unwrap();
        assert_eq!(mirrored, 0);
        assert_eq!(store.preferences().unwrap().len(), 1);
    }

    #[test]
    fn relationship_facts_mirror_once() {
        let (store, _dir) = store();
        store
            .insert_fact(&Fact::new("user", "married_to", "Jordan", 0.9))
            .unwrap();
        store
            .insert_fact(&Fact::new("user", "manager_is", "Sofia", 0.8))
            .unwrap();

        assert_eq!(sync_relationships(&store, "user").unwrap(), 2);
        assert_eq!(sync_relationships(&store, "user").unwrap(), 0);

        let rels = store.relationships().unwrap();
        assert_eq!(rels.len(), 2);
        let spouse = rels.iter().find(|r| r.person == "Jordan").unwrap();
        assert_eq!(spouse.relation_type, "spouse");
        assert!((spouse.closeness - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn profile_separates_stable_from_transient() {
        let (store, _dir) = store();
        for fact in [
            Fact::new("user", "name_is", "Alex Chen", 0.95),
            Fact::new("user", "works_at", "TechCorp", 0.9),
            Fact::new("user", "likes", "espresso", 0.7),
        ] {
            store.insert_fact(&fact).unwrap();
        }

        let profile = rebuild_profile(&store, "user").unwrap();
        assert_eq!(profile.stable_traits.len(), 2);
        assert_eq!(profile.transient_traits.len(), 1);
        assert!(profile.summary.contains("Alex Chen"));
        assert!(profile.summary.contains("TechCorp"));

        // Rebuild is an upsert, not an append
        let again = rebuild_profile(&store, "user").unwrap();
        assert_eq!(again.stable_traits.len(), 2);
    }
}
