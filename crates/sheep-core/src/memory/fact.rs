//! Fact - a subject-predicate-object belief
//!
//! Active facts form the current belief set. Retraction is soft: the fact
//! stays readable with `is_active = false` and a reason, and a `retract`
//! change record preserves the history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;

/// Evidence marker for facts asserted directly by the user rather than
/// extracted from an episode.
pub const USER_EXPLICIT_EVIDENCE: &str = "user_explicit";

/// Predicates that admit at most one active fact per subject.
pub const UNIQUE_PREDICATES: &[&str] = &[
    "works_at",
    "lives_in",
    "name_is",
    "age_is",
    "born_in",
    "married_to",
    "favorite_color",
];

/// Predicates mirrored into the preference table during consolidation.
pub const PREFERENCE_PREDICATES: &[&str] =
    &["prefers", "likes", "dislikes", "prefers_not", "loves", "hates"];

/// Normalize a predicate: lowercase, whitespace runs become `_`.
pub fn normalize_predicate(predicate: &str) -> String {
    predicate
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// A subject-predicate-object triple with confidence and provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    /// Unique id (`fact-` prefix)
    pub id: String,
    /// Subject entity, verbatim
    pub subject: String,
    /// Normalized predicate (lowercase, `_` separators)
    pub predicate: String,
    /// Object value, verbatim
    pub object: String,
    /// Belief confidence in [0,1]
    pub confidence: f64,
    /// Episode ids (or `user_explicit`) supporting this fact
    pub evidence: Vec<String>,
    /// First time this belief appeared
    pub first_seen: DateTime<Utc>,
    /// Most recent confirmation
    pub last_confirmed: DateTime<Utc>,
    /// Ids of conflicting facts
    pub contradictions: Vec<String>,
    /// Whether the user stated this directly
    pub user_affirmed: bool,
    /// Whether this fact is part of the current belief set
    pub is_active: bool,
    /// Reason attached at retraction time
    pub retracted_reason: Option<String>,
    /// Times this fact was read back
    pub access_count: i64,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Fact {
    /// Create a new active fact; the predicate is normalized here.
    pub fn new(
        subject: impl Into<String>,
        predicate: &str,
        object: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let now = ids::now();
        Self {
            id: ids::new_id(ids::FACT),
            subject: subject.into(),
            predicate: normalize_predicate(predicate),
            object: object.into(),
            confidence: confidence.clamp(0.0, 1.0),
            evidence: Vec::new(),
            first_seen: now,
            last_confirmed: now,
            contradictions: Vec::new(),
            user_affirmed: false,
            is_active: true,
            retracted_reason: None,
            access_count: 0,
            created_at: now,
        }
    }

    /// Builder-style evidence attachment
    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }

    /// Builder-style user affirmation
    pub fn affirmed(mut self) -> Self {
        self.user_affirmed = true;
        self
    }

    /// Whether the predicate is in the unique-per-subject set
    pub fn has_unique_predicate(&self) -> bool {
        UNIQUE_PREDICATES.contains(&self.predicate.as_str())
    }

    /// Whether the predicate expresses a preference
    pub fn has_preference_predicate(&self) -> bool {
        PREFERENCE_PREDICATES.contains(&self.predicate.as_str())
    }

    /// Case-insensitive SPO equality
    pub fn same_triple(&self, other: &Fact) -> bool {
        self.subject.eq_ignore_ascii_case(&other.subject)
            && self.predicate == other.predicate
            && self.object.eq_ignore_ascii_case(&other.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_normalization() {
        assert_eq!(normalize_predicate("Works At"), "works_at");
        assert_eq!(normalize_predicate("  lives   in "), "lives_in");
        assert_eq!(normalize_predicate("likes"), "likes");
    }

    #[test]
    fn new_fact_is_active_and_clamped() {
        let f = Fact::new("user", "Works At", "TechCorp", 1.7);
        assert!(f.is_active);
        assert_eq!(f.predicate, "works_at");
        assert!((f.confidence - 1.0).abs() < f64::EPSILON);
        assert!(f.has_unique_predicate());
    }

    #[test]
    fn triple_equality_is_case_insensitive() {
        let a = Fact::new("User", "works_at", "TechCorp", 0.9);
        let b = Fact::new("user", "works_at", "techcorp", 0.5);
        assert!(a.same_triple(&b));
    }

    #[test]
    fn preference_predicates_detected() {
        assert!(Fact::new("user", "likes", "espresso", 0.8).has_preference_predicate());
        assert!(!Fact::new("user", "works_at", "TechCorp", 0.8).has_preference_predicate());
    }
}
