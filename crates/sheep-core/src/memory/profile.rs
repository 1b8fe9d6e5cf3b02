//! Per-user secondary entities
//!
//! Preferences, relationships, core memories, foresights, and the dynamic
//! user profile built during consolidation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;

// ============================================================================
// PREFERENCE
// ============================================================================

/// Polarity of a preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s {
            "negative" => Sentiment::Negative,
            _ => Sentiment::Positive,
        }
    }

    /// Derive the sentiment carried by a preference predicate
    pub fn from_predicate(predicate: &str) -> Self {
        match predicate {
            "dislikes" | "hates" | "prefers_not" => Sentiment::Negative,
            _ => Sentiment::Positive,
        }
    }
}

/// A mirrored user preference
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preference {
    /// Unique id (`pref-` prefix)
    pub id: String,
    /// Broad category, e.g. `food`, `general`
    pub category: String,
    /// The preference text (the fact's object)
    pub preference: String,
    /// Polarity
    pub sentiment: Sentiment,
    /// Confidence inherited from the source fact
    pub confidence: f64,
    /// Id of the fact this was mirrored from
    pub source_fact_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Preference {
    pub fn new(preference: impl Into<String>, sentiment: Sentiment, confidence: f64) -> Self {
        Self {
            id: ids::new_id(ids::PREFERENCE),
            category: "general".to_string(),
            preference: preference.into(),
            sentiment,
            confidence: confidence.clamp(0.0, 1.0),
            source_fact_id: None,
            created_at: ids::now(),
        }
    }
}

// ============================================================================
// RELATIONSHIP
// ============================================================================

/// A person in the user's life, distilled from facts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// Unique id (`rel-` prefix)
    pub id: String,
    /// The other person's label
    pub person: String,
    /// Relation type, e.g. `colleague`, `sister`
    pub relation_type: String,
    /// Closeness estimate in [0,1]
    pub closeness: f64,
    /// Fact ids supporting this relationship
    pub fact_ids: Vec<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    pub fn new(person: impl Into<String>, relation_type: impl Into<String>) -> Self {
        Self {
            id: ids::new_id(ids::RELATIONSHIP),
            person: person.into(),
            relation_type: relation_type.into(),
            closeness: 0.5,
            fact_ids: Vec::new(),
            created_at: ids::now(),
        }
    }
}

// ============================================================================
// CORE MEMORY
// ============================================================================

/// A durable identity-level note produced by consolidation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreMemory {
    /// Unique id (`cm-` prefix)
    pub id: String,
    /// The note itself
    pub content: String,
    /// Category, e.g. `identity`, `value`, `milestone`
    pub category: String,
    /// Importance in [0,1]
    pub importance: f64,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl CoreMemory {
    pub fn new(content: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: ids::new_id(ids::CORE_MEMORY),
            content: content.into(),
            category: category.into(),
            importance: 0.5,
            created_at: ids::now(),
        }
    }
}

// ============================================================================
// FORESIGHT
// ============================================================================

/// A time-bounded expectation about the future
///
/// Links back to the episode it was extracted from. `is_active` turns
/// false once the window closes or the foresight is superseded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Foresight {
    /// Unique id (`fs-` prefix)
    pub id: String,
    /// What is expected to happen
    pub description: String,
    /// When the expectation window opens
    pub start_time: DateTime<Utc>,
    /// When it closes, if known
    pub end_time: Option<DateTime<Utc>>,
    /// Window length in days, if expressed that way
    pub duration_days: Option<i64>,
    /// Whether the expectation is still live
    pub is_active: bool,
    /// Confidence in [0,1]
    pub confidence: f64,
    /// Episode the foresight came from
    pub source_episode_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Foresight {
    pub fn new(description: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            id: ids::new_id(ids::FORESIGHT),
            description: description.into(),
            start_time,
            end_time: None,
            duration_days: None,
            is_active: true,
            confidence: 0.6,
            source_episode_id: None,
            created_at: ids::now(),
        }
    }

    /// Normalized prefix used for deduplication
    pub fn dedupe_prefix(&self) -> String {
        self.description
            .trim()
            .to_lowercase()
            .chars()
            .take(40)
            .collect()
    }
}

// ============================================================================
// USER PROFILE
// ============================================================================

/// The dynamic user profile built from active facts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Unique id (`prof-` prefix)
    pub id: String,
    /// Canonical user label this profile describes
    pub user: String,
    /// Traits unlikely to change (predicate → object)
    pub stable_traits: Vec<(String, String)>,
    /// Traits likely to churn
    pub transient_traits: Vec<(String, String)>,
    /// One-paragraph synthesis
    pub summary: String,
    /// Last rebuild time
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            id: ids::new_id(ids::PROFILE),
            user: user.into(),
            stable_traits: Vec::new(),
            transient_traits: Vec::new(),
            summary: String::new(),
            updated_at: ids::now(),
        }
    }
}
