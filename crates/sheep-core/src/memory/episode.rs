//! Episode - "what happened"
//!
//! A one-sentence summary of a conversational segment with salience and
//! utility scores. Episodes are immutable once written, except for access
//! bookkeeping and salience/utility updates; deletion is hard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;

// ============================================================================
// TTL
// ============================================================================

/// Retention bucket for an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeTtl {
    /// Keep for roughly a week
    #[serde(rename = "7d")]
    Week,
    /// Keep for roughly a month
    #[default]
    #[serde(rename = "30d")]
    Month,
    /// Keep for roughly a quarter
    #[serde(rename = "90d")]
    Quarter,
    /// Never age out
    Permanent,
}

impl EpisodeTtl {
    /// String form stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeTtl::Week => "7d",
            EpisodeTtl::Month => "30d",
            EpisodeTtl::Quarter => "90d",
            EpisodeTtl::Permanent => "permanent",
        }
    }

    /// Parse the stored string form; unknown values fall back to a month
    pub fn parse_name(s: &str) -> Self {
        match s {
            "7d" => EpisodeTtl::Week,
            "30d" => EpisodeTtl::Month,
            "90d" => EpisodeTtl::Quarter,
            "permanent" => EpisodeTtl::Permanent,
            _ => EpisodeTtl::Month,
        }
    }

    /// Nominal lifetime in days; `None` means permanent
    pub fn days(&self) -> Option<i64> {
        match self {
            EpisodeTtl::Week => Some(7),
            EpisodeTtl::Month => Some(30),
            EpisodeTtl::Quarter => Some(90),
            EpisodeTtl::Permanent => None,
        }
    }

    /// One step shorter-lived bucket, used when sleep demotes an episode
    pub fn demoted(&self) -> Self {
        match self {
            EpisodeTtl::Permanent => EpisodeTtl::Quarter,
            EpisodeTtl::Quarter => EpisodeTtl::Month,
            EpisodeTtl::Month | EpisodeTtl::Week => EpisodeTtl::Week,
        }
    }
}

impl std::fmt::Display for EpisodeTtl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// EPISODE
// ============================================================================

/// A consolidated conversational segment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    /// Unique id (`ep-` prefix)
    pub id: String,
    /// When the underlying conversation happened
    pub timestamp: DateTime<Utc>,
    /// One-line summary
    pub summary: String,
    /// Speaker labels, ordered, set-like
    pub participants: Vec<String>,
    /// Topic label
    pub topic: String,
    /// Keywords for retrieval
    pub keywords: Vec<String>,
    /// Emotional salience in [0,1]
    pub emotional_salience: f64,
    /// Usefulness in [0,1]
    pub utility_score: f64,
    /// Source session id
    pub session_id: String,
    /// Source message ids within the session
    pub message_ids: Vec<String>,
    /// Retention bucket
    pub ttl: EpisodeTtl,
    /// Times this episode was read back
    pub access_count: i64,
    /// Last read-back time
    pub last_access: DateTime<Utc>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Episode {
    /// Create a new episode with fresh id and bookkeeping
    pub fn new(session_id: impl Into<String>, summary: impl Into<String>) -> Self {
        let now = ids::now();
        Self {
            id: ids::new_id(ids::EPISODE),
            timestamp: now,
            summary: summary.into(),
            participants: Vec::new(),
            topic: String::new(),
            keywords: Vec::new(),
            emotional_salience: 0.0,
            utility_score: 0.5,
            session_id: session_id.into(),
            message_ids: Vec::new(),
            ttl: EpisodeTtl::Month,
            access_count: 0,
            last_access: now,
            created_at: now,
        }
    }

    /// Age in days relative to `at`
    pub fn age_days(&self, at: DateTime<Utc>) -> i64 {
        (at - self.timestamp).num_days().max(0)
    }

    /// Whether this episode has outlived its TTL bucket at `at`
    pub fn is_expired(&self, at: DateTime<Utc>) -> bool {
        match self.ttl.days() {
            Some(days) => self.age_days(at) > days,
            None => false,
        }
    }
}
