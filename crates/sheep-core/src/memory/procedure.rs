//! Procedure - a reusable trigger → action pattern with success statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;

/// A learned trigger → action pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Procedure {
    /// Unique id (`proc-` prefix)
    pub id: String,
    /// Situation that activates the procedure
    pub trigger: String,
    /// What to do when triggered
    pub action: String,
    /// What should happen if the action works
    pub expected_outcome: Option<String>,
    /// Episode ids where this pattern was observed
    pub examples: Vec<String>,
    /// Times the procedure was applied
    pub times_used: i64,
    /// Times the application succeeded
    pub times_succeeded: i64,
    /// Tags for retrieval
    pub tags: Vec<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Procedure {
    pub fn new(trigger: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: ids::new_id(ids::PROCEDURE),
            trigger: trigger.into(),
            action: action.into(),
            expected_outcome: None,
            examples: Vec::new(),
            times_used: 0,
            times_succeeded: 0,
            tags: Vec::new(),
            created_at: ids::now(),
        }
    }

    /// Derived success rate: `times_succeeded / max(1, times_used)`
    pub fn success_rate(&self) -> f64 {
        self.times_succeeded as f64 / (self.times_used.max(1)) as f64
    }

    /// Dedupe key: lowercase trigger + action
    pub fn dedupe_key(&self) -> String {
        format!(
            "{}\u{1f}{}",
            self.trigger.trim().to_lowercase(),
            self.action.trim().to_lowercase()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_avoids_division_by_zero() {
        let p = Procedure::new("when tests fail", "rerun with verbose output");
        assert_eq!(p.success_rate(), 0.0);
    }

    #[test]
    fn success_rate_reflects_counts() {
        let mut p = Procedure::new("t", "a");
        p.times_used = 4;
        p.times_succeeded = 3;
        assert!((p.success_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn dedupe_key_is_case_insensitive() {
        let a = Procedure::new("When X", "Do Y");
        let b = Procedure::new("when x", "do y");
        assert_eq!(a.dedupe_key(), b.dedupe_key());
    }
}
