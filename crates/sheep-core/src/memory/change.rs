//! Memory Change Log & Consolidation Runs
//!
//! `MemoryChange` rows are append-only; they are never mutated once
//! written. Replaying a fact's creation record plus its change records up
//! to a timestamp reconstructs the belief state "as of" that time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;

// ============================================================================
// CHANGE LOG
// ============================================================================

/// What kind of transition a change records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Confidence increased
    Strengthen,
    /// Confidence decreased
    Weaken,
    /// Object and/or confidence replaced
    Modify,
    /// Soft retraction
    Retract,
    /// Record created
    Create,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Strengthen => "strengthen",
            ChangeType::Weaken => "weaken",
            ChangeType::Modify => "modify",
            ChangeType::Retract => "retract",
            ChangeType::Create => "create",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "strengthen" => Some(ChangeType::Strengthen),
            "weaken" => Some(ChangeType::Weaken),
            "modify" => Some(ChangeType::Modify),
            "retract" => Some(ChangeType::Retract),
            "create" => Some(ChangeType::Create),
            _ => None,
        }
    }
}

/// What entity class a change targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Fact,
    Episode,
    CausalLink,
    Procedure,
    Foresight,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Fact => "fact",
            TargetType::Episode => "episode",
            TargetType::CausalLink => "causal_link",
            TargetType::Procedure => "procedure",
            TargetType::Foresight => "foresight",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "fact" => Some(TargetType::Fact),
            "episode" => Some(TargetType::Episode),
            "causal_link" => Some(TargetType::CausalLink),
            "procedure" => Some(TargetType::Procedure),
            "foresight" => Some(TargetType::Foresight),
            _ => None,
        }
    }
}

/// One entry in the append-only differential log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryChange {
    /// Unique id (`mc-` prefix)
    pub id: String,
    /// Transition kind
    pub change_type: ChangeType,
    /// Entity class of the target
    pub target_type: TargetType,
    /// Id of the changed record
    pub target_id: String,
    /// Serialized prior state (JSON), if any
    pub previous_value: Option<String>,
    /// Serialized new state (JSON), if any
    pub new_value: Option<String>,
    /// Why the change happened
    pub reason: String,
    /// Episode that triggered the change, if any
    pub trigger_episode_id: Option<String>,
    /// Consolidation run that produced the change, if any
    pub consolidation_run_id: Option<String>,
    /// When the change was recorded
    pub created_at: DateTime<Utc>,
}

impl MemoryChange {
    pub fn new(
        change_type: ChangeType,
        target_type: TargetType,
        target_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: ids::new_id(ids::MEMORY_CHANGE),
            change_type,
            target_type,
            target_id: target_id.into(),
            previous_value: None,
            new_value: None,
            reason: reason.into(),
            trigger_episode_id: None,
            consolidation_run_id: None,
            created_at: ids::now(),
        }
    }

    pub fn with_values(
        mut self,
        previous: Option<String>,
        new: Option<String>,
    ) -> Self {
        self.previous_value = previous;
        self.new_value = new;
        self
    }

    pub fn with_run(mut self, run_id: Option<&str>) -> Self {
        self.consolidation_run_id = run_id.map(str::to_string);
        self
    }
}

// ============================================================================
// CONSOLIDATION RUNS
// ============================================================================

/// Lifecycle state of a sleep cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s {
            "completed" => RunStatus::Completed,
            "failed" => RunStatus::Failed,
            _ => RunStatus::Running,
        }
    }
}

/// Record of one consolidation (sleep) cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationRun {
    /// Unique id (`cr-` prefix)
    pub id: String,
    /// Window start (exclusive end of the previous run)
    pub processed_from: DateTime<Utc>,
    /// Window end
    pub processed_to: DateTime<Utc>,
    /// Sessions consumed
    pub sessions: i64,
    /// Episodes created
    pub episodes: i64,
    /// Facts created
    pub facts: i64,
    /// Causal links created
    pub causal_links: i64,
    /// Procedures created
    pub procedures: i64,
    /// Contradictions resolved
    pub contradictions_resolved: i64,
    /// Memories pruned (forgetting + limit enforcement)
    pub memories_pruned: i64,
    /// Wall-clock duration
    pub duration_ms: i64,
    /// Lifecycle state
    pub status: RunStatus,
    /// Error message when failed
    pub error: Option<String>,
    /// When the run started
    pub started_at: DateTime<Utc>,
}

impl ConsolidationRun {
    /// Open a new run covering `[from, to]`, status `running`
    pub fn open(processed_from: DateTime<Utc>, processed_to: DateTime<Utc>) -> Self {
        Self {
            id: ids::new_id(ids::CONSOLIDATION_RUN),
            processed_from,
            processed_to,
            sessions: 0,
            episodes: 0,
            facts: 0,
            causal_links: 0,
            procedures: 0,
            contradictions_resolved: 0,
            memories_pruned: 0,
            duration_ms: 0,
            status: RunStatus::Running,
            error: None,
            started_at: ids::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_type_round_trips() {
        for ct in [
            ChangeType::Strengthen,
            ChangeType::Weaken,
            ChangeType::Modify,
            ChangeType::Retract,
            ChangeType::Create,
        ] {
            assert_eq!(ChangeType::parse_name(ct.as_str()), Some(ct));
        }
        assert_eq!(ChangeType::parse_name("unknown"), None);
    }

    #[test]
    fn new_run_is_running_with_zero_counters() {
        let run = ConsolidationRun::open(ids::now(), ids::now());
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.facts, 0);
        assert!(run.id.starts_with("cr-"));
    }
}
