//! Causal Link - a directed cause → effect edge
//!
//! Both endpoints carry a verbatim description alongside the id so chains
//! can be walked by text even when an endpoint episode was deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;

/// Confidence above which a link is considered direct at creation time
pub const DIRECT_STRENGTH_THRESHOLD: f64 = 0.75;

/// What kind of record an endpoint refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CauseKind {
    /// A stored fact
    Fact,
    /// A stored episode
    #[default]
    Episode,
    /// A free-standing event only described in text
    Event,
}

impl CauseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CauseKind::Fact => "fact",
            CauseKind::Episode => "episode",
            CauseKind::Event => "event",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s {
            "fact" => CauseKind::Fact,
            "event" => CauseKind::Event,
            _ => CauseKind::Episode,
        }
    }
}

/// Strength classification derived from confidence at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CausalStrength {
    /// Confidence above [`DIRECT_STRENGTH_THRESHOLD`]
    Direct,
    /// Everything else
    Contributing,
}

impl CausalStrength {
    /// Classify a confidence value
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > DIRECT_STRENGTH_THRESHOLD {
            CausalStrength::Direct
        } else {
            CausalStrength::Contributing
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CausalStrength::Direct => "direct",
            CausalStrength::Contributing => "contributing",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s {
            "direct" => CausalStrength::Direct,
            _ => CausalStrength::Contributing,
        }
    }
}

/// A confidence-weighted directed edge cause → effect
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CausalLink {
    /// Unique id (`cl-` prefix)
    pub id: String,
    /// Kind of the cause endpoint
    pub cause_kind: CauseKind,
    /// Id of the cause record
    pub cause_id: String,
    /// Verbatim cause description
    pub cause_description: String,
    /// Kind of the effect endpoint
    pub effect_kind: CauseKind,
    /// Id of the effect record
    pub effect_id: String,
    /// Verbatim effect description
    pub effect_description: String,
    /// How the cause produced the effect
    pub mechanism: String,
    /// Belief confidence in [0,1]
    pub confidence: f64,
    /// Episode ids supporting this link
    pub evidence: Vec<String>,
    /// Elapsed time between cause and effect, free-form (e.g. "2 days")
    pub temporal_delay: Option<String>,
    /// Direct vs contributing, fixed at creation
    pub causal_strength: CausalStrength,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl CausalLink {
    /// Create a link; strength is derived from the confidence.
    ///
    /// A link may be self-referential on an episode (same cause/effect id)
    /// when both sides were extracted from the same text.
    pub fn new(
        cause_description: impl Into<String>,
        effect_description: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        Self {
            id: ids::new_id(ids::CAUSAL_LINK),
            cause_kind: CauseKind::Episode,
            cause_id: String::new(),
            cause_description: cause_description.into(),
            effect_kind: CauseKind::Episode,
            effect_id: String::new(),
            effect_description: effect_description.into(),
            mechanism: String::new(),
            confidence,
            evidence: Vec::new(),
            temporal_delay: None,
            causal_strength: CausalStrength::from_confidence(confidence),
            created_at: ids::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_follows_confidence_at_creation() {
        assert_eq!(
            CausalLink::new("a", "b", 0.8).causal_strength,
            CausalStrength::Direct
        );
        assert_eq!(
            CausalLink::new("a", "b", 0.75).causal_strength,
            CausalStrength::Contributing
        );
    }

    #[test]
    fn kind_round_trips() {
        for kind in [CauseKind::Fact, CauseKind::Episode, CauseKind::Event] {
            assert_eq!(CauseKind::parse_name(kind.as_str()), kind);
        }
    }
}
