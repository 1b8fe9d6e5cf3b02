//! Prefixed Identifiers & Time Helpers
//!
//! Every entity carries a globally-unique id of the form `<prefix>-<uuid>`.
//! The prefix makes ids self-describing in logs and change records.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Episode id prefix
pub const EPISODE: &str = "ep";
/// Fact id prefix
pub const FACT: &str = "fact";
/// Causal link id prefix
pub const CAUSAL_LINK: &str = "cl";
/// Procedure id prefix
pub const PROCEDURE: &str = "proc";
/// Memory change id prefix
pub const MEMORY_CHANGE: &str = "mc";
/// Consolidation run id prefix
pub const CONSOLIDATION_RUN: &str = "cr";
/// Foresight id prefix
pub const FORESIGHT: &str = "fs";
/// Preference id prefix
pub const PREFERENCE: &str = "pref";
/// Relationship id prefix
pub const RELATIONSHIP: &str = "rel";
/// Core memory id prefix
pub const CORE_MEMORY: &str = "cm";
/// User profile id prefix
pub const PROFILE: &str = "prof";

/// Generate a new prefixed id, e.g. `fact-6a1f...`
pub fn new_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

/// Current wall-clock time, UTC
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Serialize a timestamp the way the storage layer stores it (RFC 3339, UTC)
pub fn to_rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp back into `DateTime<Utc>`
pub fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Check whether an id carries the given prefix
pub fn has_prefix(id: &str, prefix: &str) -> bool {
    id.starts_with(prefix) && id.as_bytes().get(prefix.len()) == Some(&b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_prefix_and_are_unique() {
        let a = new_id(FACT);
        let b = new_id(FACT);
        assert!(a.starts_with("fact-"));
        assert_ne!(a, b);
        assert!(has_prefix(&a, FACT));
        assert!(!has_prefix(&a, EPISODE));
    }

    #[test]
    fn prefix_check_requires_separator() {
        assert!(!has_prefix("factoid-123", FACT));
        assert!(has_prefix("fact-123", FACT));
    }

    #[test]
    fn timestamps_round_trip() {
        let t = now();
        let s = to_rfc3339(t);
        let back = parse_rfc3339(&s).unwrap();
        assert!((t - back).num_milliseconds().abs() < 2);
    }
}
