//! Memory Entities
//!
//! The typed records the store persists: episodes ("what happened"),
//! facts (subject-predicate-object beliefs), causal links, procedures,
//! the append-only change log, consolidation run records, and the
//! per-user secondary entities (profile, preferences, relationships,
//! core memories, foresights).

mod causal;
mod change;
mod episode;
mod fact;
mod procedure;
mod profile;

pub use causal::{CausalLink, CausalStrength, CauseKind};
pub use change::{ChangeType, ConsolidationRun, MemoryChange, RunStatus, TargetType};
pub use episode::{Episode, EpisodeTtl};
pub use fact::{
    normalize_predicate, Fact, PREFERENCE_PREDICATES, UNIQUE_PREDICATES, USER_EXPLICIT_EVIDENCE,
};
pub use procedure::Procedure;
pub use profile::{CoreMemory, Foresight, Preference, Relationship, Sentiment, UserProfile};
