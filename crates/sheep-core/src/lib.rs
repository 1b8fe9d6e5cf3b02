//! # Sheep Core
//!
//! Per-agent cognitive memory engine for conversational assistants:
//!
//! - **Storage**: one SQLite file per agent with FTS5 keyword retrieval,
//!   an append-only change log, point-in-time belief reconstruction, and
//!   size limits with retention-ordered pruning
//! - **Consolidation**: a periodic "sleep" cycle that distills raw
//!   sessions into episodes, subject-predicate-object facts, causal
//!   links, procedures, foresights, and a user profile, with
//!   contradiction resolution along the way
//! - **LLM sleep**: pattern discovery, fact consolidation, connection
//!   discovery, and forgetting recommendations over a memory snapshot
//! - **Forgetting**: composite retention scoring with active forgetting
//! - **Scheduler**: idle- and cron-triggered sleep cycles, one in flight
//!   per agent
//! - **Recall**: question classification, cached multi-hop retrieval, a
//!   deterministic adversarial-question filter, calibrated synthesis
//!
//! The concrete language-model and embedding providers stay outside the
//! crate; [`llm::LanguageModel`] and [`llm::EmbeddingProvider`] are the
//! seams they plug into.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use sheep_core::prelude::*;
//!
//! let store = Arc::new(MemoryStore::open("my-agent")?);
//! let pipeline = ConsolidationPipeline::new(store.clone(), None, PipelineConfig::default());
//! let report = pipeline.run(&sessions).await?;
//!
//! let engine = RecallEngine::new(store, None);
//! let outcome = engine.recall("What is my name?", "s1", RecallMode::Memory, None).await;
//! ```

pub mod consolidation;
pub mod extract;
pub mod forgetting;
pub mod ids;
pub mod llm;
pub mod memory;
pub mod recall;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod text;
pub mod tools;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Entities
pub use memory::{
    CausalLink, CausalStrength, CauseKind, ChangeType, ConsolidationRun, CoreMemory, Episode,
    EpisodeTtl, Fact, Foresight, MemoryChange, Preference, Procedure, Relationship, RunStatus,
    Sentiment, TargetType, UserProfile,
};

// Storage
pub use storage::{
    BeliefEvent, BeliefEventKind, FactFilter, MemoryLimits, MemoryStore, PruneReport, StoreError,
    StoreStats,
};

// Sessions
pub use session::{RawMessage, SessionBatch};

// Language-model capability
pub use llm::{
    CompleteOptions, EmbeddingProvider, LanguageModel, LlmError, ModelHandle, ScriptedModel,
};

// Consolidation
pub use consolidation::{
    ConsolidationPipeline, PipelineConfig, PipelineError, RunReport, SleepConfig, SleepOutcome,
};

// Scheduler
pub use scheduler::{SchedulerConfig, SchedulerError, SchedulerStatus, SleepRunner, SleepScheduler};

// Recall
pub use recall::{QuestionType, RecallEngine, RecallMode, RecallOutcome, NO_INFORMATION};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        ConsolidationPipeline, Episode, Fact, LanguageModel, MemoryLimits, MemoryStore,
        PipelineConfig, RawMessage, RecallEngine, RecallMode, SchedulerConfig, SessionBatch,
        SleepScheduler, StoreError,
    };
}
