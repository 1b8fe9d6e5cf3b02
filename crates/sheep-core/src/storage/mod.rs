//! Storage Engine
//!
//! One SQLite file per agent. The store exposes typed operations per
//! entity, an append-only change log, point-in-time fact reconstruction,
//! ranked keyword retrieval over facts, and size-limit enforcement with
//! retention-ordered pruning.

mod keyword;
mod limits;
pub mod migrations;
mod sqlite;
mod timeline;

pub use keyword::sanitize_fts_query;
pub use limits::{MemoryLimits, PruneReport};
pub use sqlite::{FactFilter, MemoryStore, StoreStats};
pub use timeline::{BeliefEvent, BeliefEventKind};

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying database error
    #[error("Database error: {0}")]
    Database(rusqlite::Error),
    /// Unique-constraint violation; the dedupe layer above treats this as
    /// a no-op unless a merge is intended
    #[error("Duplicate record: {0}")]
    Duplicate(String),
    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),
    /// The persistence layer reported corruption; the handle declines all
    /// further writes
    #[error("Store poisoned by corruption: {0}")]
    Poisoned(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
    /// Serialization error for JSON-encoded columns
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StoreError>;
