//! Shared Application State
//!
//! One store/pipeline/engine per process (single-agent service), plus the
//! in-memory session buffer the consolidate endpoint drains its window
//! from. The buffer survives consolidation — the pipeline's window
//! computation keeps reruns idempotent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use sheep_core::consolidation::{PipelineError, RunReport};
use sheep_core::{
    ConsolidationPipeline, MemoryStore, RawMessage, RecallEngine, SessionBatch, SleepRunner,
    SleepScheduler,
};

/// Buffered messages per session
#[derive(Default)]
pub struct SessionBuffers {
    inner: Mutex<HashMap<String, Vec<RawMessage>>>,
}

impl SessionBuffers {
    /// Append a message to a session's buffer
    pub fn push(&self, session_id: &str, message: RawMessage) {
        if let Ok(mut map) = self.inner.lock() {
            map.entry(session_id.to_string()).or_default().push(message);
        }
    }

    /// Messages for one session, in arrival order
    pub fn messages(&self, session_id: &str) -> Vec<RawMessage> {
        self.inner
            .lock()
            .map(|map| map.get(session_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Snapshot of all sessions as consolidation batches, oldest session
    /// first. `dates` overrides a session's conversation date; keys match
    /// the session id exactly or its trailing number ("1" matches "s1").
    pub fn batches(
        &self,
        only_session: Option<&str>,
        dates: &HashMap<String, DateTime<Utc>>,
    ) -> Vec<SessionBatch> {
        let Ok(map) = self.inner.lock() else {
            return Vec::new();
        };
        let mut batches: Vec<SessionBatch> = map
            .iter()
            .filter(|(id, _)| only_session.is_none_or(|only| only == id.as_str()))
            .map(|(id, messages)| {
                let mut batch = SessionBatch::new(id.clone(), messages.clone());
                batch.date = dates
                    .get(id)
                    .or_else(|| {
                        dates
                            .iter()
                            .find(|(key, _)| id.ends_with(key.as_str()))
                            .map(|(_, date)| date)
                    })
                    .copied();
                batch
            })
            .collect();
        batches.sort_by_key(|b| b.conversation_date());
        batches
    }

    /// Number of buffered sessions
    pub fn session_count(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or(0)
    }
}

/// Scope for the next explicit consolidate request
#[derive(Debug, Default)]
pub struct PendingWindow {
    pub only_session: Option<String>,
    pub dates: HashMap<String, DateTime<Utc>>,
}

/// Runs the pipeline over the session buffer; the scheduler's timer
/// paths and the consolidate endpoint share this. An explicit request
/// stages its session filter and date overrides here before triggering.
pub struct BufferedRunner {
    pipeline: Arc<ConsolidationPipeline>,
    buffers: Arc<SessionBuffers>,
    pending: Mutex<Option<PendingWindow>>,
}

impl BufferedRunner {
    pub fn new(pipeline: Arc<ConsolidationPipeline>, buffers: Arc<SessionBuffers>) -> Self {
        Self {
            pipeline,
            buffers,
            pending: Mutex::new(None),
        }
    }

    /// Stage the scope for the next run
    pub fn set_pending(&self, window: PendingWindow) {
        if let Ok(mut slot) = self.pending.lock() {
            *slot = Some(window);
        }
    }
}

#[async_trait]
impl SleepRunner for BufferedRunner {
    async fn consolidate(&self, _agent_id: &str) -> Result<RunReport, PipelineError> {
        let window = self
            .pending
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .unwrap_or_default();
        let batches = self
            .buffers
            .batches(window.only_session.as_deref(), &window.dates);
        self.pipeline.run(&batches).await
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub agent_id: String,
    pub store: Arc<MemoryStore>,
    pub engine: Arc<RecallEngine>,
    pub scheduler: SleepScheduler,
    pub runner: Arc<BufferedRunner>,
    pub buffers: Arc<SessionBuffers>,
    pub llm_configured: bool,
}
