//! Scripted Model
//!
//! Deterministic [`LanguageModel`] for tests and the degraded fallback
//! path: replies and errors are queued and handed back in order. When the
//! queue runs dry it answers with an empty JSON array, which every
//! tolerant extractor treats as "nothing found".

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CompleteOptions, LanguageModel, LlmError};

enum Scripted {
    Reply(String),
    Error(LlmError),
}

/// Queue-backed model
#[derive(Default)]
pub struct ScriptedModel {
    queue: Mutex<VecDeque<Scripted>>,
    call_count: AtomicUsize,
    offline: AtomicBool,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a canned reply
    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(Scripted::Reply(reply.into()));
        }
    }

    /// Queue a failure
    pub fn push_error(&self, error: LlmError) {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(Scripted::Error(error));
        }
    }

    /// How many completions were requested so far
    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Simulate an unreachable provider: health checks and completions fail
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, _prompt: &str, _opts: &CompleteOptions) -> Result<String, LlmError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LlmError::Unavailable("scripted model offline".to_string()));
        }
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let next = self
            .queue
            .lock()
            .map_err(|_| LlmError::Other("script queue lock poisoned".to_string()))?
            .pop_front();
        match next {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Error(err)) => Err(err),
            None => Ok("[]".to_string()),
        }
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LlmError::Unavailable("scripted model offline".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_come_back_in_order() {
        let model = ScriptedModel::new();
        model.push_reply("first");
        model.push_error(LlmError::RateLimited("busy".into()));
        model.push_reply("second");

        let opts = CompleteOptions::default();
        assert_eq!(model.complete("p", &opts).await.unwrap(), "first");
        assert!(model.complete("p", &opts).await.is_err());
        assert_eq!(model.complete("p", &opts).await.unwrap(), "second");
        assert_eq!(model.complete("p", &opts).await.unwrap(), "[]");
        assert_eq!(model.calls(), 4);
    }
}
