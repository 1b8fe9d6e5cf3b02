//! Language-Model Capability
//!
//! The concrete provider lives outside the core; this module defines the
//! completion trait the core consumes, the error classes it distinguishes,
//! and bounded-backoff retry helpers. A scripted in-crate model backs
//! tests and the degraded fallback mode.

pub mod json;
mod mock;

pub use mock::ScriptedModel;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Ceiling for a single extraction completion call
pub const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Options for a completion request
#[derive(Debug, Clone)]
pub struct CompleteOptions {
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f64,
    /// Optional system prompt
    pub system: Option<String>,
    /// Ask the provider for a JSON-only response
    pub json_mode: bool,
}

impl Default for CompleteOptions {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.0,
            system: None,
            json_mode: false,
        }
    }
}

impl CompleteOptions {
    /// JSON-mode options with a token budget
    pub fn json(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            json_mode: true,
            ..Default::default()
        }
    }
}

/// Error classes the core distinguishes
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    /// 429-class; retry with backoff
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// 400-class or missing key; never retry, degrade instead
    #[error("provider configuration rejected the request: {0}")]
    BadRequest(String),
    /// The call exceeded its deadline
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),
    /// No provider is configured or reachable
    #[error("language model unavailable: {0}")]
    Unavailable(String),
    /// The reply could not be decoded
    #[error("could not parse model output: {0}")]
    Parse(String),
    /// Anything else; retry up to the attempt cap
    #[error("completion failed: {0}")]
    Other(String),
}

impl LlmError {
    /// Whether a retry could possibly help
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LlmError::BadRequest(_) | LlmError::Parse(_))
    }
}

/// The abstract completion capability
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Produce a completion for the prompt
    async fn complete(&self, prompt: &str, opts: &CompleteOptions) -> Result<String, LlmError>;

    /// Cheap availability probe used at pipeline bootstrap
    async fn health_check(&self) -> Result<(), LlmError> {
        Ok(())
    }

    /// Short provider label for health reporting
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Shared handle to a language model
pub type ModelHandle = Arc<dyn LanguageModel>;

/// Optional embedding capability. When present, the consolidation
/// pipeline dedupes near-identical fact objects by cosine similarity;
/// when absent it falls back to SPO-equality and containment checks.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a string into a dense vector
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

/// Shared handle to an embedding provider
pub type EmbedderHandle = Arc<dyn EmbeddingProvider>;

/// Cosine similarity between two vectors; 0.0 when shapes mismatch
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// One completion bounded by the extraction ceiling, no retries.
/// Extractors use this so a hung provider can never stall a
/// consolidation stage past its deadline.
pub async fn complete_bounded(
    model: &dyn LanguageModel,
    prompt: &str,
    opts: &CompleteOptions,
) -> Result<String, LlmError> {
    match tokio::time::timeout(EXTRACTION_TIMEOUT, model.complete(prompt, opts)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(EXTRACTION_TIMEOUT)),
    }
}

/// Run `complete` with bounded retries.
///
/// `delays` gives the sleep before each retry (so attempts = delays + 1).
/// Bad-request and parse errors short-circuit: retrying a rejected
/// request cannot succeed.
pub async fn complete_with_retries(
    model: &dyn LanguageModel,
    prompt: &str,
    opts: &CompleteOptions,
    delays: &[Duration],
) -> Result<String, LlmError> {
    let mut last_err = None;
    for (attempt, delay) in std::iter::once(&Duration::ZERO).chain(delays.iter()).enumerate() {
        if !delay.is_zero() {
            tokio::time::sleep(*delay).await;
        }
        match tokio::time::timeout(EXTRACTION_TIMEOUT, model.complete(prompt, opts)).await {
            Ok(Ok(reply)) => return Ok(reply),
            Ok(Err(err)) => {
                if !err.is_retryable() {
                    return Err(err);
                }
                tracing::warn!(attempt, error = %err, "completion attempt failed");
                last_err = Some(err);
            }
            Err(_) => {
                tracing::warn!(attempt, "completion attempt timed out");
                last_err = Some(LlmError::Timeout(EXTRACTION_TIMEOUT));
            }
        }
    }
    Err(last_err.unwrap_or_else(|| LlmError::Unavailable("no attempts made".to_string())))
}

/// Exponential backoff schedule: `initial * 2^n`, capped, `attempts` long
pub fn backoff_schedule(initial: Duration, cap: Duration, attempts: usize) -> Vec<Duration> {
    let mut delays = Vec::with_capacity(attempts);
    let mut current = initial;
    for _ in 0..attempts {
        delays.push(current.min(cap));
        current = current.saturating_mul(2);
    }
    delays
}
