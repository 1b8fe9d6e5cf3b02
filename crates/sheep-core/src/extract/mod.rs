//! Extraction Primitives
//!
//! Two parallel families per target: deterministic pattern extractors
//! (regex cue rules, conservative confidence, always available) and LLM
//! extractors (domain prompt, strict JSON envelope, tolerant decoding).
//! Candidates carry confidence and evidence but no identity or timestamp
//! fields; the pipeline assigns those at insert time.

pub mod causal;
pub mod episodes;
pub mod facts;
pub mod foresight;
pub mod procedures;
pub mod temporal;

pub use causal::CausalCandidate;
pub use episodes::EpisodeDraft;
pub use facts::FactCandidate;
pub use foresight::ForesightCandidate;
pub use procedures::ProcedureCandidate;

/// Which confidence floor applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionMode {
    /// Everyday extraction
    #[default]
    General,
    /// Only high-confidence biographical facts pass
    PrimaryBiographical,
}

impl ExtractionMode {
    /// Per-mode minimum confidence
    pub fn min_confidence(&self) -> f64 {
        match self {
            ExtractionMode::General => 0.60,
            ExtractionMode::PrimaryBiographical => 0.85,
        }
    }
}

/// Options shared by all extractors
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Override the mode's confidence floor
    pub min_confidence: Option<f64>,
    /// Cap on candidates returned (0 = unlimited)
    pub max_items: usize,
    /// Extraction mode
    pub mode: ExtractionMode,
}

impl ExtractOptions {
    /// The effective confidence floor
    pub fn threshold(&self) -> f64 {
        self.min_confidence.unwrap_or(self.mode.min_confidence())
    }

    /// Apply the `max_items` cap in place
    pub fn cap<T>(&self, items: &mut Vec<T>) {
        if self.max_items > 0 && items.len() > self.max_items {
            items.truncate(self.max_items);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_thresholds() {
        assert!((ExtractionMode::General.min_confidence() - 0.60).abs() < f64::EPSILON);
        assert!(
            (ExtractionMode::PrimaryBiographical.min_confidence() - 0.85).abs() < f64::EPSILON
        );
    }

    #[test]
    fn explicit_floor_overrides_mode() {
        let opts = ExtractOptions {
            min_confidence: Some(0.3),
            mode: ExtractionMode::PrimaryBiographical,
            ..Default::default()
        };
        assert!((opts.threshold() - 0.3).abs() < f64::EPSILON);
    }
}
