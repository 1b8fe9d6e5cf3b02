//! Fact Extraction
//!
//! Pattern family: first-person and third-person cue rules with
//! conservative confidence, used whenever the language model is
//! unavailable. LLM family: a JSON-envelope prompt decoded tolerantly.
//! Both emit [`FactCandidate`] records that the pipeline turns into
//! stored facts.

use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use crate::llm::{complete_bounded, json, CompleteOptions, LanguageModel, LlmError};
use crate::memory::normalize_predicate;

use super::{ExtractOptions, ExtractionMode};

/// Predicates that pass the primary-biographical filter
const BIOGRAPHICAL_PREDICATES: &[&str] = &[
    "works_at",
    "lives_in",
    "name_is",
    "age_is",
    "born_in",
    "married_to",
    "studied_at",
    "has_child",
    "has_sibling",
];

/// A fact candidate: no identity or timestamp fields yet
#[derive(Debug, Clone)]
pub struct FactCandidate {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub confidence: f64,
    pub evidence: Vec<String>,
}

impl FactCandidate {
    fn new(
        subject: impl Into<String>,
        predicate: &str,
        object: impl Into<String>,
        confidence: f64,
        episode_id: &str,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: normalize_predicate(predicate),
            object: clean_object(object.into()),
            confidence: confidence.clamp(0.0, 1.0),
            evidence: vec![episode_id.to_string()],
        }
    }

    fn is_biographical(&self) -> bool {
        BIOGRAPHICAL_PREDICATES.contains(&self.predicate.as_str())
    }
}

fn clean_object(object: String) -> String {
    object
        .trim()
        .trim_end_matches(['.', ',', '!', '?', ';'])
        .trim()
        .to_string()
}

// ============================================================================
// PATTERN FAMILY
// ============================================================================

struct CueRule {
    regex: &'static LazyLock<Regex>,
    predicate: &'static str,
    confidence: f64,
}

macro_rules! cue {
    ($name:ident, $pattern:expr) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($pattern).expect("static regex"));
    };
}

// Case-insensitivity is scoped to the cue; captures stay case-sensitive
// so capitalized proper nouns bound the match.
cue!(NAME_IS, r"(?i:\bmy name is)\s+([A-Z][\w'-]*(?:\s+[A-Z][\w'-]*){0,3})");
cue!(CALLED, r"(?i:\bi(?:'m| am) called)\s+([A-Z][\w'-]*(?:\s+[A-Z][\w'-]*){0,3})");
cue!(WORKS_AT, r"(?i:\bi work (?:at|for))\s+([A-Z][\w&.'-]*(?:\s+[A-Z][\w&.'-]*){0,3})");
cue!(LIVES_IN, r"(?i:\bi live in)\s+([A-Z][\w'-]*(?:\s+[A-Z][\w'-]*){0,3})");
cue!(BORN_IN, r"(?i:\bi was born in)\s+([A-Z][\w'-]*(?:\s+[A-Z][\w'-]*){0,3})");
cue!(AGE_IS, r"(?i)\bi(?:'m| am)\s+(\d{1,3}) years old\b");
cue!(FAVORITE_COLOR, r"(?i)\bmy favou?rite colou?r is\s+(\w+)");
cue!(
    MARRIED_TO,
    r"([A-Z][\w'-]+)(?i: is my (?:wife|husband|spouse|partner))\b"
);
cue!(
    LIKES,
    r"(?i)\bi (?:really )?(like|love|enjoy|hate|dislike|prefer)\s+([\w\s'-]{2,40}?)(?:[.,!?;]|$)"
);
cue!(
    THIRD_WORKS_AT,
    r"([A-Z][\w'-]+) works (?:at|for)\s+([A-Z][\w&.'-]*(?:\s+[A-Z][\w&.'-]*){0,3})"
);
cue!(
    THIRD_LIVES_IN,
    r"([A-Z][\w'-]+) lives in\s+([A-Z][\w'-]*(?:\s+[A-Z][\w'-]*){0,3})"
);
cue!(
    THIRD_LIKES,
    r"([A-Z][\w'-]+) (likes|loves|hates|dislikes)\s+([\w\s'-]{2,40}?)(?:[.,!?;]|$)"
);

/// First-person rules: the captured group is the object
static FIRST_PERSON_RULES: &[CueRule] = &[
    CueRule { regex: &NAME_IS, predicate: "name_is", confidence: 0.92 },
    CueRule { regex: &CALLED, predicate: "name_is", confidence: 0.85 },
    CueRule { regex: &WORKS_AT, predicate: "works_at", confidence: 0.88 },
    CueRule { regex: &LIVES_IN, predicate: "lives_in", confidence: 0.88 },
    CueRule { regex: &BORN_IN, predicate: "born_in", confidence: 0.85 },
    CueRule { regex: &AGE_IS, predicate: "age_is", confidence: 0.85 },
    CueRule { regex: &FAVORITE_COLOR, predicate: "favorite_color", confidence: 0.8 },
];

fn verb_to_predicate(verb: &str) -> &'static str {
    match verb.to_lowercase().as_str() {
        "love" | "loves" => "loves",
        "hate" | "hates" => "hates",
        "dislike" | "dislikes" => "dislikes",
        "prefer" | "prefers" => "prefers",
        _ => "likes",
    }
}

/// Extract fact candidates with the deterministic rules.
///
/// The canonical speaker is always labelled `user`; third-person rules
/// capture the named subject verbatim.
pub fn extract_with_patterns(
    text: &str,
    episode_id: &str,
    opts: &ExtractOptions,
) -> Vec<FactCandidate> {
    let mut candidates = Vec::new();

    for rule in FIRST_PERSON_RULES {
        for caps in rule.regex.captures_iter(text) {
            candidates.push(FactCandidate::new(
                "user",
                rule.predicate,
                &caps[1],
                rule.confidence,
                episode_id,
            ));
        }
    }

    for caps in MARRIED_TO.captures_iter(text) {
        candidates.push(FactCandidate::new(
            "user",
            "married_to",
            &caps[1],
            0.85,
            episode_id,
        ));
    }

    for caps in LIKES.captures_iter(text) {
        candidates.push(FactCandidate::new(
            "user",
            verb_to_predicate(&caps[1]),
            &caps[2],
            0.7,
            episode_id,
        ));
    }

    for caps in THIRD_WORKS_AT.captures_iter(text) {
        candidates.push(FactCandidate::new(
            &caps[1],
            "works_at",
            &caps[2],
            0.75,
            episode_id,
        ));
    }
    for caps in THIRD_LIVES_IN.captures_iter(text) {
        candidates.push(FactCandidate::new(
            &caps[1],
            "lives_in",
            &caps[2],
            0.75,
            episode_id,
        ));
    }
    for caps in THIRD_LIKES.captures_iter(text) {
        candidates.push(FactCandidate::new(
            &caps[1],
            verb_to_predicate(&caps[2]),
            &caps[3],
            0.65,
            episode_id,
        ));
    }

    finish(candidates, opts)
}

// ============================================================================
// LLM FAMILY
// ============================================================================

/// Wire shape of one extracted fact in the JSON envelope
#[derive(Debug, Deserialize)]
struct RawFact {
    subject: String,
    predicate: String,
    object: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.6
}

fn build_prompt(text: &str, session_date: Option<&str>, opts: &ExtractOptions) -> String {
    let date_line = session_date
        .map(|d| format!("The conversation took place on {d}.\n"))
        .unwrap_or_default();
    let mode_line = match opts.mode {
        ExtractionMode::General => "",
        ExtractionMode::PrimaryBiographical => {
            "Only extract durable biographical facts (name, employer, home, family).\n"
        }
    };
    format!(
        "Extract factual statements about people from this conversation as \
subject-predicate-object triples.\n{date_line}{mode_line}\
Rules:\n\
- subject: the person the fact is about; use \"user\" for the human speaker\n\
- predicate: snake_case verb phrase, e.g. works_at, lives_in, likes, name_is\n\
- object: the value, verbatim, no trailing punctuation\n\
- confidence: 0.0-1.0, how certain the conversation makes the fact\n\
Respond with ONLY a JSON array:\n\
[{{\"subject\": \"user\", \"predicate\": \"works_at\", \"object\": \"TechCorp\", \"confidence\": 0.9}}]\n\n\
Conversation:\n{text}"
    )
}

/// Extract fact candidates with the language model
pub async fn extract_with_model(
    model: &dyn LanguageModel,
    text: &str,
    episode_id: &str,
    session_date: Option<&str>,
    opts: &ExtractOptions,
) -> Result<Vec<FactCandidate>, LlmError> {
    let prompt = build_prompt(text, session_date, opts);
    let reply = complete_bounded(model, &prompt, &CompleteOptions::json(800)).await?;

    let raw: Vec<RawFact> = json::decode_list(&reply);
    let candidates = raw
        .into_iter()
        .filter(|r| !r.subject.trim().is_empty() && !r.object.trim().is_empty())
        .map(|r| {
            FactCandidate::new(
                r.subject.trim(),
                &r.predicate,
                r.object,
                r.confidence,
                episode_id,
            )
        })
        .collect();
    Ok(finish(candidates, opts))
}

// ============================================================================
// SHARED POST-PROCESSING
// ============================================================================

/// Threshold filter, mode filter, dedupe, cap
fn finish(candidates: Vec<FactCandidate>, opts: &ExtractOptions) -> Vec<FactCandidate> {
    let threshold = opts.threshold();
    let filtered = candidates
        .into_iter()
        .filter(|c| c.confidence >= threshold)
        .filter(|c| opts.mode != ExtractionMode::PrimaryBiographical || c.is_biographical())
        .collect();
    let mut deduped = dedupe(filtered);
    opts.cap(&mut deduped);
    deduped
}

/// Collapse exact SPO duplicates and same-subject-predicate object
/// containment, keeping the higher-confidence instance.
pub fn dedupe(candidates: Vec<FactCandidate>) -> Vec<FactCandidate> {
    let mut kept: Vec<FactCandidate> = Vec::new();
    for candidate in candidates {
        let mut absorbed = false;
        for existing in kept.iter_mut() {
            let same_sp = existing.subject.eq_ignore_ascii_case(&candidate.subject)
                && existing.predicate == candidate.predicate;
            if !same_sp {
                continue;
            }
            let a = existing.object.to_lowercase();
            let b = candidate.object.to_lowercase();
            if a == b || a.contains(&b) || b.contains(&a) {
                if candidate.confidence > existing.confidence {
                    existing.object = candidate.object.clone();
                    existing.confidence = candidate.confidence;
                }
                for ev in &candidate.evidence {
                    if !existing.evidence.contains(ev) {
                        existing.evidence.push(ev.clone());
                    }
                }
                absorbed = true;
                break;
            }
        }
        if !absorbed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;

    fn opts() -> ExtractOptions {
        ExtractOptions::default()
    }

    #[test]
    fn first_person_cues_extract() {
        let text = "My name is Alex Chen. I work at TechCorp and I live in Seattle.";
        let facts = extract_with_patterns(text, "ep-1", &opts());

        let find = |p: &str| facts.iter().find(|f| f.predicate == p).unwrap();
        assert_eq!(find("name_is").object, "Alex Chen");
        assert_eq!(find("works_at").object, "TechCorp");
        assert_eq!(find("lives_in").object, "Seattle");
        assert!(facts.iter().all(|f| f.subject == "user"));
        assert!(facts.iter().all(|f| f.evidence == vec!["ep-1".to_string()]));
    }

    #[test]
    fn preference_cues_extract_with_polarity() {
        let facts = extract_with_patterns("I really love hiking. I hate mondays.", "ep-1", &opts());
        assert!(facts
            .iter()
            .any(|f| f.predicate == "loves" && f.object == "hiking"));
        assert!(facts
            .iter()
            .any(|f| f.predicate == "hates" && f.object == "mondays"));
    }

    #[test]
    fn third_person_cues_extract() {
        let facts = extract_with_patterns("Melanie likes painting.", "ep-1", &opts());
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].subject, "Melanie");
        assert_eq!(facts[0].predicate, "likes");
        assert_eq!(facts[0].object, "painting");
    }

    #[test]
    fn biographical_mode_drops_preferences() {
        let text = "My name is Alex Chen. I really love hiking.";
        let opts = ExtractOptions {
            mode: ExtractionMode::PrimaryBiographical,
            ..Default::default()
        };
        let facts = extract_with_patterns(text, "ep-1", &opts);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].predicate, "name_is");
    }

    #[test]
    fn dedupe_keeps_higher_confidence_and_merges_evidence() {
        let a = FactCandidate::new("user", "works_at", "TechCorp", 0.7, "ep-1");
        let b = FactCandidate::new("user", "works_at", "TechCorp Inc", 0.9, "ep-2");
        let merged = dedupe(vec![a, b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].object, "TechCorp Inc");
        assert!((merged[0].confidence - 0.9).abs() < f64::EPSILON);
        assert_eq!(merged[0].evidence.len(), 2);
    }

    #[tokio::test]
    async fn model_extraction_decodes_the_envelope() {
        let model = ScriptedModel::new();
        model.push_reply(
            r#"```json
[
  {"subject": "user", "predicate": "Works At", "object": "TechCorp.", "confidence": 0.9},
  {"subject": "user", "predicate": "likes", "object": "espresso", "confidence": 0.4}
]
```"#,
        );
        let facts = extract_with_model(&model, "transcript", "ep-9", Some("9 June 2023"), &opts())
            .await
            .unwrap();
        // The 0.4 item falls below the 0.60 general floor
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].predicate, "works_at");
        assert_eq!(facts[0].object, "TechCorp");
        assert_eq!(facts[0].evidence, vec!["ep-9".to_string()]);
    }

    #[tokio::test]
    async fn model_garbage_yields_empty_set() {
        let model = ScriptedModel::new();
        model.push_reply("I couldn't find any facts, sorry!");
        let facts = extract_with_model(&model, "t", "ep-1", None, &opts())
            .await
            .unwrap();
        assert!(facts.is_empty());
    }
}
