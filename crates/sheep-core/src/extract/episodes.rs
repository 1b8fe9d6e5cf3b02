//! Episode Segmentation & Summarization
//!
//! Splits a session's messages into episode drafts on long time gaps and
//! topic-shift cues, then summarizes each segment: one LLM sentence when
//! a model is available, otherwise the first substantial user sentence.
//! Salience comes from a small emotion-cue lexicon.

use chrono::{DateTime, Utc};

use crate::llm::{complete_bounded, CompleteOptions, LanguageModel, LlmError};
use crate::memory::EpisodeTtl;
use crate::session::{RawMessage, SessionBatch};
use crate::text;

/// A new segment starts after this much silence
const SEGMENT_GAP_MINUTES: i64 = 30;

/// Keywords kept per episode
const MAX_KEYWORDS: usize = 8;

/// Emotion cues that raise salience
const EMOTION_CUES: &[&str] = &[
    "love", "hate", "excited", "thrilled", "worried", "anxious", "scared", "angry", "furious",
    "sad", "depressed", "happy", "amazing", "terrible", "awful", "wonderful", "devastated",
    "proud", "ashamed", "stressed",
];

/// Phrases that open a new topic mid-session
const TOPIC_SHIFT_CUES: &[&str] = &[
    "by the way",
    "changing topics",
    "on another note",
    "speaking of",
    "unrelated, but",
];

/// An episode before identity and timestamps are assigned
#[derive(Debug, Clone)]
pub struct EpisodeDraft {
    pub summary: String,
    pub participants: Vec<String>,
    pub topic: String,
    pub keywords: Vec<String>,
    pub emotional_salience: f64,
    pub utility_score: f64,
    pub message_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub ttl: EpisodeTtl,
    /// Concatenated segment text, kept for downstream extractors
    pub transcript: String,
}

fn starts_new_topic(content: &str) -> bool {
    let lower = content.to_lowercase();
    TOPIC_SHIFT_CUES.iter().any(|cue| lower.starts_with(cue))
}

/// Split a session into message segments
fn segment(messages: &[RawMessage]) -> Vec<Vec<(usize, &RawMessage)>> {
    let mut segments: Vec<Vec<(usize, &RawMessage)>> = Vec::new();
    for (idx, message) in messages.iter().enumerate() {
        let split = match segments.last().and_then(|s| s.last()) {
            Some((_, prev)) => {
                let gap = message.timestamp - prev.timestamp;
                gap.num_minutes() >= SEGMENT_GAP_MINUTES || starts_new_topic(&message.content)
            }
            None => true,
        };
        if split {
            segments.push(Vec::new());
        }
        if let Some(current) = segments.last_mut() {
            current.push((idx, message));
        }
    }
    segments
}

fn salience_of(text_block: &str) -> f64 {
    let lower = text_block.to_lowercase();
    let hits = EMOTION_CUES
        .iter()
        .filter(|cue| lower.contains(*cue))
        .count();
    (hits as f64 * 0.25).min(1.0)
}

fn fallback_summary(segment_messages: &[(usize, &RawMessage)]) -> String {
    let first_user = segment_messages
        .iter()
        .find(|(_, m)| m.role == "user")
        .or_else(|| segment_messages.first());
    let Some((_, message)) = first_user else {
        return String::from("(empty segment)");
    };
    let sentence = message
        .content
        .split(['.', '!', '?'])
        .map(str::trim)
        .find(|s| s.len() >= 8)
        .unwrap_or_else(|| message.content.trim());
    let mut summary: String = sentence.chars().take(140).collect();
    if summary.is_empty() {
        summary = String::from("(empty segment)");
    }
    summary
}

fn ttl_for(salience: f64, utility: f64) -> EpisodeTtl {
    if salience >= 0.75 {
        EpisodeTtl::Permanent
    } else if salience >= 0.5 || utility >= 0.7 {
        EpisodeTtl::Quarter
    } else if salience >= 0.25 || utility >= 0.4 {
        EpisodeTtl::Month
    } else {
        EpisodeTtl::Week
    }
}

fn draft_from(session_id: &str, segment_messages: &[(usize, &RawMessage)]) -> EpisodeDraft {
    let transcript = segment_messages
        .iter()
        .map(|(_, m)| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");

    let mut participants: Vec<String> = Vec::new();
    for (_, m) in segment_messages {
        if !participants.contains(&m.role) {
            participants.push(m.role.clone());
        }
    }

    let keywords = text::ranked_keywords(&transcript, MAX_KEYWORDS);
    let topic = keywords.first().cloned().unwrap_or_default();
    let salience = salience_of(&transcript);
    // Longer, info-dense segments are more likely to be worth keeping
    let utility = (0.3 + segment_messages.len() as f64 * 0.05).min(0.8);

    EpisodeDraft {
        summary: fallback_summary(segment_messages),
        participants,
        topic,
        keywords,
        emotional_salience: salience,
        utility_score: utility,
        message_ids: segment_messages
            .iter()
            .map(|(idx, _)| format!("{session_id}:{idx}"))
            .collect(),
        timestamp: segment_messages
            .first()
            .map(|(_, m)| m.timestamp)
            .unwrap_or_else(Utc::now),
        ttl: ttl_for(salience, utility),
        transcript,
    }
}

/// Segment a session into episode drafts with pattern summaries
pub fn build_drafts(batch: &SessionBatch, max_episodes: usize) -> Vec<EpisodeDraft> {
    let mut drafts: Vec<EpisodeDraft> = segment(&batch.messages)
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| draft_from(&batch.session_id, s))
        .collect();
    if max_episodes > 0 && drafts.len() > max_episodes {
        drafts.truncate(max_episodes);
    }
    drafts
}

/// One-sentence summary from the model
pub async fn summarize_with_model(
    model: &dyn LanguageModel,
    transcript: &str,
) -> Result<String, LlmError> {
    let prompt = format!(
        "Summarize this conversation segment in ONE sentence, third person, \
naming the people involved. Reply with only the sentence.\n\n{transcript}"
    );
    let reply = complete_bounded(
        model,
        &prompt,
        &CompleteOptions {
            max_tokens: 80,
            ..Default::default()
        },
    )
    .await?;
    let summary = reply.trim().trim_matches('"').to_string();
    if summary.is_empty() {
        return Err(LlmError::Parse("empty summary".to_string()));
    }
    Ok(summary)
}

/// Segment a session and summarize each draft with the model, falling
/// back to the pattern summary per segment on any model failure.
pub async fn build_drafts_with_model(
    model: &dyn LanguageModel,
    batch: &SessionBatch,
    max_episodes: usize,
) -> Vec<EpisodeDraft> {
    let mut drafts = build_drafts(batch, max_episodes);
    for draft in drafts.iter_mut() {
        match summarize_with_model(model, &draft.transcript).await {
            Ok(summary) => draft.summary = summary,
            Err(err) => {
                tracing::warn!(error = %err, "episode summary fell back to pattern extraction");
            }
        }
    }
    drafts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, 9, 9, 0, 0).unwrap()
    }

    fn msg(role: &str, content: &str, at: DateTime<Utc>) -> RawMessage {
        RawMessage::new(role, content, at)
    }

    #[test]
    fn one_continuous_session_is_one_episode() {
        let batch = SessionBatch::new(
            "s1",
            vec![
                msg("user", "My name is Alex Chen", base()),
                msg("assistant", "Nice to meet you", base() + Duration::minutes(1)),
                msg("user", "I work at TechCorp", base() + Duration::minutes(2)),
            ],
        );
        let drafts = build_drafts(&batch, 10);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].participants, vec!["user", "assistant"]);
        assert_eq!(drafts[0].message_ids, vec!["s1:0", "s1:1", "s1:2"]);
        assert!(drafts[0].summary.contains("Alex Chen"));
    }

    #[test]
    fn long_gaps_split_segments() {
        let batch = SessionBatch::new(
            "s1",
            vec![
                msg("user", "Morning planning talk", base()),
                msg("user", "Evening recap of the day", base() + Duration::hours(8)),
            ],
        );
        let drafts = build_drafts(&batch, 10);
        assert_eq!(drafts.len(), 2);
    }

    #[test]
    fn topic_shift_cues_split_segments() {
        let batch = SessionBatch::new(
            "s1",
            vec![
                msg("user", "The deploy went fine", base()),
                msg(
                    "user",
                    "By the way, my sister is visiting next week",
                    base() + Duration::minutes(1),
                ),
            ],
        );
        let drafts = build_drafts(&batch, 10);
        assert_eq!(drafts.len(), 2);
    }

    #[test]
    fn emotional_segments_score_higher_and_live_longer() {
        let calm = SessionBatch::new(
            "s1",
            vec![msg("user", "The weather report says rain", base())],
        );
        let charged = SessionBatch::new(
            "s2",
            vec![msg(
                "user",
                "I'm thrilled and proud, this is amazing news and I love it",
                base(),
            )],
        );
        let calm_draft = &build_drafts(&calm, 1)[0];
        let charged_draft = &build_drafts(&charged, 1)[0];
        assert!(charged_draft.emotional_salience > calm_draft.emotional_salience);
        assert_eq!(charged_draft.ttl, EpisodeTtl::Permanent);
    }

    #[test]
    fn max_episodes_caps_output() {
        let mut messages = Vec::new();
        for i in 0..5 {
            messages.push(msg("user", "hello again", base() + Duration::hours(i)));
        }
        let batch = SessionBatch::new("s1", messages);
        assert_eq!(build_drafts(&batch, 3).len(), 3);
    }

    #[tokio::test]
    async fn model_summary_replaces_fallback() {
        let model = ScriptedModel::new();
        model.push_reply("Alex told the assistant about starting at TechCorp.");
        let batch = SessionBatch::new(
            "s1",
            vec![msg("user", "I work at TechCorp now", base())],
        );
        let drafts = build_drafts_with_model(&model, &batch, 10).await;
        assert_eq!(
            drafts[0].summary,
            "Alex told the assistant about starting at TechCorp."
        );
    }
}
