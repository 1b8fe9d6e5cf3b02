//! Full consolidation run with a scripted language model: episode
//! summary, fact envelope, causal links with temporal resolution, and
//! foresights all land in the store; recall then answers from the
//! extracted facts.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

use sheep_core::{
    ConsolidationPipeline, MemoryStore, ModelHandle, PipelineConfig, RawMessage, RecallEngine,
    RecallMode, RunStatus, ScriptedModel, SessionBatch,
};

fn open_store() -> (Arc<MemoryStore>, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::open_at("scripted", dir.path().join("mem.sqlite")).unwrap();
    (Arc::new(store), dir)
}

fn session() -> SessionBatch {
    let base = Utc.with_ymd_and_hms(2023, 6, 9, 9, 0, 0).unwrap();
    SessionBatch::new(
        "s1",
        vec![
            RawMessage::new("user", "My name is Alex Chen", base),
            RawMessage::new("assistant", "Nice to meet you", base + Duration::minutes(1)),
            RawMessage::new(
                "user",
                "I quit my job yesterday because the commute was brutal",
                base + Duration::minutes(2),
            ),
            RawMessage::new("assistant", "That sounds like a big step", base + Duration::minutes(3)),
        ],
    )
}

/// Queue replies in pipeline call order: summary, facts, procedures,
/// causal links, foresights.
fn script_model() -> Arc<ScriptedModel> {
    let model = Arc::new(ScriptedModel::new());
    model.push_reply("Alex Chen told the assistant about quitting their job over the commute.");
    model.push_reply(
        r#"[
  {"subject": "user", "predicate": "name_is", "object": "Alex Chen", "confidence": 0.95},
  {"subject": "user", "predicate": "quit_job", "object": "their job", "confidence": 0.85}
]"#,
    );
    model.push_reply("[]");
    model.push_reply(
        r#"[{"cause": "the commute was brutal", "effect": "the user quit their job yesterday",
             "mechanism": "daily strain made the role unsustainable", "confidence": 0.85,
             "temporal_delay": "months"}]"#,
    );
    model.push_reply(
        r#"[{"description": "the user will be job hunting", "starts_in_days": 0,
             "duration_days": 30, "confidence": 0.7}]"#,
    );
    model
}

#[tokio::test]
async fn scripted_run_extracts_every_entity_kind() {
    let (store, _dir) = open_store();
    let model = script_model();
    let pipeline = ConsolidationPipeline::new(
        store.clone(),
        Some(model.clone() as ModelHandle),
        PipelineConfig::default(),
    );

    let report = pipeline.run(&[session()]).await.unwrap();
    assert_eq!(report.run.status, RunStatus::Completed);
    assert!(!report.degraded);
    assert_eq!(report.run.episodes, 1);
    assert!(report.run.facts >= 2);
    assert_eq!(report.run.causal_links, 1);

    // The episode carries the model's summary
    let episodes = store.recent_episodes(10).unwrap();
    assert_eq!(episodes.len(), 1);
    assert!(episodes[0].summary.contains("Alex Chen"));

    // Relative time in the causal link resolved against the session date
    let links = store.all_causal_links().unwrap();
    assert_eq!(links.len(), 1);
    assert!(links[0].effect_description.contains("8 June 2023"));
    assert_eq!(links[0].temporal_delay.as_deref(), Some("months"));

    // Foresight window derived from starts_in_days/duration_days
    let foresights = store.foresights(true).unwrap();
    assert_eq!(foresights.len(), 1);
    assert!(foresights[0].description.contains("job hunting"));
    assert_eq!(foresights[0].duration_days, Some(30));

    // Facts carry the episode as evidence
    let names = store.facts_about("user", Some("name_is")).unwrap();
    assert_eq!(names.len(), 1);
    assert_eq!(names[0].evidence, vec![episodes[0].id.clone()]);
}

#[tokio::test]
async fn recall_answers_from_the_consolidated_facts() {
    let (store, _dir) = open_store();
    let model = script_model();
    let pipeline = ConsolidationPipeline::new(
        store.clone(),
        Some(model.clone() as ModelHandle),
        PipelineConfig::default(),
    );
    pipeline.run(&[session()]).await.unwrap();

    model.push_reply("Alex Chen");
    let engine = RecallEngine::new(store, Some(model as ModelHandle));
    let outcome = engine
        .recall("What is my name?", "s1", RecallMode::Memory, None)
        .await;
    assert_eq!(outcome.answer, "Alex Chen");
    assert!(outcome.facts.iter().any(|f| f.object == "Alex Chen"));
}
