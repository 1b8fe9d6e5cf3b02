//! HTTP endpoint handlers
//!
//! Recall is special: it answers 200 with a well-formed envelope no
//! matter what went wrong internally; failures surface only through the
//! `error` field and a degraded `answer`.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use sheep_core::extract::temporal;
use sheep_core::{ids, RawMessage, RecallMode};

use crate::state::{AppState, PendingWindow};

/// Facts echoed back in the recall envelope
const MAX_FACTS_RETURNED: usize = 10;

// ============================================================================
// POST /memories
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemoryBody {
    pub content: String,
    pub role: String,
    pub timestamp: Option<String>,
    pub session_id: Option<String>,
}

/// Append a message to the in-memory session buffer
pub async fn add_memory(
    State(state): State<AppState>,
    Json(body): Json<AddMemoryBody>,
) -> Result<Json<Value>, StatusCode> {
    if body.content.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let session_id = body.session_id.unwrap_or_else(|| "default".to_string());
    let timestamp = body
        .timestamp
        .as_deref()
        .and_then(ids::parse_rfc3339)
        .unwrap_or_else(ids::now);

    state
        .buffers
        .push(&session_id, RawMessage::new(body.role, body.content, timestamp));
    state.scheduler.record_activity(&state.agent_id);

    Ok(Json(serde_json::json!({ "success": true })))
}

// ============================================================================
// POST /consolidate
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidateBody {
    pub session_id: Option<String>,
    /// Session number or id → conversation date, for relative-time
    /// resolution ("1" applies to session "s1")
    pub session_dates: Option<HashMap<String, String>>,
}

fn parse_session_dates(raw: Option<HashMap<String, String>>) -> HashMap<String, DateTime<Utc>> {
    raw.unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| {
            ids::parse_rfc3339(&value)
                .or_else(|| {
                    chrono::NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(12, 0, 0))
                        .map(|dt| dt.and_utc())
                })
                .map(|date| (key, date))
        })
        .collect()
}

/// Run the full consolidation pipeline over the buffer
pub async fn consolidate(
    State(state): State<AppState>,
    Json(body): Json<ConsolidateBody>,
) -> Result<Json<Value>, (StatusCode, String)> {
    state.runner.set_pending(PendingWindow {
        only_session: body.session_id.clone(),
        dates: parse_session_dates(body.session_dates),
    });

    match state.scheduler.trigger(&state.agent_id, true).await {
        Some(report) => Ok(Json(serde_json::json!({
            "episodes": report.run.episodes,
            "facts": report.run.facts,
            "contradictions": report.run.contradictions_resolved,
            "causalLinks": report.run.causal_links,
        }))),
        None => {
            // Collision with a running cycle; the trigger was dropped,
            // never queued
            tracing::warn!("consolidate request dropped");
            Err((
                StatusCode::CONFLICT,
                "consolidation already running".to_string(),
            ))
        }
    }
}

// ============================================================================
// GET /recall
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallParams {
    pub query: Option<String>,
    pub session_id: Option<String>,
    pub mode: Option<String>,
}

fn transcript_for(state: &AppState, session_id: &str) -> Option<String> {
    let messages = state.buffers.messages(session_id);
    if messages.is_empty() {
        return None;
    }
    let date = messages
        .first()
        .map(|m| temporal::format_date(m.timestamp))
        .unwrap_or_default();
    let mut transcript = format!("[session {session_id}, {date}]\n");
    for message in &messages {
        transcript.push_str(&format!("{}: {}\n", message.role, message.content));
    }
    Some(transcript)
}

/// Answer a question. Always 200 with the full envelope.
pub async fn recall(
    State(state): State<AppState>,
    Query(params): Query<RecallParams>,
) -> Json<Value> {
    let query = params.query.unwrap_or_default();
    let session_id = params.session_id.unwrap_or_else(|| "default".to_string());
    let mode = RecallMode::parse_name(params.mode.as_deref().unwrap_or("memory"));

    let transcript = match mode {
        RecallMode::Hybrid => transcript_for(&state, &session_id),
        RecallMode::Memory => None,
    };

    let outcome = state
        .engine
        .recall(&query, &session_id, mode, transcript.as_deref())
        .await;

    let facts: Vec<Value> = outcome
        .facts
        .iter()
        .take(MAX_FACTS_RETURNED)
        .map(|f| {
            serde_json::json!({
                "id": f.id,
                "subject": f.subject,
                "predicate": f.predicate,
                "object": f.object,
                "confidence": f.confidence,
            })
        })
        .collect();

    Json(serde_json::json!({
        "answer": outcome.answer,
        "mode": outcome.mode.as_str(),
        "factsUsed": outcome.facts.len(),
        "facts": facts,
        "version": sheep_core::VERSION,
        "error": outcome.error,
    }))
}

// ============================================================================
// GET /health
// ============================================================================

/// Service and mode report
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let status = if state.store.is_poisoned() {
        "degraded"
    } else {
        "ok"
    };
    Json(serde_json::json!({
        "status": status,
        "agentId": state.agent_id,
        "modes": {
            "memory": true,
            "hybrid": true,
            "llm": state.llm_configured,
        },
    }))
}
