//! Raw Session Input
//!
//! The shape consolidation consumes: buffered chat messages grouped by
//! session, with an optional per-session date override used to resolve
//! relative time expressions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One buffered chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    /// Speaker label, e.g. `user` / `assistant`
    pub role: String,
    /// Message text
    pub content: String,
    /// When the message was sent
    pub timestamp: DateTime<Utc>,
}

impl RawMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp,
        }
    }
}

/// A session's worth of messages handed to a consolidation run
#[derive(Debug, Clone)]
pub struct SessionBatch {
    /// Session identifier
    pub session_id: String,
    /// Conversation date override (defaults to the first message time)
    pub date: Option<DateTime<Utc>>,
    /// Messages, oldest first
    pub messages: Vec<RawMessage>,
}

impl SessionBatch {
    pub fn new(session_id: impl Into<String>, messages: Vec<RawMessage>) -> Self {
        Self {
            session_id: session_id.into(),
            date: None,
            messages,
        }
    }

    /// The timestamp used for relative-time resolution
    pub fn conversation_date(&self) -> DateTime<Utc> {
        self.date
            .or_else(|| self.messages.first().map(|m| m.timestamp))
            .unwrap_or_else(Utc::now)
    }

    /// Concatenated transcript, one `role: content` line per message
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
