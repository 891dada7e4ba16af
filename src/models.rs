//! Core data models used throughout the pipeline.
//!
//! These types represent the page records, chunks, and chat turns that flow
//! from upload through retrieval to the conversation history.

use serde::{Deserialize, Serialize};

/// Text of one non-empty PDF page, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRecord {
    pub text: String,
    /// Original file name of the upload.
    pub source: String,
    /// 1-based page number.
    pub page: u32,
}

/// A bounded slice of one page's text. Never spans two pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source: String,
    pub page: u32,
}

/// Who produced a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Per-answer details attached to assistant turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMetadata {
    /// `provider/model`, e.g. `Groq/llama-3.3-70b-versatile`.
    pub model: String,
    /// Wall-clock time the answer completed (`HH:MM:SS`).
    pub time: String,
    pub latency_seconds: f64,
    /// Formatted citation string; empty when nothing was retrieved.
    pub citations: String,
    /// False when generation failed and `content` holds partial text or the error.
    pub success: bool,
}

/// One entry of the chat history. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TurnMetadata>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn assistant(content: impl Into<String>, metadata: TurnMetadata) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            metadata: Some(metadata),
        }
    }
}
