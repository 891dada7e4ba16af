//! Per-session state.
//!
//! [`SessionState`] is passed explicitly to every entry point that reads or
//! mutates the conversation. Nothing is global: two sessions in one process
//! share no corpus, history, or analytics.

use std::fmt;
use std::str::FromStr;

use crate::analytics::AnalyticsState;
use crate::error::RagError;
use crate::index::{IndexedCorpus, Scope};
use crate::models::ChatTurn;

/// Retrieval scope selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkspaceMode {
    /// Only the most recent upload batch.
    #[default]
    ActiveDocument,
    /// Every batch ever indexed into the corpus.
    FullCorpus,
}

impl WorkspaceMode {
    pub fn scope(self, corpus: &IndexedCorpus) -> Scope {
        match (self, corpus.latest_batch()) {
            (WorkspaceMode::ActiveDocument, Some(batch)) => Scope::Batch(batch),
            _ => Scope::All,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            WorkspaceMode::ActiveDocument => WorkspaceMode::FullCorpus,
            WorkspaceMode::FullCorpus => WorkspaceMode::ActiveDocument,
        }
    }
}

impl fmt::Display for WorkspaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkspaceMode::ActiveDocument => f.write_str("Active Document"),
            WorkspaceMode::FullCorpus => f.write_str("Full Corpus"),
        }
    }
}

impl FromStr for WorkspaceMode {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "active" | "active-document" => Ok(WorkspaceMode::ActiveDocument),
            "full" | "full-corpus" => Ok(WorkspaceMode::FullCorpus),
            other => Err(RagError::Configuration(format!(
                "unknown workspace mode: '{}'. Must be active or full.",
                other
            ))),
        }
    }
}

/// Outcome of the executive snapshot for the current corpus.
#[derive(Debug, Clone, PartialEq)]
pub enum DocSummary {
    Ready(String),
    Failed(String),
}

/// Everything one interactive session owns.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    corpus: Option<IndexedCorpus>,
    history: Vec<ChatTurn>,
    analytics: AnalyticsState,
    active_files: Vec<String>,
    workspace_mode: WorkspaceMode,
    doc_summary: Option<DocSummary>,
    dev_mode: bool,
    auto_summary_requested: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn corpus(&self) -> Option<&IndexedCorpus> {
        self.corpus.as_ref()
    }

    /// True once a non-empty corpus is available for questions.
    pub fn is_ready(&self) -> bool {
        self.corpus.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Install a corpus; the active files become its latest batch's sources.
    pub fn set_corpus(&mut self, corpus: IndexedCorpus) {
        self.active_files = match corpus.latest_batch() {
            Some(batch) => corpus.sources_in(Scope::Batch(batch)),
            None => Vec::new(),
        };
        self.corpus = Some(corpus);
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub(crate) fn push_turn(&mut self, turn: ChatTurn) {
        self.history.push(turn);
    }

    pub fn analytics(&self) -> &AnalyticsState {
        &self.analytics
    }

    pub(crate) fn analytics_mut(&mut self) -> &mut AnalyticsState {
        &mut self.analytics
    }

    pub fn active_files(&self) -> &[String] {
        &self.active_files
    }

    /// Human-readable name of the active document set.
    pub fn active_label(&self) -> String {
        if self.active_files.is_empty() {
            "No documents".to_string()
        } else {
            self.active_files.join(", ")
        }
    }

    pub fn workspace_mode(&self) -> WorkspaceMode {
        self.workspace_mode
    }

    /// Changes retrieval scope only; history and analytics are untouched.
    pub fn set_workspace_mode(&mut self, mode: WorkspaceMode) {
        self.workspace_mode = mode;
    }

    /// Scope a query should use, or `None` without a corpus.
    pub fn scope(&self) -> Option<Scope> {
        self.corpus
            .as_ref()
            .map(|c| self.workspace_mode.scope(c))
    }

    pub fn doc_summary(&self) -> Option<&DocSummary> {
        self.doc_summary.as_ref()
    }

    pub(crate) fn set_doc_summary(&mut self, summary: DocSummary) {
        self.doc_summary = Some(summary);
    }

    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    pub fn set_dev_mode(&mut self, on: bool) {
        self.dev_mode = on;
    }

    pub fn request_auto_summary(&mut self) {
        self.auto_summary_requested = true;
    }

    /// Consume a pending auto-summary request.
    pub fn take_auto_summary_request(&mut self) -> bool {
        std::mem::take(&mut self.auto_summary_requested)
    }

    /// Start a new conversation over the same corpus.
    pub fn new_chat(&mut self) {
        self.history.clear();
    }

    /// Restore every field to its initial default.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
