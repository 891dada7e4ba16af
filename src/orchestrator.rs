//! Single-turn interaction protocol.
//!
//! Every question, quick action, and the post-upload auto summary goes
//! through [`ask`]:
//!
//! 1. append the user turn
//! 2. invoke the [`RagChain`] for the session's workspace scope
//! 3. forward fragments to the caller as they arrive
//! 4. format citations from the retrieved chunks
//! 5. append the assistant turn with model, time, latency, and citations
//! 6. update analytics
//!
//! A failed turn is still recorded: the assistant turn holds whatever text
//! streamed before the error (or the error message) with `success: false`,
//! and analytics count it against the success rate.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use crate::chain::RagChain;
use crate::error::RagError;
use crate::models::{ChatTurn, Chunk, TurnMetadata};
use crate::session::SessionState;

pub const AUTO_SUMMARY_PROMPT: &str =
    "Briefly summarize these documents and list 3 key takeaways.";

/// Preset prompts offered once documents are indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickAction {
    Summary,
    Ideas,
    Actions,
    Risks,
    ExtractData,
    Brief,
}

impl QuickAction {
    pub const ALL: [QuickAction; 6] = [
        QuickAction::Summary,
        QuickAction::Ideas,
        QuickAction::Actions,
        QuickAction::Risks,
        QuickAction::ExtractData,
        QuickAction::Brief,
    ];

    pub fn name(self) -> &'static str {
        match self {
            QuickAction::Summary => "summary",
            QuickAction::Ideas => "ideas",
            QuickAction::Actions => "actions",
            QuickAction::Risks => "risks",
            QuickAction::ExtractData => "extract",
            QuickAction::Brief => "brief",
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            QuickAction::Summary => "Provide a comprehensive summary of these documents.",
            QuickAction::Ideas => "Suggest 3 interesting questions I can ask about these files.",
            QuickAction::Actions => "What are the core action items or conclusions in these files?",
            QuickAction::Risks => {
                "Summarize the key risks or challenges mentioned in these documents."
            }
            QuickAction::ExtractData => {
                "Extract any statistical data or key metrics found in these files."
            }
            QuickAction::Brief => "Draft a professional one-paragraph brief based on the content.",
        }
    }
}

impl fmt::Display for QuickAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QuickAction {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        QuickAction::ALL
            .into_iter()
            .find(|a| a.name() == wanted)
            .ok_or_else(|| {
                RagError::Configuration(format!(
                    "unknown quick action: '{}'. Available: {}",
                    s,
                    QuickAction::ALL.map(|a| a.name()).join(", ")
                ))
            })
    }
}

/// Group retrieved chunks by source, listing each source's pages once.
///
/// Sources keep first-seen order; pages are sorted ascending:
/// `a.pdf (Pg. 1, 3) | b.pdf (Pg. 2)`.
pub fn format_citations(chunks: &[Chunk]) -> String {
    let mut grouped: Vec<(&str, BTreeSet<u32>)> = Vec::new();
    for chunk in chunks {
        match grouped.iter_mut().find(|(src, _)| *src == chunk.source) {
            Some((_, pages)) => {
                pages.insert(chunk.page);
            }
            None => grouped.push((chunk.source.as_str(), BTreeSet::from([chunk.page]))),
        }
    }

    grouped
        .iter()
        .map(|(src, pages)| {
            let pages: Vec<String> = pages.iter().map(u32::to_string).collect();
            format!("{} (Pg. {})", src, pages.join(", "))
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Result of one turn, as recorded in history.
#[derive(Debug)]
pub struct TurnOutcome {
    pub answer: String,
    pub citations: String,
    pub latency_seconds: f64,
    /// Set when the chain failed; the turn was recorded as unsuccessful.
    pub error: Option<RagError>,
    /// Raw retrieved chunks, only when developer insights are on.
    pub retrieved: Option<Vec<Chunk>>,
}

impl TurnOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Run one question through the chain and record it in `session`.
///
/// `on_fragment` sees each answer fragment in generation order.
pub async fn ask<F>(
    session: &mut SessionState,
    chain: &RagChain,
    prompt: &str,
    mut on_fragment: F,
) -> TurnOutcome
where
    F: FnMut(&str),
{
    session.push_turn(ChatTurn::user(prompt));
    let started = Instant::now();

    let mut answer = String::new();
    let mut sources: Vec<Chunk> = Vec::new();
    let mut error = None;

    match (session.corpus(), session.scope()) {
        (Some(corpus), Some(scope)) => match chain.invoke(corpus, scope, prompt).await {
            Ok(mut stream) => {
                sources = stream.source_chunks();
                while let Some(fragment) = stream.next_fragment().await {
                    match fragment {
                        Ok(text) => on_fragment(&text),
                        Err(e) => {
                            error = Some(e);
                            break;
                        }
                    }
                }
                answer = stream.answer().to_string();
            }
            Err(e) => error = Some(e),
        },
        _ => error = Some(RagError::EmptyCorpus),
    }

    let latency_seconds = started.elapsed().as_secs_f64();
    let citations = format_citations(&sources);
    let success = error.is_none();

    let content = match &error {
        Some(e) if answer.is_empty() => format!("Error: {}", e),
        _ => answer.clone(),
    };
    if let Some(e) = &error {
        tracing::error!(error = %e, "turn failed");
    } else {
        tracing::info!(latency_seconds, sources = sources.len(), "turn complete");
    }

    session.push_turn(ChatTurn::assistant(
        content,
        TurnMetadata {
            model: chain.model_label(),
            time: chrono::Local::now().format("%H:%M:%S").to_string(),
            latency_seconds,
            citations: citations.clone(),
            success,
        },
    ));
    session
        .analytics_mut()
        .record(prompt, &answer, latency_seconds, success);

    TurnOutcome {
        answer,
        citations,
        latency_seconds,
        error,
        retrieved: session.dev_mode().then_some(sources),
    }
}

/// Run a preset prompt through [`ask`].
pub async fn run_quick_action<F>(
    session: &mut SessionState,
    chain: &RagChain,
    action: QuickAction,
    on_fragment: F,
) -> TurnOutcome
where
    F: FnMut(&str),
{
    ask(session, chain, action.prompt(), on_fragment).await
}

/// Run the auto summary if one was requested since the last upload.
pub async fn run_pending_auto_summary<F>(
    session: &mut SessionState,
    chain: &RagChain,
    on_fragment: F,
) -> Option<TurnOutcome>
where
    F: FnMut(&str),
{
    if !session.take_auto_summary_request() {
        return None;
    }
    Some(ask(session, chain, AUTO_SUMMARY_PROMPT, on_fragment).await)
}
