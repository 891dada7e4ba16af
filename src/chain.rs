//! Retrieval-augmented generation chains.
//!
//! [`RagChain`] answers one question: retrieve the `k` nearest chunks, stuff
//! them into a fixed prompt, and stream the model's answer. The retrieved
//! chunks are available on the returned [`AnswerStream`] before the first
//! fragment is pulled, so citations never wait on generation.
//!
//! [`SummaryChain`] has the same shape with a wider `k`, a fixed retrieval
//! query, and a single non-streamed output.

use std::sync::Arc;

use futures::StreamExt;

use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::index::{IndexedCorpus, Scope, ScoredChunk};
use crate::llm::{ChatModel, FragmentStream, Prompt};
use crate::models::Chunk;

pub const ANSWER_SYSTEM_PROMPT: &str = "You are a professional research assistant. \
Answer as detailed as possible using the context below. \
If you don't find the answer in the context, say 'I don't know.'";

pub const SUMMARY_SYSTEM_PROMPT: &str = "Generate a concise, professional 3-point bulleted \
summary (executive snapshot) of the documents provided below.";

/// Retrieval query used in place of a question by the summary chain.
pub const SUMMARY_QUERY: &str = "Generate summary";

/// Lifecycle of one chain invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Retrieving,
    Generating,
    Streaming,
    Complete,
    Failed,
}

/// Join chunk texts into one context block, blank-line separated.
pub fn format_docs(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn answer_prompt(context: &str, question: &str) -> Prompt {
    Prompt::new(
        ANSWER_SYSTEM_PROMPT,
        format!("Context:\n{}\n\nQuestion:\n{}", context, question),
    )
}

pub fn summary_prompt(context: &str) -> Prompt {
    Prompt::new(SUMMARY_SYSTEM_PROMPT, format!("Documents:\n{}", context))
}

/// Question answering over an indexed corpus.
#[derive(Clone)]
pub struct RagChain {
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn ChatModel>,
    k: usize,
}

impl RagChain {
    pub fn new(embedder: Arc<dyn Embedder>, model: Arc<dyn ChatModel>, k: usize) -> Self {
        Self { embedder, model, k }
    }

    pub fn model_label(&self) -> String {
        self.model.label()
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Retrieve context for `question` and start generating.
    ///
    /// Errors here mean the chain failed before streaming began.
    pub async fn invoke(
        &self,
        corpus: &IndexedCorpus,
        scope: Scope,
        question: &str,
    ) -> Result<AnswerStream> {
        tracing::debug!(state = ?ChainState::Retrieving, k = self.k, ?scope, "rag chain");
        let sources = corpus
            .query(self.embedder.as_ref(), question, self.k, scope)
            .await?;

        tracing::debug!(state = ?ChainState::Generating, sources = sources.len(), "rag chain");
        let chunks: Vec<Chunk> = sources.iter().map(|s| s.chunk.clone()).collect();
        let prompt = answer_prompt(&format_docs(&chunks), question);
        let fragments = self
            .model
            .stream(&prompt)
            .await
            .map_err(|e| RagError::Chain(format!("{:#}", e)))?;

        Ok(AnswerStream::new(sources, fragments))
    }
}

/// A streaming answer plus the chunks it was grounded on.
pub struct AnswerStream {
    sources: Vec<ScoredChunk>,
    fragments: FragmentStream,
    state: ChainState,
    answer: String,
}

impl AnswerStream {
    pub fn new(sources: Vec<ScoredChunk>, fragments: FragmentStream) -> Self {
        Self {
            sources,
            fragments,
            state: ChainState::Generating,
            answer: String::new(),
        }
    }

    /// Retrieved chunks, best match first.
    pub fn sources(&self) -> &[ScoredChunk] {
        &self.sources
    }

    pub fn source_chunks(&self) -> Vec<Chunk> {
        self.sources.iter().map(|s| s.chunk.clone()).collect()
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    /// Text streamed so far; the final answer once complete.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Pull the next fragment in generation order.
    ///
    /// Returns `None` once the stream is `Complete` or `Failed`. An error
    /// moves the stream to `Failed`; the text received before it stays in
    /// [`AnswerStream::answer`].
    pub async fn next_fragment(&mut self) -> Option<Result<String>> {
        if matches!(self.state, ChainState::Complete | ChainState::Failed) {
            return None;
        }
        match self.fragments.next().await {
            Some(Ok(fragment)) => {
                self.state = ChainState::Streaming;
                self.answer.push_str(&fragment);
                Some(Ok(fragment))
            }
            Some(Err(e)) => {
                self.state = ChainState::Failed;
                tracing::warn!(error = %e, received = self.answer.len(), "answer stream failed");
                Some(Err(RagError::Chain(format!("{:#}", e))))
            }
            None => {
                self.state = ChainState::Complete;
                None
            }
        }
    }

    /// Drain the remaining fragments and return the full answer.
    pub async fn collect(mut self) -> Result<String> {
        while let Some(fragment) = self.next_fragment().await {
            fragment?;
        }
        Ok(self.answer)
    }
}

/// One-shot executive snapshot of a corpus.
pub struct SummaryChain {
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn ChatModel>,
    k: usize,
}

impl SummaryChain {
    pub fn new(embedder: Arc<dyn Embedder>, model: Arc<dyn ChatModel>, k: usize) -> Self {
        Self { embedder, model, k }
    }

    /// Every failure comes back as [`RagError::Summary`].
    pub async fn run(&self, corpus: &IndexedCorpus, scope: Scope) -> Result<String> {
        let sources = corpus
            .query(self.embedder.as_ref(), SUMMARY_QUERY, self.k, scope)
            .await
            .map_err(|e| RagError::Summary(e.to_string()))?;
        let chunks: Vec<Chunk> = sources.into_iter().map(|s| s.chunk).collect();

        let summary = self
            .model
            .generate(&summary_prompt(&format_docs(&chunks)))
            .await
            .map_err(|e| RagError::Summary(format!("{:#}", e)))?;
        if summary.trim().is_empty() {
            return Err(RagError::Summary("model returned an empty summary".to_string()));
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Backend;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn id(&self) -> &str {
            "axis"
        }
        fn model_name(&self) -> &str {
            "axis"
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("cat") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    /// Replays fixed fragments, optionally failing after them, and records prompts.
    struct ScriptedModel {
        fragments: Vec<&'static str>,
        fail: bool,
        prompts: Mutex<Vec<Prompt>>,
    }

    impl ScriptedModel {
        fn new(fragments: Vec<&'static str>, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fragments,
                fail,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn label(&self) -> String {
            "Test/scripted".to_string()
        }
        async fn stream(&self, prompt: &Prompt) -> anyhow::Result<FragmentStream> {
            self.prompts.lock().unwrap().push(prompt.clone());
            let mut items: Vec<anyhow::Result<String>> =
                self.fragments.iter().map(|f| Ok(f.to_string())).collect();
            if self.fail {
                items.push(Err(anyhow::anyhow!("connection reset")));
            }
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    async fn corpus() -> IndexedCorpus {
        let mut corpus = IndexedCorpus::new("axis", Backend::Ephemeral);
        let chunks = vec![
            Chunk {
                text: "the cat sat".into(),
                source: "pets.pdf".into(),
                page: 2,
            },
            Chunk {
                text: "stock prices rose".into(),
                source: "market.pdf".into(),
                page: 1,
            },
        ];
        let vectors = AxisEmbedder
            .embed(&chunks.iter().map(|c| c.text.clone()).collect::<Vec<_>>())
            .await
            .unwrap();
        corpus.append_batch(chunks, vectors).unwrap();
        corpus
    }

    #[test]
    fn docs_are_blank_line_separated() {
        let chunks = vec![
            Chunk {
                text: "one".into(),
                source: "a".into(),
                page: 1,
            },
            Chunk {
                text: "two".into(),
                source: "a".into(),
                page: 1,
            },
        ];
        assert_eq!(format_docs(&chunks), "one\n\ntwo");
    }

    #[tokio::test]
    async fn streams_fragments_with_sources_up_front() {
        let model = ScriptedModel::new(vec!["A cat ", "sat."], false);
        let chain = RagChain::new(Arc::new(AxisEmbedder), model.clone(), 1);
        let corpus = corpus().await;

        let mut answer = chain
            .invoke(&corpus, Scope::All, "where is the cat?")
            .await
            .unwrap();
        assert_eq!(answer.sources().len(), 1);
        assert_eq!(answer.sources()[0].chunk.source, "pets.pdf");
        assert_eq!(answer.state(), ChainState::Generating);

        let mut seen = Vec::new();
        while let Some(fragment) = answer.next_fragment().await {
            seen.push(fragment.unwrap());
        }
        assert_eq!(seen, vec!["A cat ", "sat."]);
        assert_eq!(answer.state(), ChainState::Complete);
        assert_eq!(answer.answer(), "A cat sat.");

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts[0].system, ANSWER_SYSTEM_PROMPT);
        assert_eq!(
            prompts[0].user,
            "Context:\nthe cat sat\n\nQuestion:\nwhere is the cat?"
        );
    }

    #[tokio::test]
    async fn stream_error_fails_and_keeps_partial_text() {
        let model = ScriptedModel::new(vec!["partial"], true);
        let chain = RagChain::new(Arc::new(AxisEmbedder), model, 3);
        let corpus = corpus().await;

        let mut answer = chain.invoke(&corpus, Scope::All, "cat?").await.unwrap();
        assert!(answer.next_fragment().await.unwrap().is_ok());
        assert!(matches!(
            answer.next_fragment().await,
            Some(Err(RagError::Chain(_)))
        ));
        assert_eq!(answer.state(), ChainState::Failed);
        assert!(answer.next_fragment().await.is_none());
        assert_eq!(answer.answer(), "partial");
    }

    #[tokio::test]
    async fn empty_corpus_fails_before_generation() {
        let model = ScriptedModel::new(vec!["never"], false);
        let chain = RagChain::new(Arc::new(AxisEmbedder), model.clone(), 3);
        let empty = IndexedCorpus::new("axis", Backend::Ephemeral);

        let err = chain.invoke(&empty, Scope::All, "q").await.err().unwrap();
        assert!(matches!(err, RagError::EmptyCorpus));
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn summary_uses_fixed_query_and_prompt() {
        let model = ScriptedModel::new(vec!["- one\n", "- two\n", "- three"], false);
        let chain = SummaryChain::new(Arc::new(AxisEmbedder), model.clone(), 5);
        let summary = chain.run(&corpus().await, Scope::All).await.unwrap();
        assert_eq!(summary, "- one\n- two\n- three");

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts[0].system, SUMMARY_SYSTEM_PROMPT);
        assert!(prompts[0].user.starts_with("Documents:\n"));
        assert!(prompts[0].user.contains("the cat sat"));
        assert!(prompts[0].user.contains("stock prices rose"));
    }

    #[tokio::test]
    async fn summary_failure_is_a_summary_error() {
        let model = ScriptedModel::new(vec![], true);
        let chain = SummaryChain::new(Arc::new(AxisEmbedder), model, 5);
        let err = chain.run(&corpus().await, Scope::All).await.unwrap_err();
        assert!(matches!(err, RagError::Summary(_)));
    }
}
