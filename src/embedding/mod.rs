//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and the concrete embedders a [`Provider`]
//! resolves to:
//! - **Groq** → [`LocalEmbedder`]: `all-MiniLM-L6-v2` run locally via
//!   fastembed (Groq has no embeddings endpoint). No API key needed.
//! - **Gemini** → [`GeminiEmbedder`]: Google `embedding-001` over HTTP with
//!   batching, retry, and backoff.
//!
//! Also provides [`cosine_similarity`], the distance metric of the vector index.
//!
//! # Retry Strategy
//!
//! The HTTP embedder uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

mod gemini;
#[cfg(feature = "local-embeddings")]
mod local;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::RagError;
use crate::provider::Provider;

pub use gemini::GeminiEmbedder;
#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;

/// A text embedding function.
///
/// Implementations must be deterministic for identical input and return one
/// fixed-length vector per input text, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identity a corpus is bound to (e.g. `"groq"`). Persistent corpora are
    /// namespaced on disk by this value.
    fn id(&self) -> &str;

    /// Model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of document texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// Resolve a provider to its embedder.
///
/// Fails with a configuration error before any network or model call when
/// the provider cannot be served (missing key, feature not compiled in).
pub fn create_embedder(
    provider: Provider,
    config: &EmbeddingConfig,
    api_key: Option<&str>,
) -> Result<Arc<dyn Embedder>, RagError> {
    match provider {
        #[cfg(feature = "local-embeddings")]
        Provider::Groq => Ok(Arc::new(LocalEmbedder::new(provider.key(), config))),
        #[cfg(not(feature = "local-embeddings"))]
        Provider::Groq => Err(RagError::Configuration(
            "Groq corpora are embedded locally; rebuild with --features local-embeddings"
                .to_string(),
        )),
        Provider::Gemini => {
            let key = provider.resolve_api_key(api_key)?;
            Ok(Arc::new(GeminiEmbedder::new(provider.key(), key, config)?))
        }
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
///
/// # Formula
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Exponential backoff delay before retry `attempt` (1-based).
pub(crate) fn backoff_delay(attempt: u32) -> std::time::Duration {
    std::time::Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_backoff_caps() {
        assert_eq!(backoff_delay(1).as_secs(), 1);
        assert_eq!(backoff_delay(3).as_secs(), 4);
        assert_eq!(backoff_delay(20).as_secs(), 32);
    }

    #[test]
    fn gemini_without_key_fails_fast() {
        if std::env::var("GOOGLE_API_KEY").is_err() {
            let err = create_embedder(Provider::Gemini, &EmbeddingConfig::default(), None)
                .err()
                .expect("missing key must fail");
            assert!(matches!(err, RagError::MissingApiKey { .. }));
        }
    }

    #[test]
    fn gemini_with_key_builds_configured_client() {
        let config = EmbeddingConfig {
            timeout_secs: 5,
            ..EmbeddingConfig::default()
        };
        let embedder = create_embedder(Provider::Gemini, &config, Some("k")).unwrap();
        assert_eq!(embedder.id(), "gemini");
        assert_eq!(embedder.model_name(), "embedding-001");
    }
}
