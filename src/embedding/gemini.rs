//! Google `embedding-001` over the Generative Language REST API.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{backoff_delay, Embedder};
use crate::config::EmbeddingConfig;
use crate::error::RagError;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const MODEL: &str = "models/embedding-001";

/// Embedder calling `batchEmbedContents` with retry/backoff.
pub struct GeminiEmbedder {
    id: String,
    api_key: String,
    client: reqwest::Client,
    batch_size: usize,
    max_retries: u32,
}

#[derive(Deserialize)]
struct BatchResponse {
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

impl GeminiEmbedder {
    pub fn new(id: &str, api_key: String, config: &EmbeddingConfig) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            id: id.to_string(),
            api_key,
            client,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }

    async fn embed_batch(&self, texts: &[String], task_type: &str) -> Result<Vec<Vec<f32>>> {
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|t| {
                serde_json::json!({
                    "model": MODEL,
                    "content": { "parts": [{ "text": t }] },
                    "taskType": task_type,
                })
            })
            .collect();
        let body = serde_json::json!({ "requests": requests });
        let url = format!("{}/{}:batchEmbedContents", BASE_URL, MODEL);

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = self
                .client
                .post(&url)
                .query(&[("key", self.api_key.as_str())])
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: BatchResponse = response.json().await?;
                        if parsed.embeddings.len() != texts.len() {
                            bail!(
                                "Gemini returned {} embeddings for {} texts",
                                parsed.embeddings.len(),
                                texts.len()
                            );
                        }
                        return Ok(parsed.embeddings.into_iter().map(|e| e.values).collect());
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(%status, attempt, "Gemini embedding request failed, retrying");
                        last_err = Some(anyhow::anyhow!(
                            "Gemini embedding error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!("Gemini embedding error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn model_name(&self) -> &str {
        "embedding-001"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_batch(batch, "RETRIEVAL_DOCUMENT").await?);
        }
        Ok(out)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()], "RETRIEVAL_QUERY")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}
