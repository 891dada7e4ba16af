//! Chat model clients.
//!
//! A [`ChatModel`] turns a [`Prompt`] into a stream of text fragments. Two
//! hosted providers are supported, both over server-sent events:
//!
//! - **Groq**: OpenAI-compatible `chat/completions` with `stream: true`;
//!   fragments come from `choices[0].delta.content` until `[DONE]`.
//! - **Gemini**: `streamGenerateContent?alt=sse`; fragments come from
//!   `candidates[0].content.parts[].text`.
//!
//! Transient failures (network, 429, 5xx) are retried with the same
//! exponential backoff as the embedders, but only before the first byte of
//! the stream arrives. Once fragments have been handed out, an error ends
//! the stream.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::config::LlmConfig;
use crate::embedding::backoff_delay;
use crate::error::RagError;
use crate::provider::Provider;

const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Ordered text fragments of one generation.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A system instruction plus the user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// `"Provider/model"`, recorded on every assistant turn.
    fn label(&self) -> String;

    /// Start a streamed generation.
    async fn stream(&self, prompt: &Prompt) -> Result<FragmentStream>;

    /// Generate a complete answer by draining [`ChatModel::stream`].
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let mut stream = self.stream(prompt).await?;
        let mut out = String::new();
        while let Some(fragment) = stream.next().await {
            out.push_str(&fragment?);
        }
        Ok(out)
    }
}

/// Resolve a provider and model to a chat client.
///
/// Validates the model against the provider catalog and resolves the API
/// key before anything touches the network.
pub fn create_chat_model(
    provider: Provider,
    model: &str,
    api_key: Option<&str>,
    config: &LlmConfig,
) -> Result<Arc<dyn ChatModel>, RagError> {
    provider.validate_model(model)?;
    let key = provider.resolve_api_key(api_key)?;

    let model: Arc<dyn ChatModel> = match provider {
        Provider::Groq => Arc::new(GroqModel::new(model, key, config)?),
        Provider::Gemini => Arc::new(GeminiModel::new(model, key, config)?),
    };
    Ok(model)
}

/// HTTP client for streamed generations.
///
/// `timeout_secs` bounds connecting and each read, not the whole response:
/// an answer keeps streaming for as long as fragments keep arriving.
fn streaming_client(config: &LlmConfig) -> Result<reqwest::Client, RagError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
        .map_err(|e| RagError::Configuration(format!("failed to build HTTP client: {}", e)))
}

/// Send a request, retrying transient failures until a success status.
async fn send_with_retry<F>(name: &str, max_retries: u32, build: F) -> Result<reqwest::Response>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            tokio::time::sleep(backoff_delay(attempt)).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::warn!(%status, attempt, provider = name, "chat request failed, retrying");
                    last_err = Some(anyhow::anyhow!("{} API error {}: {}", name, status, body_text));
                    continue;
                }

                bail!("{} API error {}: {}", name, status, body_text);
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, provider = name, "chat request failed, retrying");
                last_err = Some(e.into());
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", name)))
}

/// Turn an SSE response into fragments using `extract` on each event's data.
///
/// `extract` returns `Ok(None)` for events that carry no text.
fn sse_fragments(
    response: reqwest::Response,
    extract: fn(&str) -> Result<Option<String>>,
) -> FragmentStream {
    let stream = response
        .bytes_stream()
        .eventsource()
        .filter_map(move |event| {
            let item = match event {
                Ok(event) => extract(&event.data).transpose(),
                Err(e) => Some(Err(anyhow::anyhow!("stream interrupted: {}", e))),
            };
            futures::future::ready(item)
        });
    Box::pin(stream)
}

fn api_error(value: &Value) -> Option<String> {
    value.get("error").map(|err| {
        err.get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string())
    })
}

/// Text of one Groq (OpenAI-style) streaming chunk.
fn groq_fragment(data: &str) -> Result<Option<String>> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(data)?;
    if let Some(message) = api_error(&value) {
        bail!("Groq stream error: {}", message);
    }
    let text = value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Ok((!text.is_empty()).then(|| text.to_string()))
}

/// Concatenated text parts of one Gemini streaming response.
fn gemini_fragment(data: &str) -> Result<Option<String>> {
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(data)?;
    if let Some(message) = api_error(&value) {
        bail!("Gemini stream error: {}", message);
    }
    let text: String = value
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    Ok((!text.is_empty()).then_some(text))
}

/// Groq hosted models through the OpenAI-compatible endpoint.
pub struct GroqModel {
    model: String,
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl GroqModel {
    pub fn new(model: &str, api_key: String, config: &LlmConfig) -> Result<Self, RagError> {
        Ok(Self {
            model: model.to_string(),
            api_key,
            endpoint: GROQ_URL.to_string(),
            client: streaming_client(config)?,
            max_retries: config.max_retries,
        })
    }

    /// Send requests to another OpenAI-compatible `chat/completions` URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl ChatModel for GroqModel {
    fn label(&self) -> String {
        format!("{}/{}", Provider::Groq, self.model)
    }

    async fn stream(&self, prompt: &Prompt) -> Result<FragmentStream> {
        let body = serde_json::json!({
            "model": self.model,
            "stream": true,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
        });

        let response = send_with_retry("Groq", self.max_retries, || {
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        Ok(sse_fragments(response, groq_fragment))
    }
}

/// Google Gemini models through `streamGenerateContent`.
pub struct GeminiModel {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl GeminiModel {
    pub fn new(model: &str, api_key: String, config: &LlmConfig) -> Result<Self, RagError> {
        Ok(Self {
            model: model.to_string(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            client: streaming_client(config)?,
            max_retries: config.max_retries,
        })
    }

    /// Send requests under another `.../models` base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ChatModel for GeminiModel {
    fn label(&self) -> String {
        format!("{}/{}", Provider::Gemini, self.model)
    }

    async fn stream(&self, prompt: &Prompt) -> Result<FragmentStream> {
        let body = serde_json::json!({
            "systemInstruction": { "parts": [{ "text": prompt.system }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt.user }] }],
        });
        let url = format!("{}/{}:streamGenerateContent", self.base_url, self.model);

        let response = send_with_retry("Gemini", self.max_retries, || {
            self.client
                .post(&url)
                .query(&[("alt", "sse"), ("key", self.api_key.as_str())])
                .json(&body)
        })
        .await?;

        Ok(sse_fragments(response, gemini_fragment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Consume one HTTP request: headers plus a `content-length` body.
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut tmp = [0u8; 4096];
        loop {
            let n = socket.read(&mut tmp).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&tmp[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    return;
                }
            }
        }
    }

    /// Serve one SSE response, writing `events` `gap` apart. Returns the URL.
    async fn serve_sse(events: Vec<&'static str>, gap: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            let _ = socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n",
                )
                .await;
            for (i, event) in events.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(gap).await;
                }
                if socket
                    .write_all(format!("data: {}\n\n", event).as_bytes())
                    .await
                    .is_err()
                {
                    return;
                }
                let _ = socket.flush().await;
            }
            let _ = socket.shutdown().await;
        });
        format!("http://{}/openai/v1/chat/completions", addr)
    }

    fn fast_fail_config(timeout_secs: u64) -> LlmConfig {
        LlmConfig {
            timeout_secs,
            max_retries: 0,
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn answer_streaming_longer_than_timeout_completes() {
        let url = serve_sse(
            vec![
                r#"{"choices":[{"delta":{"content":"one "}}]}"#,
                r#"{"choices":[{"delta":{"content":"two "}}]}"#,
                r#"{"choices":[{"delta":{"content":"three"}}]}"#,
                "[DONE]",
            ],
            Duration::from_millis(1200),
        )
        .await;
        let model = GroqModel::new("llama-3.1-8b-instant", "k".into(), &fast_fail_config(2))
            .unwrap()
            .with_endpoint(url);

        let started = Instant::now();
        let answer = model.generate(&Prompt::new("system", "user")).await.unwrap();
        assert_eq!(answer, "one two three");
        assert!(started.elapsed() > Duration::from_secs(2));
    }

    #[tokio::test]
    async fn stalled_stream_still_times_out() {
        let url = serve_sse(
            vec![
                r#"{"choices":[{"delta":{"content":"one "}}]}"#,
                r#"{"choices":[{"delta":{"content":"late"}}]}"#,
            ],
            Duration::from_secs(4),
        )
        .await;
        let model = GroqModel::new("llama-3.1-8b-instant", "k".into(), &fast_fail_config(1))
            .unwrap()
            .with_endpoint(url);

        let mut stream = model.stream(&Prompt::new("system", "user")).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "one ");
        assert!(stream.next().await.unwrap().is_err());
    }

    #[test]
    fn groq_chunk_text() {
        let data = r#"{"choices":[{"index":0,"delta":{"content":"Hel"}}]}"#;
        assert_eq!(groq_fragment(data).unwrap().as_deref(), Some("Hel"));
    }

    #[test]
    fn groq_done_and_role_only_chunks_are_skipped() {
        assert!(groq_fragment("[DONE]").unwrap().is_none());
        let role_only = r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert!(groq_fragment(role_only).unwrap().is_none());
    }

    #[test]
    fn groq_error_event_fails() {
        let data = r#"{"error":{"message":"rate limited"}}"#;
        let err = groq_fragment(data).unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn gemini_parts_are_joined() {
        let data = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"a"},{"text":"b"}]}}]}"#;
        assert_eq!(gemini_fragment(data).unwrap().as_deref(), Some("ab"));
    }

    #[test]
    fn gemini_usage_only_event_is_skipped() {
        let data = r#"{"usageMetadata":{"promptTokenCount":3}}"#;
        assert!(gemini_fragment(data).unwrap().is_none());
    }

    #[test]
    fn malformed_event_is_an_error() {
        assert!(groq_fragment("{not json").is_err());
    }

    #[test]
    fn unknown_model_is_rejected_before_key_lookup() {
        let err = create_chat_model(
            Provider::Groq,
            "gpt-4",
            Some("k"),
            &LlmConfig::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn label_names_provider_and_model() {
        let model = create_chat_model(
            Provider::Gemini,
            "gemini-2.0-flash",
            Some("k"),
            &LlmConfig::default(),
        )
        .unwrap();
        assert_eq!(model.label(), "Gemini/gemini-2.0-flash");
    }
}
