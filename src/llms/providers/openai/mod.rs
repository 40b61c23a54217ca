//! OpenAI-compatible chat-completions provider.
//!
//! Talks to any endpoint implementing `POST {base_url}/chat/completions`
//! (OpenAI, Ollama's compatibility layer, vLLM, LM Studio, ...) via
//! `reqwest`, with exponential-backoff retries on 429/5xx and SSE
//! streaming.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};

use crate::error::LlmError;
use crate::llms::base_llm::{LlmMessage, LlmOptions, LlmProvider, TextStream};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

// ---------------------------------------------------------------------------
// SSE line parsing
// ---------------------------------------------------------------------------

/// One parsed line of a chat-completions event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    Delta(String),
    Done,
    Ignore,
}

/// Parse a single `data: ...` line from a streaming response.
pub fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return SseLine::Ignore;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        log::debug!("skipping unparsable stream line: {}", data);
        return SseLine::Ignore;
    };
    match value
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
    {
        Some(delta) if !delta.is_empty() => SseLine::Delta(delta.to_string()),
        _ => SseLine::Ignore,
    }
}

/// Extract the reply text from a non-streaming response.
pub fn parse_completion(response: &Value) -> Result<String, LlmError> {
    let message = response
        .pointer("/choices/0/message")
        .ok_or_else(|| LlmError::Provider("no choices in response".to_string()))?;

    if let Some(usage) = response.get("usage") {
        log::debug!(
            "token usage: prompt={}, completion={}, total={}",
            usage.get("prompt_tokens").and_then(|v| v.as_i64()).unwrap_or(0),
            usage.get("completion_tokens").and_then(|v| v.as_i64()).unwrap_or(0),
            usage.get("total_tokens").and_then(|v| v.as_i64()).unwrap_or(0),
        );
    }

    Ok(message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or("")
        .to_string())
}

// ---------------------------------------------------------------------------
// OpenAiCompatibleProvider
// ---------------------------------------------------------------------------

/// Provider for OpenAI-compatible chat-completions endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    base_url: String,
    api_key: Option<String>,
    /// Maximum number of retries on rate limiting or server errors.
    pub max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Create a provider.
    ///
    /// * `api_key` - Optional API key (defaults to `OPENAI_API_KEY`).
    /// * `base_url` - Optional base URL (defaults to `OPENAI_BASE_URL`, then
    ///   the public OpenAI endpoint).
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            base_url: base_url
                .or_else(|| std::env::var("OPENAI_BASE_URL").ok())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: api_key.or_else(|| std::env::var("OPENAI_API_KEY").ok()),
            max_retries: 2,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Build the JSON request body.
    pub fn build_request_body(
        &self,
        messages: &[LlmMessage],
        options: &LlmOptions,
        stream: bool,
    ) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();
        let mut body = json!({
            "model": options.model,
            "messages": messages,
            "stream": stream,
        });
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }

    /// POST `body`, retrying rate limits and server errors with backoff.
    async fn send(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let mut last_error = String::from("request failed after all retries");
        let mut retry_delay = Duration::from_millis(500);

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                log::warn!("chat-completions retry attempt {} after {:?}", attempt, retry_delay);
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            let mut request = self
                .client
                .post(self.endpoint())
                .header("Content-Type", "application/json");
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = match request.json(body).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                last_error = format!("upstream returned {}", status);
                continue;
            }
            if status.is_client_error() {
                let text = response.text().await.unwrap_or_default();
                return Err(LlmError::Provider(format!("{}: {}", status, text)));
            }
            return Ok(response);
        }

        Err(LlmError::Provider(last_error))
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn generate(
        &self,
        messages: Vec<LlmMessage>,
        options: &LlmOptions,
    ) -> Result<String, LlmError> {
        log::debug!("generate: model={}, messages={}", options.model, messages.len());
        let body = self.build_request_body(&messages, options, false);
        let response = self.send(&body).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Provider(format!("invalid response body: {}", e)))?;
        parse_completion(&value)
    }

    async fn stream(
        &self,
        messages: Vec<LlmMessage>,
        options: &LlmOptions,
    ) -> Result<TextStream, LlmError> {
        log::debug!("stream: model={}, messages={}", options.model, messages.len());
        let body = self.build_request_body(&messages, options, true);
        let response = self.send(&body).await?;

        struct State {
            bytes: futures::stream::BoxStream<'static, reqwest::Result<bytes::Bytes>>,
            buffer: Vec<u8>,
            pending: std::collections::VecDeque<String>,
            done: bool,
        }

        let state = State {
            bytes: response.bytes_stream().boxed(),
            buffer: Vec::new(),
            pending: std::collections::VecDeque::new(),
            done: false,
        };

        let deltas = stream::unfold(state, |mut st| async move {
            loop {
                if let Some(delta) = st.pending.pop_front() {
                    return Some((Ok(delta), st));
                }
                if st.done {
                    return None;
                }
                match st.bytes.next().await {
                    Some(Ok(chunk)) => {
                        st.buffer.extend_from_slice(&chunk);
                        while let Some(pos) = st.buffer.iter().position(|b| *b == b'\n') {
                            let line: Vec<u8> = st.buffer.drain(..=pos).collect();
                            match parse_sse_line(&String::from_utf8_lossy(&line)) {
                                SseLine::Delta(d) => st.pending.push_back(d),
                                SseLine::Done => {
                                    st.done = true;
                                    break;
                                }
                                SseLine::Ignore => {}
                            }
                        }
                    }
                    Some(Err(e)) => {
                        st.done = true;
                        return Some((Err(LlmError::Stream(e.to_string())), st));
                    }
                    None => st.done = true,
                }
            }
        });

        Ok(deltas.boxed())
    }
}
