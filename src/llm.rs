//! Chat-completion backend used for opponent replies, model-backed scoring and
//! fallacy detection. Speaks the OpenAI-compatible protocol served by OpenRouter.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API key not set")]
    MissingApiKey,
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Failures worth another attempt: the request never completed or the
    /// provider said to come back later.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Network(_) => true,
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Overrides the backend's default model for this call.
    pub model: Option<String>,
}

impl CompletionRequest {
    /// Single-turn request: one system prompt, one user prompt.
    pub fn prompt(system: &str, prompt: &str) -> Self {
        Self {
            system: system.to_string(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: 0.3,
            max_tokens: 600,
            model: None,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model.filter(|m| !m.is_empty());
        self
    }

    fn body(&self, default_model: &str, stream: bool) -> Value {
        let mut messages = vec![json!({"role": "system", "content": self.system})];
        for msg in &self.messages {
            messages.push(json!({"role": msg.role, "content": msg.content}));
        }
        json!({
            "model": self.model.as_deref().unwrap_or(default_model),
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": stream,
        })
    }
}

#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;

    /// Generate while forwarding text fragments as they arrive. Backends without
    /// streaming deliver the whole reply as one fragment.
    async fn stream(
        &self,
        request: CompletionRequest,
        on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<String, LlmError> {
        let text = self.complete(request).await?;
        on_token(&text);
        Ok(text)
    }
}

// ── OpenRouter client ──

pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenRouterClient {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: OPENROUTER_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(self.endpoint())
            .headers(openrouter_headers(&self.api_key)?)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .map_err(|e| LlmError::Network(format!("Read error: {}", e)))?;
            return Err(map_api_error(status, &error_text));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmBackend for OpenRouterClient {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let body = request.body(&self.model, false);
        debug!(model = %body["model"], "chat completion request");
        let response = self.post(&body).await?;
        let data: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        data["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message.content".to_string()))
    }

    async fn stream(
        &self,
        request: CompletionRequest,
        on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<String, LlmError> {
        let body = request.body(&self.model, true);
        debug!(model = %body["model"], "streaming chat completion request");
        let mut response = self.post(&body).await?;

        let mut decoder = SseDecoder::default();
        let mut all_text = String::new();

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| LlmError::Network(format!("Stream error: {}", e)))?
        {
            for token in decoder.push(&chunk) {
                all_text.push_str(&token);
                on_token(&token);
            }
        }
        for token in decoder.finish() {
            all_text.push_str(&token);
            on_token(&token);
        }

        Ok(all_text)
    }
}

// ── Helpers ──

fn openrouter_headers(api_key: &str) -> Result<HeaderMap, LlmError> {
    let mut headers = HeaderMap::new();
    let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key))
        .map_err(|_| LlmError::Config("API key contains invalid characters".to_string()))?;
    headers.insert(AUTHORIZATION, bearer);
    headers.insert("HTTP-Referer", HeaderValue::from_static("https://debatemate.app"));
    headers.insert("X-Title", HeaderValue::from_static("DebateMate"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

fn map_api_error(status: reqwest::StatusCode, body: &str) -> LlmError {
    let message = match status.as_u16() {
        401 => "Invalid API key. Check your key at openrouter.ai/keys".to_string(),
        402 => "Insufficient credits. Visit openrouter.ai to add funds.".to_string(),
        429 => "Rate limited. Please wait a moment and try again.".to_string(),
        400 if body.contains("model_not_found") || body.contains("not found") => {
            "Model not found. Check the model ID at openrouter.ai/models".to_string()
        }
        500 | 502 | 503 => "OpenRouter is temporarily unavailable. Try again in a moment.".to_string(),
        _ => format!("API error ({}): {}", status, body),
    };
    LlmError::Api { status: status.as_u16(), message }
}

// ── Server-sent event decoding ──
// Streamed completions arrive as `data: {...}` lines; a line (or a UTF-8
// sequence) may be split across network chunks, so incomplete tails stay
// buffered as raw bytes.

#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes, return the content fragments of every complete line.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut tokens = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            tokens.extend(decode_line(&raw));
        }

        tokens
    }

    /// Decode whatever is left once the stream has ended. The last event may
    /// lack its trailing newline.
    fn finish(&mut self) -> Vec<String> {
        let raw = std::mem::take(&mut self.buffer);
        decode_line(&raw).into_iter().collect()
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let data_str = line.trim_end().strip_prefix("data:")?;
    let data_str = data_str.strip_prefix(' ').unwrap_or(data_str);
    if data_str == "[DONE]" {
        return None;
    }
    let data: Value = serde_json::from_str(data_str).ok()?;
    data["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|content| !content.is_empty())
        .map(str::to_string)
}

/// The widest `open ... close` span of `input`, if any.
pub fn extract_json_span(input: &str, open: char, close: char) -> Option<&str> {
    let start = input.find(open)?;
    let end = input.rfind(close)?;
    (end > start).then(|| &input[start..end + close.len_utf8()])
}

/// Locate the JSON payload inside a model reply that may wrap it in prose or
/// code fences: the widest `{...}` span, else the widest `[...]` span.
pub fn extract_json_like(input: &str) -> Option<&str> {
    extract_json_span(input, '{', '}').or_else(|| extract_json_span(input, '[', ']'))
}

#[cfg(test)]
pub mod testing {
    //! Scripted backend for tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays queued outcomes in order and records every request it saw.
    /// Once the queue is empty it fails with `Network`.
    #[derive(Default)]
    pub struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        pub requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedBackend {
        pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn replying(text: &str) -> Self {
            Self::new(vec![Ok(text.to_string())])
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().expect("requests lock").len()
        }
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
            self.requests.lock().expect("requests lock").push(request);
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Network("script exhausted".to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_sse_decoder_handles_split_lines_and_done_marker() {
        let mut decoder = SseDecoder::default();

        let first = decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choi");
        assert_eq!(first, vec!["Hel".to_string()]);

        let second = decoder.push(b"ces\":[{\"delta\":{\"content\":\"lo\"}}]}\n: keep-alive\ndata: [DONE]\n");
        assert_eq!(second, vec!["lo".to_string()]);
        assert!(decoder.buffer.is_empty());
    }

    #[test]
    fn unit_sse_decoder_skips_malformed_and_empty_deltas() {
        let mut decoder = SseDecoder::default();
        let tokens = decoder.push(
            b"data: not-json\ndata: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n",
        );
        assert!(tokens.is_empty());
    }

    #[test]
    fn unit_sse_decoder_accepts_data_without_space_and_flushes_tail() {
        let mut decoder = SseDecoder::default();
        let tokens = decoder.push(b"data:{\"choices\":[{\"delta\":{\"content\":\"tight\"}}]}\ndata: {\"choices\":[{\"delta\":{\"content\":\"last\"}}]}");
        assert_eq!(tokens, vec!["tight".to_string()]);

        assert_eq!(decoder.finish(), vec!["last".to_string()]);
        assert!(decoder.buffer.is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn unit_map_api_error_translates_common_statuses() {
        let err = map_api_error(reqwest::StatusCode::UNAUTHORIZED, "");
        assert!(err.to_string().contains("Invalid API key"));

        let err = map_api_error(reqwest::StatusCode::BAD_REQUEST, "{\"error\":\"model_not_found\"}");
        assert!(err.to_string().contains("Model not found"));

        let err = map_api_error(reqwest::StatusCode::IM_A_TEAPOT, "short and stout");
        assert!(err.to_string().contains("418"));
        assert!(err.to_string().contains("short and stout"));
    }

    #[test]
    fn unit_extract_json_like_finds_object_then_array() {
        assert_eq!(
            extract_json_like("Sure! ```json\n{\"clarity\": 80}\n``` done"),
            Some("{\"clarity\": 80}")
        );
        assert_eq!(extract_json_like("Found: [{\"a\":1}]"), Some("{\"a\":1}"));
        assert_eq!(extract_json_like("Found: []"), Some("[]"));
        assert_eq!(extract_json_like("nothing here"), None);
        assert_eq!(extract_json_like("} backwards {"), None);
    }

    #[test]
    fn unit_request_body_prepends_system_prompt_and_honours_model_override() {
        let request = CompletionRequest::prompt("be terse", "hello")
            .with_sampling(0.2, 300)
            .with_model(Some("custom/model".to_string()));
        let body = request.body("default/model", false);

        assert_eq!(body["model"], "custom/model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["max_tokens"], 300);
        assert_eq!(body["stream"], false);

        let body = CompletionRequest::prompt("s", "p").with_model(Some(String::new())).body("default/model", true);
        assert_eq!(body["model"], "default/model");
    }

    #[test]
    fn unit_client_requires_api_key() {
        let result = OpenRouterClient::new("  ", "m", Duration::from_secs(5));
        assert!(matches!(result, Err(LlmError::MissingApiKey)));
    }

    /// Streams each word as a fragment built inside the loop.
    struct WordStreamer;

    #[async_trait]
    impl LlmBackend for WordStreamer {
        fn name(&self) -> &str {
            "words"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<String, LlmError> {
            Ok("alpha beta".to_string())
        }

        async fn stream(
            &self,
            request: CompletionRequest,
            on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
        ) -> Result<String, LlmError> {
            let full = self.complete(request).await?;
            for word in full.split(' ') {
                let fragment = format!("{word} ");
                on_token(&fragment);
            }
            Ok(full)
        }
    }

    #[tokio::test]
    async fn unit_stream_callback_accepts_short_lived_fragments() {
        let backend: &dyn LlmBackend = &WordStreamer;
        let mut seen = String::new();
        let text = backend
            .stream(CompletionRequest::prompt("s", "p"), &mut |t: &str| seen.push_str(t))
            .await
            .expect("word stream");
        assert_eq!(text, "alpha beta");
        assert_eq!(seen, "alpha beta ");
    }

    #[tokio::test]
    async fn unit_default_stream_emits_whole_reply_once() {
        let backend = testing::ScriptedBackend::replying("full reply");
        let mut seen = Vec::new();
        let text = backend
            .stream(CompletionRequest::prompt("s", "p"), &mut |t: &str| seen.push(t.to_string()))
            .await
            .expect("scripted reply");
        assert_eq!(text, "full reply");
        assert_eq!(seen, vec!["full reply".to_string()]);
    }
}
