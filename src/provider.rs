//! Generation-provider boundary.
//!
//! The corrector talks to an external text-rewriting capability through the
//! [`GenerationProvider`] trait: one instruction in, raw text or an error
//! out. Two implementations ship here:
//! - [`HttpProvider`]: an OpenAI-compatible chat-completions endpoint with an
//!   enforced request timeout.
//! - [`ScriptedProvider`]: a deterministic queue of canned responses for
//!   tests and dry runs.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Per-request knobs passed through to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model name, where the backend routes by model.
    pub model: String,
    /// Completion token cap.
    pub max_tokens: u32,
    /// Sampling temperature. Corrections want low variance.
    pub temperature: f32,
    /// Hard request timeout.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            timeout: Duration::from_secs(60),
        }
    }
}

mod duration_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Failure modes at the provider boundary.
///
/// `error_type()` yields the key the recovery module maps to a strategy.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Request exceeded the enforced timeout.
    #[error("provider request timed out after {0:?}")]
    Timeout(Duration),

    /// Backend signalled rate limiting (HTTP 429 or equivalent).
    #[error("provider rate limited: {0}")]
    RateLimited(String),

    /// Transport-level failure (connect, DNS, TLS).
    #[error("provider network error: {0}")]
    Network(String),

    /// Non-success HTTP status.
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Backend answered but the completion text was empty or unparseable.
    #[error("provider returned an empty or malformed completion")]
    EmptyResponse,

    /// A scripted provider ran out of queued responses.
    #[error("scripted provider exhausted its response queue")]
    Exhausted,
}

impl ProviderError {
    /// Error-type key consumed by the recovery strategy table.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Timeout(_) | Self::Network(_) => "network_error",
            Self::RateLimited(_) => "rate_limit_exceeded",
            Self::Http { .. } | Self::EmptyResponse | Self::Exhausted => "ai_provider_failure",
        }
    }
}

/// External text-generation capability: instruction in, raw text out.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(
        &self,
        instruction: &str,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError>;

    /// Stable provider name for logs and failover bookkeeping.
    fn name(&self) -> &str;
}

/// OpenAI-compatible chat-completions client.
pub struct HttpProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl GenerationProvider for HttpProvider {
    async fn generate(
        &self,
        instruction: &str,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": options.model,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "messages": [{"role": "user", "content": instruction}],
        });

        let mut request = self.client.post(&url).timeout(options.timeout).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(options.timeout)
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RateLimited(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|_| ProviderError::EmptyResponse)?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        tracing::debug!(provider = %self.name, chars = text.len(), "completion received");
        Ok(text)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// One queued scripted reply.
pub enum ScriptedReply {
    Text(String),
    Fail(ProviderError),
}

/// Deterministic provider for tests and dry runs: replays a queue of canned
/// replies, then reports exhaustion.
pub struct ScriptedProvider {
    name: String,
    queue: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>, replies: Vec<ScriptedReply>) -> Self {
        Self {
            name: name.into(),
            queue: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A provider that answers every call with the same text.
    pub fn repeating(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        // 64 replays is more than any bounded session can consume.
        let replies = (0..64).map(|_| ScriptedReply::Text(text.clone())).collect();
        Self::new(name, replies)
    }

    /// Instructions received so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn generate(
        &self,
        instruction: &str,
        _options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(instruction.to_string());
        match self.queue.lock().expect("queue lock").pop_front() {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Fail(err)) => Err(err),
            None => Err(ProviderError::Exhausted),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
