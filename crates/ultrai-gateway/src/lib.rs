use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_BUDGET: Duration = Duration::from_secs(45);

const MAX_ATTEMPTS: u32 = 2;
const BACKOFF_BASE_MS: u64 = 300;
const BACKOFF_CAP_MS: u64 = 2_000;

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub text: String,
    pub finish_reason: String,
    pub ms: u64,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("payment required: {0}")]
    PaymentRequired(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("mid-stream error from model `{0}`")]
    MidStream(String),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream error (status {status}): {detail}")]
    Upstream { status: u16, detail: String },
}

impl GatewayError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, GatewayError::RateLimited(_))
    }

    /// One retry is allowed for connect-level failures, 5xx, and the first
    /// 429. Client errors, timeouts, and mid-stream failures go straight to
    /// the caller.
    fn retryable(&self) -> bool {
        match self {
            GatewayError::Transport(_) | GatewayError::RateLimited(_) => true,
            GatewayError::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// The seam between the orchestration engine and the upstream LLM service.
/// The production implementation is [`GatewayClient`]; tests inject scripted
/// fakes.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Single chat-completions call against one model.
    async fn call(
        &self,
        model: &str,
        messages: &[ChatMessage],
        timeout: Duration,
    ) -> GatewayResult<ChatCompletion>;

    /// Model IDs the upstream currently reports as serviceable.
    async fn ready_models(&self) -> GatewayResult<Vec<String>>;
}

pub struct GatewayClient {
    client: Client,
    base_url: String,
    api_key: String,
    site_url: String,
    site_name: String,
}

impl GatewayClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        site_url: impl Into<String>,
        site_name: impl Into<String>,
    ) -> GatewayResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(DEFAULT_READ_BUDGET)
            .build()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url: normalize_base(&base_url.into()),
            api_key: api_key.into(),
            site_url: site_url.into(),
            site_name: site_name.into(),
        })
    }

    /// Credential reading is confined here; everything downstream receives a
    /// constructed client.
    pub fn from_env() -> GatewayResult<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| GatewayError::Auth("OPENROUTER_API_KEY is not set".to_string()))?;
        let site_url = std::env::var("YOUR_SITE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "https://github.com/ultrai/ultrai".to_string());
        let site_name = std::env::var("YOUR_SITE_NAME")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "UltrAI".to_string());
        Self::new(DEFAULT_BASE_URL, api_key, site_url, site_name)
    }

    async fn attempt_call(
        &self,
        model: &str,
        messages: &[ChatMessage],
        timeout: Duration,
    ) -> GatewayResult<ChatCompletion> {
        let body = json!({
            "model": model,
            "messages": messages
                .iter()
                .map(|m| json!({"role": m.role, "content": m.content}))
                .collect::<Vec<_>>(),
        });

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.site_url)
            .header("X-Title", &self.site_name)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| classify_send_error(err, timeout))?;

        let status = response.status().as_u16();
        let value: Value = response
            .json()
            .await
            .map_err(|err| classify_send_error(err, timeout))?;

        if status != 200 {
            return Err(classify_status(status, &value));
        }
        if let Some(detail) = extract_error(&value) {
            return Err(GatewayError::Upstream { status, detail });
        }

        let finish_reason = extract_finish_reason(&value).unwrap_or_else(|| "stop".to_string());
        // A 200 whose first choice finished with "error" is a failure, not a
        // degraded success.
        if finish_reason == "error" {
            return Err(GatewayError::MidStream(model.to_string()));
        }

        let Some(text) = extract_text(&value) else {
            return Err(GatewayError::Upstream {
                status,
                detail: format!("no completion content for model `{model}`"),
            });
        };

        Ok(ChatCompletion {
            text,
            finish_reason,
            ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn attempt_ready_models(&self) -> GatewayResult<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.site_url)
            .header("X-Title", &self.site_name)
            .send()
            .await
            .map_err(|err| classify_send_error(err, DEFAULT_READ_BUDGET))?;

        let status = response.status().as_u16();
        let value: Value = response
            .json()
            .await
            .map_err(|err| classify_send_error(err, DEFAULT_READ_BUDGET))?;
        if status != 200 {
            return Err(classify_status(status, &value));
        }
        Ok(extract_model_ids(&value))
    }
}

#[async_trait]
impl Gateway for GatewayClient {
    async fn call(
        &self,
        model: &str,
        messages: &[ChatMessage],
        timeout: Duration,
    ) -> GatewayResult<ChatCompletion> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt_call(model, messages, timeout).await {
                Ok(completion) => return Ok(completion),
                Err(err) if attempt < MAX_ATTEMPTS && err.retryable() => {
                    let delay = backoff_delay(attempt);
                    debug!(model, attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying gateway call");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(model, attempt, error = %err, "gateway call failed");
                    return Err(err);
                }
            }
        }
    }

    async fn ready_models(&self) -> GatewayResult<Vec<String>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt_ready_models().await {
                Ok(models) => return Ok(models),
                Err(err) if attempt < MAX_ATTEMPTS && err.retryable() => {
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn normalize_base(input: &str) -> String {
    input.trim_end_matches('/').to_string()
}

fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE_MS.saturating_mul(1 << attempt.saturating_sub(1));
    Duration::from_millis(exp.min(BACKOFF_CAP_MS))
}

fn classify_send_error(err: reqwest::Error, timeout: Duration) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout(timeout)
    } else {
        GatewayError::Transport(err.to_string())
    }
}

fn classify_status(status: u16, body: &Value) -> GatewayError {
    let detail = extract_error(body).unwrap_or_else(|| format!("HTTP {status}"));
    match status {
        401 | 403 => GatewayError::Auth(detail),
        402 => GatewayError::PaymentRequired(detail),
        429 => GatewayError::RateLimited(detail),
        _ => GatewayError::Upstream { status, detail },
    }
}

fn extract_error(value: &Value) -> Option<String> {
    value
        .get("error")
        .and_then(|v| v.get("message"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn extract_finish_reason(value: &Value) -> Option<String> {
    value
        .get("choices")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("finish_reason"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn extract_text(value: &Value) -> Option<String> {
    value
        .get("choices")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("message"))
        .and_then(|v| v.get("content"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn extract_model_ids(value: &Value) -> Vec<String> {
    let entries = value
        .get("data")
        .and_then(|v| v.as_array())
        .or_else(|| value.as_array());
    entries
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m.get("id").and_then(|v| v.as_str()))
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}
