//! OpenAI-compatible chat-completions adapter. Works against any endpoint
//! speaking that dialect (hosted or local). SSE streaming with manual line
//! parsing, simple token-bucket rate limiting, bounded retry.
//! Lowest-priority catch-all: slower and less literal than dedicated MT,
//! but supports any language pair.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{Provider, ProviderError, ProviderReply};

/// System prompt kept short; the user payload carries the languages.
const SYSTEM_PROMPT: &str =
    "You are a translator. Output only the translation, nothing else.";

pub struct ChatLlmProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    /// Token-bucket: tracks the next allowed request time.
    next_allowed: Arc<tokio::sync::Mutex<Instant>>,
    /// Minimum interval between requests.
    min_interval: Duration,
}

impl ChatLlmProvider {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::Api(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            next_allowed: Arc::new(tokio::sync::Mutex::new(Instant::now())),
            min_interval: Duration::from_millis(100), // 10 req/s
        })
    }

    /// Wait until the rate limiter allows a request.
    async fn rate_limit_wait(&self) {
        let mut next = self.next_allowed.lock().await;
        let now = Instant::now();
        if *next > now {
            tokio::time::sleep(*next - now).await;
        }
        *next = Instant::now() + self.min_interval;
    }

    /// Send request with retry.
    /// 429: Retry-After or 1s/2s/4s (max 3).
    /// 5xx: exponential backoff (max 2).
    /// Timeout: immediate retry once.
    async fn send_with_retry(
        &self,
        body: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut attempt: u32 = 0;
        let max_429_retries: u32 = 3;
        let max_5xx_retries: u32 = 2;
        let mut timeout_retried = false;

        loop {
            let result = self
                .http
                .post(format!("{}/v1/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(resp);
                }
                Ok(resp) if resp.status().as_u16() == 429 => {
                    if attempt >= max_429_retries {
                        return Err(ProviderError::RateLimited { retry_after_ms: 0 });
                    }
                    let wait = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| Duration::from_secs(1 << attempt));
                    warn!(attempt, wait_ms = wait.as_millis() as u64, "429 rate limited, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                    }
                    attempt += 1;
                }
                Ok(resp) if resp.status().is_server_error() => {
                    if attempt >= max_5xx_retries {
                        return Err(ProviderError::Api(format!(
                            "server error: {}",
                            resp.status()
                        )));
                    }
                    let wait = Duration::from_millis(500 * (1 << attempt));
                    warn!(
                        attempt,
                        status = resp.status().as_u16(),
                        wait_ms = wait.as_millis() as u64,
                        "5xx error, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                    }
                    attempt += 1;
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body_text = resp.text().await.unwrap_or_default();
                    return Err(ProviderError::Api(format!(
                        "unexpected status {}: {}",
                        status,
                        body_text.chars().take(200).collect::<String>()
                    )));
                }
                Err(e) if e.is_timeout() => {
                    if timeout_retried {
                        return Err(ProviderError::Timeout);
                    }
                    warn!("request timeout, retrying once");
                    timeout_retried = true;
                }
                Err(e) => {
                    return Err(ProviderError::Api(e.to_string()));
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Provider for ChatLlmProvider {
    fn id(&self) -> &str {
        "chat-llm"
    }

    fn priority(&self) -> u8 {
        30
    }

    fn default_confidence(&self) -> f32 {
        0.7
    }

    async fn translate(
        &self,
        text: &str,
        src: &str,
        tgt: &str,
        cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        self.rate_limit_wait().await;

        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_user_prompt(text, src, tgt)}
            ],
            "max_tokens": estimate_max_tokens(text),
            "stream": true,
            "temperature": 0.1
        });

        let response = self.send_with_retry(&body, cancel).await?;

        // Parse the SSE stream, accumulating content deltas into full text.
        let mut full_text = String::new();
        let mut stream = response.bytes_stream();
        // Line buffer for partial lines across chunks.
        let mut line_buf = String::new();

        while let Some(chunk_result) = tokio::select! {
            chunk = stream.next() => chunk,
            _ = cancel.cancelled() => {
                return Err(ProviderError::Cancelled);
            }
        } {
            let bytes = chunk_result.map_err(|e| ProviderError::Api(e.to_string()))?;
            line_buf.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(newline_pos) = line_buf.find('\n') {
                let line = line_buf[..newline_pos].trim().to_string();
                line_buf = line_buf[newline_pos + 1..].to_string();

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data == "[DONE]" {
                    continue;
                }
                if let Ok(parsed) = serde_json::from_str::<SseChunk>(data) {
                    if let Some(choice) = parsed.choices.first() {
                        if let Some(ref content) = choice.delta.content {
                            full_text.push_str(content);
                        }
                    }
                }
            }
        }

        Ok(ProviderReply::Text(full_text.trim().to_string()))
    }
}

/// Compact user prompt: {"t":"text","s":"src","l":"tgt"}.
fn build_user_prompt(text: &str, src: &str, tgt: &str) -> String {
    serde_json::json!({ "t": text, "s": src, "l": tgt }).to_string()
}

/// Estimate max_tokens: (input_tokens * 1.15 + 32), clamped to [64, 768].
fn estimate_max_tokens(text: &str) -> u32 {
    // Rough: ~4 chars/token for Latin, ~1.5 for CJK
    let estimated_input_tokens = text.len() as f64 / 3.0;
    let max = (estimated_input_tokens * 1.15 + 32.0) as u32;
    max.clamp(64, 768)
}

// --- SSE response types ---

#[derive(Deserialize)]
struct SseChunk {
    choices: Vec<SseChoice>,
}

#[derive(Deserialize)]
struct SseChoice {
    delta: SseDelta,
}

#[derive(Deserialize)]
struct SseDelta {
    content: Option<String>,
}
