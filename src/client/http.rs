//! OpenAI-compatible HTTP Adapter
//!
//! Talks to any `/chat/completions` endpoint and classifies failures into
//! `ProviderError` variants the router understands.

use crate::client::adapter::{AdapterRequest, AdapterResponse, ProviderAdapter};
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u64,
}

/// Adapter for vendors exposing an OpenAI-style chat completions API
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleAdapter {
    client: Client,
}

impl OpenAiCompatibleAdapter {
    pub fn new() -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| ProviderError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    fn headers(api_key: &str) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| ProviderError::Authentication(format!("Invalid API key format: {}", e)))?,
        );
        Ok(headers)
    }

    fn body(request: &AdapterRequest, model: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        if let Some(obj) = body.as_object_mut() {
            for (key, value) in &request.extra {
                obj.insert(key.clone(), value.clone());
            }
        }

        body
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    async fn call(&self, request: &AdapterRequest) -> Result<AdapterResponse, ProviderError> {
        let base_url = request
            .base_url
            .as_deref()
            .ok_or_else(|| ProviderError::Unsupported("no base_url configured".to_string()))?;
        let model = request
            .model
            .as_deref()
            .ok_or_else(|| ProviderError::Unsupported("no model configured".to_string()))?;
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .headers(Self::headers(&request.api_key)?)
            .json(&Self::body(request, model))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body = response.text().await?;
            let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
                ProviderError::Malformed(format!(
                    "Failed to parse response: {}. Body: {}",
                    e,
                    truncate(&body, 500)
                ))
            })?;

            let text = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| ProviderError::Malformed("response has no content".to_string()))?;

            return Ok(AdapterResponse {
                text,
                model: parsed.model.unwrap_or_else(|| model.to_string()),
                tokens_used: parsed.usage.map(|u| u.total_tokens).unwrap_or(0),
            });
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.unwrap_or_default();

        Err(classify_status(status, &body, retry_after))
    }
}

fn classify_status(status: StatusCode, body: &str, retry_after: Option<Duration>) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS || is_rate_limit_body(body) {
        return ProviderError::RateLimited { retry_after };
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return ProviderError::Authentication(truncate(body, 200).to_string());
    }

    ProviderError::Transport(format!(
        "Request failed with status {}: {}",
        status,
        truncate(body, 200)
    ))
}

/// Some providers return 400 or 403 with rate limit messages
fn is_rate_limit_body(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
        || lower.contains("quota exceeded")
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Parse a retry-after value: plain seconds, or a duration like "1m30s", "2h", "500ms"
fn parse_retry_after(s: &str) -> Option<Duration> {
    let s = s.trim();

    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    if let Some(stripped) = s.strip_suffix("ms") {
        return stripped.parse::<u64>().ok().map(Duration::from_millis);
    }

    if s.contains('h') || (s.contains('m') && s.contains('s')) {
        let mut total_secs = 0u64;
        let mut current_num = String::new();

        for c in s.chars() {
            if c.is_ascii_digit() {
                current_num.push(c);
            } else if !current_num.is_empty() {
                let n = current_num.parse::<u64>().ok()?;
                let unit = match c {
                    'h' => 3600,
                    'm' => 60,
                    's' => 1,
                    _ => 0,
                };
                total_secs = n.checked_mul(unit)?.checked_add(total_secs)?;
                current_num.clear();
            }
        }

        if total_secs > 0 {
            return Some(Duration::from_secs(total_secs));
        }
    }

    if let Some(stripped) = s.strip_suffix('s') {
        let secs = stripped.parse::<f64>().ok()?;
        return Duration::try_from_secs_f64(secs).ok();
    }
    if let Some(stripped) = s.strip_suffix('m') {
        let mins = stripped.parse::<u64>().ok()?;
        return mins.checked_mul(60).map(Duration::from_secs);
    }

    None
}
