//! Generation API
//!
//! Inbound request and outbound response envelopes for `Router::generate`.

use crate::cache::ResponseCache;
use crate::config::ProviderId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How urgently the caller needs an answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low = 1,
    #[default]
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl Priority {
    /// High and critical requests bypass local rate limiting
    pub fn is_high(self) -> bool {
        self >= Priority::High
    }
}

/// Generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,

    /// Preferred model; each provider falls back to its default if unsupported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Pin the request to one provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_true")]
    pub use_cache: bool,

    #[serde(default = "default_true")]
    pub allow_fallback: bool,

    #[serde(default)]
    pub priority: Priority,

    /// Caller identity for per-user rate limiting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,

    /// Vendor-specific options, part of the cache key
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, serde_json::Value>,
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_true() -> bool {
    true
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            provider: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            use_cache: true,
            allow_fallback: true,
            priority: Priority::Normal,
            user_id: None,
            options: BTreeMap::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_provider(mut self, provider: ProviderId) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_fallback(mut self, allow_fallback: bool) -> Self {
        self.allow_fallback = allow_fallback;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_user(mut self, user_id: u64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Cache key over prompt, model, sampling parameters and options.
    ///
    /// Caller options are nested under their own name so an option that
    /// shares a name with a sampling field cannot overwrite it.
    pub fn cache_key(&self) -> String {
        let mut params = BTreeMap::new();
        params.insert("max_tokens".to_string(), self.max_tokens.into());
        params.insert("temperature".to_string(), self.temperature.into());
        params.insert(
            "options".to_string(),
            serde_json::Value::Object(self.options.clone().into_iter().collect()),
        );
        ResponseCache::key_for(&self.prompt, self.model.as_deref(), &params)
    }
}

/// Successful generation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateResponse {
    pub text: String,
    pub provider_used: ProviderId,
    pub model_used: String,
    pub tokens_used: u64,
    pub latency_ms: f64,
    pub served_from_cache: bool,

    /// Calls made to the provider that answered; zero for cache hits
    pub attempts: u32,
}

/// What the router stores in the response cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CachedResponse {
    pub text: String,
    pub provider: ProviderId,
    pub model: String,
}

impl CachedResponse {
    pub fn into_response(self) -> GenerateResponse {
        GenerateResponse {
            text: self.text,
            provider_used: self.provider,
            model_used: self.model,
            tokens_used: 0,
            latency_ms: 0.0,
            served_from_cache: true,
            attempts: 0,
        }
    }
}
