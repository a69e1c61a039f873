//! Provider Configuration
//!
//! Defines the configuration schema for providers and router behaviour.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Stable identity of a configured provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Local,
}

impl ProviderId {
    /// Lowercase tag used in config files and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "gemini",
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Local => "local",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(ProviderId::Gemini),
            "openai" => Ok(ProviderId::OpenAi),
            "anthropic" => Ok(ProviderId::Anthropic),
            "local" => Ok(ProviderId::Local),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Provider descriptors keyed by provider id
    #[serde(default)]
    pub providers: BTreeMap<ProviderId, ProviderDescriptor>,

    /// Response cache settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// Failover and retry behaviour
    #[serde(default)]
    pub routing: RoutingSettings,

    /// Per-user admission control
    #[serde(default)]
    pub user_limits: UserLimitSettings,
}

/// Static description of one candidate provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Credential lookup key (an environment variable name)
    pub api_key_env: String,

    /// Optional base endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_max_requests")]
    pub max_requests_per_window: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens_per_window: u64,

    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    #[serde(default)]
    pub cost_per_1000_tokens: f64,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Lower values are tried first
    #[serde(default = "default_priority")]
    pub priority: u32,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Supported model names; the first one is the default
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
}

fn default_max_requests() -> u32 {
    60
}

fn default_max_tokens() -> u64 {
    100_000
}

fn default_window_seconds() -> u64 {
    60
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_priority() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl ProviderDescriptor {
    /// Create a descriptor with default limits for the given credential key
    pub fn new(api_key_env: impl Into<String>) -> Self {
        Self {
            api_key_env: api_key_env.into(),
            base_url: None,
            max_requests_per_window: default_max_requests(),
            max_tokens_per_window: default_max_tokens(),
            window_seconds: default_window_seconds(),
            cost_per_1000_tokens: 0.0,
            timeout_seconds: default_timeout_seconds(),
            priority: default_priority(),
            enabled: true,
            models: Vec::new(),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Name of the variable holding extra comma-separated keys for rotation
    pub fn additional_keys_env(&self) -> String {
        format!("{}_ADDITIONAL", self.api_key_env)
    }

    /// Pick the model to send to this provider.
    ///
    /// A requested model is passed through when this provider lists it (or
    /// lists nothing); otherwise the provider's default model is used.
    pub fn resolve_model(&self, requested: Option<&str>) -> Option<String> {
        match requested {
            Some(model) if self.models.is_empty() || self.models.iter().any(|m| m == model) => {
                Some(model.to_string())
            }
            _ => self.models.first().cloned(),
        }
    }
}

/// Response cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Default time-to-live for cached responses
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,

    #[serde(default = "default_cache_size")]
    pub max_cache_size: usize,
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_cache_size() -> usize {
    1000
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl(),
            max_cache_size: default_cache_size(),
        }
    }
}

/// Failover and retry behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSettings {
    /// Global switch; when false, the first provider failure is returned
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,

    /// Attempts per candidate for retryable failures
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_base_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_ms")]
    pub retry_max_delay_ms: u64,

    /// Capacity of the in-memory request log
    #[serde(default = "default_request_log_size")]
    pub request_log_size: usize,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    1_000
}

fn default_retry_max_ms() -> u64 {
    30_000
}

fn default_request_log_size() -> usize {
    1000
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            fallback_enabled: true,
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_ms(),
            retry_max_delay_ms: default_retry_max_ms(),
            request_log_size: default_request_log_size(),
        }
    }
}

/// Per-user admission control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLimitSettings {
    #[serde(default = "default_user_requests")]
    pub max_requests_per_window: u32,

    #[serde(default = "default_user_tokens")]
    pub max_tokens_per_window: u64,

    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

fn default_user_requests() -> u32 {
    20
}

fn default_user_tokens() -> u64 {
    50_000
}

impl Default for UserLimitSettings {
    fn default() -> Self {
        Self {
            max_requests_per_window: default_user_requests(),
            max_tokens_per_window: default_user_tokens(),
            window_seconds: default_window_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_descriptor_defaults() {
        let json = r#"{
            "api_key_env": "EXAMPLE_API_KEY",
            "priority": 2,
            "models": ["model-a", "model-b"]
        }"#;

        let descriptor: ProviderDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.api_key_env, "EXAMPLE_API_KEY");
        assert_eq!(descriptor.priority, 2);
        assert_eq!(descriptor.window_seconds, 60);
        assert_eq!(descriptor.timeout_seconds, 30);
        assert!(descriptor.enabled);
        assert_eq!(descriptor.models.len(), 2);
    }

    #[test]
    fn test_provider_id_tags() {
        let config: RouterConfig = serde_json::from_str(
            r#"{ "providers": { "openai": { "api_key_env": "OPENAI_API_KEY" } } }"#,
        )
        .unwrap();
        assert!(config.providers.contains_key(&ProviderId::OpenAi));
        assert_eq!(ProviderId::OpenAi.to_string(), "openai");
        assert_eq!("Gemini".parse::<ProviderId>(), Ok(ProviderId::Gemini));
        assert!("mistral".parse::<ProviderId>().is_err());
    }

    #[test]
    fn test_resolve_model() {
        let mut descriptor = ProviderDescriptor::new("KEY");
        assert_eq!(descriptor.resolve_model(Some("anything")), Some("anything".into()));
        assert_eq!(descriptor.resolve_model(None), None);

        descriptor.models = vec!["gpt-4o-mini".into(), "gpt-4o".into()];
        assert_eq!(descriptor.resolve_model(Some("gpt-4o")), Some("gpt-4o".into()));
        assert_eq!(
            descriptor.resolve_model(Some("gemini-1.5-pro")),
            Some("gpt-4o-mini".into())
        );
        assert_eq!(descriptor.resolve_model(None), Some("gpt-4o-mini".into()));
    }
}
