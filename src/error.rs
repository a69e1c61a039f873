//! Router Error Types
//!
//! Two layers: `ProviderError` classifies a single adapter failure, and
//! `RouterError` is what a caller of `Router::generate` gets back.

use crate::client::UserUsage;
use crate::config::ProviderId;
use std::time::Duration;
use thiserror::Error;

/// Classified failure raised by a provider adapter
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// The call did not finish within the provider's timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection or non-success HTTP status
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered with something we could not decode
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Credential rejected by the provider
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Provider-side throttling (HTTP 429 and friends)
    #[error("rate limited by provider{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// The adapter cannot serve this request at all
    #[error("unsupported request: {0}")]
    Unsupported(String),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(", retry after {}s", d.as_secs()),
        None => String::new(),
    }
}

impl ProviderError {
    /// Whether another attempt against the same provider may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_)
                | ProviderError::Transport(_)
                | ProviderError::RateLimited { .. }
        )
    }

    /// Whether the credential that was used should be rotated out
    pub fn is_key_failure(&self) -> bool {
        matches!(
            self,
            ProviderError::Authentication(_) | ProviderError::RateLimited { .. }
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(Duration::ZERO)
        } else if err.is_connect() {
            ProviderError::Transport(format!("connection failed: {}", err))
        } else if err.is_decode() {
            ProviderError::Malformed(format!("failed to decode response: {}", err))
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Malformed(format!("JSON parsing error: {}", err))
    }
}

/// Error returned to callers of the router
#[derive(Debug, Error)]
pub enum RouterError {
    /// No enabled, credentialed, healthy provider to try
    #[error("no AI providers available")]
    NoProviderAvailable,

    /// A candidate was skipped by local admission control
    #[error("provider '{provider}' is rate limited locally, retry in {}s", .retry_after.as_secs())]
    RateLimited {
        provider: ProviderId,
        retry_after: Duration,
    },

    /// The calling user exhausted their own budget
    #[error("user {user_id} rate limit exceeded")]
    UserRateLimited { user_id: u64, usage: UserUsage },

    /// A single provider failed and fallback was disabled
    #[error("provider '{provider}' failed: {source}")]
    Provider {
        provider: ProviderId,
        #[source]
        source: ProviderError,
    },

    /// Every candidate was tried or skipped without success
    #[error("all providers failed: {last_error}")]
    AllProvidersFailed { last_error: String },

    /// Invalid or unreadable configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for RouterError {
    fn from(err: std::io::Error) -> Self {
        RouterError::Config(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for RouterError {
    fn from(err: serde_json::Error) -> Self {
        RouterError::Config(format!("JSON parsing error: {}", err))
    }
}

/// Result type alias for router operations
pub type Result<T> = std::result::Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ProviderError::Transport("reset".into()).is_retryable());
        assert!(ProviderError::RateLimited { retry_after: None }.is_retryable());
        assert!(!ProviderError::Authentication("bad key".into()).is_retryable());
        assert!(!ProviderError::Malformed("{".into()).is_retryable());
    }

    #[test]
    fn test_display_messages() {
        let err = ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(err.to_string(), "rate limited by provider, retry after 30s");

        let err = RouterError::AllProvidersFailed {
            last_error: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "all providers failed: boom");
    }
}
