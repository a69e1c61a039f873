//! Provider Adapter Interface
//!
//! One implementation per vendor. The router only ever talks to this trait.

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Normalized request handed to an adapter
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterRequest {
    pub prompt: String,

    /// Model resolved for this provider; `None` lets the adapter choose
    pub model: Option<String>,

    pub max_tokens: u32,
    pub temperature: f32,

    /// Vendor-specific options, passed through untouched
    pub extra: BTreeMap<String, serde_json::Value>,

    /// Credential picked from the provider's key pool
    pub api_key: String,

    pub base_url: Option<String>,
}

/// Normalized adapter result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterResponse {
    pub text: String,
    pub model: String,
    pub tokens_used: u64,
}

/// A vendor binding
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Perform one generation call.
    ///
    /// Implementations should not enforce their own overall deadline; the
    /// router wraps every call in the provider's configured timeout and
    /// drops the future when it expires.
    async fn call(&self, request: &AdapterRequest) -> Result<AdapterResponse, ProviderError>;
}
