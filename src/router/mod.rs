//! Router Module
//!
//! Provider registry, key rotation, usage/health tracking and the request log.

pub mod health;
pub mod key_pool;
pub mod registry;
pub mod request_log;

pub use health::{UsageStats, UsageTracker};
pub use key_pool::{ApiKey, KeyPool, KeyPoolStats};
pub use registry::{ProviderEntry, ProviderRegistry};
pub use request_log::{RequestLog, RequestLogEntry, RequestLogStats};
