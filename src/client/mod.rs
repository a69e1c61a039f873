//! Client Module
//!
//! Provider adapter contract, the HTTP adapter, and rate limiting.

pub mod adapter;
pub mod http;
pub mod rate_limiter;

pub use adapter::{AdapterRequest, AdapterResponse, ProviderAdapter};
pub use http::OpenAiCompatibleAdapter;
pub use rate_limiter::{RateLimiter, UserRateLimiter, UserUsage};
