//! API Module
//!
//! Request/response envelopes and administrative report types.

pub mod generate;
pub mod report;

pub use generate::{GenerateRequest, GenerateResponse, Priority};
pub use report::{
    HealthReport, ProviderHealth, ProviderUsage, RateLimitStatus, UsageReport, UsageTotals,
};
