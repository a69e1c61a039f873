//! Administrative Reports
//!
//! Serializable snapshots returned by `Router::usage_report` and
//! `Router::health_check`.

use crate::cache::CacheStats;
use crate::config::ProviderId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReport {
    pub providers: BTreeMap<ProviderId, ProviderUsage>,
    pub totals: UsageTotals,
    pub cache: CacheStats,
}

/// Per-provider usage; cost rounded to 4 decimals, latency to 2
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderUsage {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub avg_latency_ms: f64,
    pub last_request: Option<DateTime<Utc>>,
    pub healthy: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageTotals {
    pub requests: u64,
    pub tokens: u64,
    pub cost: f64,

    /// Percentage of successful requests, 0 when nothing was recorded
    pub success_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitStatus {
    Ok,
    Limited,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderHealth {
    /// An adapter is registered for the provider
    pub configured: bool,
    pub api_key_present: bool,
    pub enabled: bool,
    pub healthy: bool,
    pub rate_limit_status: RateLimitStatus,
}

pub type HealthReport = BTreeMap<ProviderId, ProviderHealth>;
