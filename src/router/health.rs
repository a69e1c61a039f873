//! Usage and Health Tracking
//!
//! Running per-provider statistics plus the binary health flag the router
//! uses as its circuit breaker. Health flips on every outcome: any failure
//! marks a provider unhealthy, the next success marks it healthy again.

use crate::config::ProviderId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Accumulated statistics for one provider
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub avg_latency_ms: f64,
    pub last_request: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct ProviderTrack {
    cost_per_1000_tokens: f64,
    stats: Mutex<UsageStats>,
    healthy: AtomicBool,
}

#[derive(Debug, Default)]
pub struct UsageTracker {
    providers: HashMap<ProviderId, ProviderTrack>,
}

impl UsageTracker {
    /// Track the given providers; every provider starts healthy
    pub fn new(providers: impl IntoIterator<Item = (ProviderId, f64)>) -> Self {
        Self {
            providers: providers
                .into_iter()
                .map(|(id, cost)| {
                    (
                        id,
                        ProviderTrack {
                            cost_per_1000_tokens: cost,
                            stats: Mutex::new(UsageStats::default()),
                            healthy: AtomicBool::new(true),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Fold one attempt outcome into the provider's statistics
    pub fn record_attempt(&self, provider: ProviderId, tokens: u64, latency_ms: f64, success: bool) {
        let Some(track) = self.providers.get(&provider) else {
            tracing::debug!(provider = %provider, "ignoring attempt for untracked provider");
            return;
        };

        let mut stats = track.stats.lock();
        stats.total_requests += 1;
        stats.total_tokens += tokens;
        stats.last_request = Some(Utc::now());

        if success {
            stats.successful_requests += 1;
        } else {
            stats.failed_requests += 1;
        }

        let n = stats.total_requests as f64;
        stats.avg_latency_ms += (latency_ms - stats.avg_latency_ms) / n;
        stats.total_cost += (tokens as f64 / 1000.0) * track.cost_per_1000_tokens;
    }

    pub fn mark_healthy(&self, provider: ProviderId) {
        if let Some(track) = self.providers.get(&provider) {
            track.healthy.store(true, Ordering::Release);
        }
    }

    pub fn mark_unhealthy(&self, provider: ProviderId, reason: &str) {
        if let Some(track) = self.providers.get(&provider) {
            track.healthy.store(false, Ordering::Release);
            tracing::warn!(provider = %provider, error = reason, "provider marked unhealthy");
        }
    }

    /// Untracked providers are never healthy
    pub fn is_healthy(&self, provider: ProviderId) -> bool {
        self.providers
            .get(&provider)
            .is_some_and(|t| t.healthy.load(Ordering::Acquire))
    }

    pub fn stats(&self, provider: ProviderId) -> Option<UsageStats> {
        self.providers.get(&provider).map(|t| t.stats.lock().clone())
    }

    pub fn reset_health(&self) {
        for track in self.providers.values() {
            track.healthy.store(true, Ordering::Release);
        }
    }

    pub fn reset_stats(&self) {
        for track in self.providers.values() {
            *track.stats.lock() = UsageStats::default();
        }
    }
}
