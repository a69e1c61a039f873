//! llmroute - embedded multi-provider LLM request router
//!
//! Routes generation requests across several providers ranked by priority
//! and health, with per-provider rate limiting, a response cache, usage
//! accounting and transparent failover.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod router;

pub use api::{GenerateRequest, GenerateResponse, Priority};
pub use client::{AdapterRequest, AdapterResponse, ProviderAdapter};
pub use config::{ProviderDescriptor, ProviderId, RouterConfig};
pub use error::{ProviderError, Result, RouterError};

use api::generate::CachedResponse;
use api::{HealthReport, ProviderHealth, ProviderUsage, RateLimitStatus, UsageReport, UsageTotals};
use cache::ResponseCache;
use client::{RateLimiter, UserRateLimiter, UserUsage};
use config::{CredentialSource, EnvCredentials, RoutingSettings};
use router::request_log::{round_to, Outcome};
use router::{
    KeyPoolStats, ProviderEntry, ProviderRegistry, RequestLog, RequestLogEntry, RequestLogStats,
    UsageTracker,
};

/// Builder for [`Router`]
pub struct RouterBuilder {
    config: RouterConfig,
    credentials: Box<dyn CredentialSource>,
    adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

impl RouterBuilder {
    /// Resolve credentials from `source` instead of the process environment
    pub fn credentials(mut self, source: impl CredentialSource + 'static) -> Self {
        self.credentials = Box::new(source);
        self
    }

    /// Register the adapter that serves `provider`
    pub fn adapter(self, provider: ProviderId, adapter: impl ProviderAdapter + 'static) -> Self {
        self.shared_adapter(provider, Arc::new(adapter))
    }

    pub fn shared_adapter(mut self, provider: ProviderId, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(provider, adapter);
        self
    }

    pub fn build(self) -> Result<Router> {
        let RouterConfig {
            providers,
            cache,
            routing,
            user_limits,
        } = self.config;

        for (id, descriptor) in &providers {
            let zero_field = if descriptor.window_seconds == 0 {
                Some("window_seconds")
            } else if descriptor.timeout_seconds == 0 {
                Some("timeout_seconds")
            } else if descriptor.max_requests_per_window == 0 {
                Some("max_requests_per_window")
            } else {
                None
            };
            if let Some(field) = zero_field {
                return Err(RouterError::Config(format!(
                    "provider '{}': {} must be greater than zero",
                    id, field
                )));
            }
        }
        if routing.max_attempts == 0 {
            return Err(RouterError::Config(
                "routing.max_attempts must be at least 1".to_string(),
            ));
        }

        let limiters = providers
            .iter()
            .map(|(id, d)| {
                (
                    *id,
                    RateLimiter::new(d.max_requests_per_window, d.max_tokens_per_window, d.window()),
                )
            })
            .collect();
        let usage = UsageTracker::new(providers.iter().map(|(id, d)| (*id, d.cost_per_1000_tokens)));
        let registry = ProviderRegistry::new(providers, self.credentials.as_ref(), self.adapters);

        Ok(Router {
            registry,
            limiters,
            usage,
            cache: ResponseCache::new(Duration::from_secs(cache.ttl_seconds), cache.max_cache_size),
            user_limiter: UserRateLimiter::new(
                user_limits.max_requests_per_window,
                user_limits.max_tokens_per_window,
                Duration::from_secs(user_limits.window_seconds),
            ),
            request_log: RequestLog::new(routing.request_log_size),
            routing,
        })
    }
}

/// Result of one provider's final attempt
struct Attempt {
    response: AdapterResponse,
    latency_ms: f64,
    attempts: u32,
}

/// The multi-provider router.
///
/// Shared state (rate limiters, cache, usage/health, user limiter, request
/// log) each sit behind their own lock; no lock is held while a provider
/// call is in flight, so one slow provider never blocks other requests.
/// Dropping a `generate` future mid-call leaves all statistics untouched.
pub struct Router {
    registry: ProviderRegistry,
    limiters: HashMap<ProviderId, RateLimiter>,
    usage: UsageTracker,
    cache: ResponseCache,
    user_limiter: UserRateLimiter,
    request_log: RequestLog,
    routing: RoutingSettings,
}

impl Router {
    /// Start building a router; credentials default to the environment
    pub fn builder(config: RouterConfig) -> RouterBuilder {
        RouterBuilder {
            config,
            credentials: Box::new(EnvCredentials),
            adapters: HashMap::new(),
        }
    }

    /// Enabled, credentialed, healthy providers in ascending priority
    pub fn available_providers(&self) -> Vec<ProviderId> {
        self.registry
            .available_providers(|id| self.usage.is_healthy(id))
    }

    /// The provider a normal request would try first
    pub fn primary_provider(&self) -> Option<ProviderId> {
        self.available_providers().into_iter().next()
    }

    /// Generate a response, failing over across providers
    #[instrument(skip_all, fields(priority = ?request.priority, pinned = ?request.provider))]
    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        let projected_tokens = u64::from(request.max_tokens);

        if let Some(user_id) = request.user_id {
            if !self.user_limiter.can_proceed(user_id, projected_tokens) {
                warn!(user_id, "user rate limit exceeded");
                return Err(RouterError::UserRateLimited {
                    user_id,
                    usage: self.user_limiter.usage(user_id),
                });
            }
        }

        let cache_key = request.use_cache.then(|| request.cache_key());
        if let Some(key) = &cache_key {
            if let Some(hit) = self.cached_response(key) {
                return Ok(hit);
            }
        }

        let candidates = match request.provider {
            Some(pinned) if self.registry.is_available(pinned) => vec![pinned],
            Some(_) => Vec::new(),
            None => self.available_providers(),
        };
        if candidates.is_empty() {
            warn!("no providers available");
            return Err(RouterError::NoProviderAvailable);
        }

        let fallback = request.allow_fallback && self.routing.fallback_enabled;
        let mut last_error: Option<String> = None;

        for provider in candidates {
            let Some(entry) = self.registry.get(provider) else {
                continue;
            };
            let limiter = self.limiters.get(&provider);

            if let Some(limiter) = limiter {
                if !limiter.can_proceed(projected_tokens) && !request.priority.is_high() {
                    let err = RouterError::RateLimited {
                        provider,
                        retry_after: limiter.wait_time(),
                    };
                    info!(provider = %provider, "rate limited locally, trying next provider");
                    if !fallback {
                        return Err(err);
                    }
                    last_error = Some(err.to_string());
                    continue;
                }
            }

            match self.attempt_provider(provider, entry, &request).await {
                Ok(attempt) => {
                    let response = attempt.response;
                    self.usage
                        .record_attempt(provider, response.tokens_used, attempt.latency_ms, true);
                    self.usage.mark_healthy(provider);
                    if let Some(limiter) = limiter {
                        limiter.record(response.tokens_used);
                    }
                    if let Some(user_id) = request.user_id {
                        self.user_limiter.record(user_id, response.tokens_used);
                    }
                    self.request_log.log(Outcome {
                        provider,
                        model: &response.model,
                        prompt: &request.prompt,
                        response: &response.text,
                        tokens_used: response.tokens_used,
                        latency_ms: attempt.latency_ms,
                        error: None,
                        user_id: request.user_id,
                    });
                    if let Some(key) = &cache_key {
                        self.store_cached(key, provider, &response);
                    }

                    info!(
                        provider = %provider,
                        model = %response.model,
                        tokens = response.tokens_used,
                        latency_ms = attempt.latency_ms,
                        attempts = attempt.attempts,
                        "generation succeeded"
                    );

                    return Ok(GenerateResponse {
                        text: response.text,
                        provider_used: provider,
                        model_used: response.model,
                        tokens_used: response.tokens_used,
                        latency_ms: attempt.latency_ms,
                        served_from_cache: false,
                        attempts: attempt.attempts,
                    });
                }
                Err(err) => {
                    let message = err.to_string();
                    self.usage.record_attempt(provider, 0, 0.0, false);
                    self.usage.mark_unhealthy(provider, &message);
                    self.request_log.log(Outcome {
                        provider,
                        model: request.model.as_deref().unwrap_or_default(),
                        prompt: &request.prompt,
                        response: "",
                        tokens_used: 0,
                        latency_ms: 0.0,
                        error: Some(&message),
                        user_id: request.user_id,
                    });

                    if !fallback {
                        return Err(RouterError::Provider {
                            provider,
                            source: err,
                        });
                    }
                    last_error = Some(format!("{}: {}", provider, message));
                }
            }
        }

        Err(RouterError::AllProvidersFailed {
            last_error: last_error.unwrap_or_else(|| "All providers failed".to_string()),
        })
    }

    /// Call one provider, retrying retryable failures with backoff
    async fn attempt_provider(
        &self,
        provider: ProviderId,
        entry: &ProviderEntry,
        request: &GenerateRequest,
    ) -> std::result::Result<Attempt, ProviderError> {
        let adapter = entry
            .adapter
            .as_ref()
            .ok_or_else(|| ProviderError::Unsupported("no adapter registered".to_string()))?;
        let timeout = entry.descriptor.timeout();
        let max_attempts = self.routing.max_attempts.max(1);
        let mut backoff = self.retry_backoff();

        let mut adapter_request = AdapterRequest {
            prompt: request.prompt.clone(),
            model: entry.descriptor.resolve_model(request.model.as_deref()),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            extra: request.options.clone(),
            api_key: String::new(),
            base_url: entry.descriptor.base_url.clone(),
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            adapter_request.api_key = entry
                .keys
                .next_key()
                .ok_or_else(|| ProviderError::Authentication("no API key configured".to_string()))?;

            let started = Instant::now();
            let result = match tokio::time::timeout(timeout, adapter.call(&adapter_request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(timeout)),
            };

            match result {
                Ok(response) => {
                    entry.keys.mark_recovered(&adapter_request.api_key);
                    entry.keys.record_usage(&adapter_request.api_key);
                    return Ok(Attempt {
                        response,
                        latency_ms: started.elapsed().as_secs_f64() * 1000.0,
                        attempts: attempt,
                    });
                }
                Err(err) => {
                    if err.is_key_failure() {
                        entry.keys.mark_failed(&adapter_request.api_key);
                    }
                    warn!(
                        provider = %provider,
                        attempt,
                        max_attempts,
                        error = %err,
                        "provider attempt failed"
                    );

                    if !err.is_retryable() || attempt >= max_attempts {
                        return Err(err);
                    }

                    let delay = backoff
                        .next_backoff()
                        .unwrap_or(backoff.max_interval);
                    debug!(provider = %provider, delay_ms = delay.as_millis() as u64, "retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn retry_backoff(&self) -> ExponentialBackoff {
        let base = Duration::from_millis(self.routing.retry_base_delay_ms);
        ExponentialBackoff {
            current_interval: base,
            initial_interval: base,
            max_interval: Duration::from_millis(self.routing.retry_max_delay_ms),
            multiplier: 2.0,
            randomization_factor: 0.1,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    fn cached_response(&self, key: &str) -> Option<GenerateResponse> {
        let payload = self.cache.get(key)?;
        match serde_json::from_str::<CachedResponse>(&payload) {
            Ok(cached) => {
                debug!(provider = %cached.provider, "serving response from cache");
                Some(cached.into_response())
            }
            Err(e) => {
                warn!(error = %e, "discarding malformed cache entry");
                self.cache.remove(key);
                None
            }
        }
    }

    fn store_cached(&self, key: &str, provider: ProviderId, response: &AdapterResponse) {
        let cached = CachedResponse {
            text: response.text.clone(),
            provider,
            model: response.model.clone(),
        };
        match serde_json::to_string(&cached) {
            Ok(payload) => self.cache.set(key, payload, None),
            Err(e) => warn!(error = %e, "failed to serialize response for cache"),
        }
    }

    /// Per-provider statistics, totals and cache occupancy
    pub fn usage_report(&self) -> UsageReport {
        let mut providers = BTreeMap::new();
        let mut totals = UsageTotals::default();
        let mut successes = 0;

        for (id, _) in self.registry.iter() {
            let Some(stats) = self.usage.stats(id) else {
                continue;
            };

            totals.requests += stats.total_requests;
            totals.tokens += stats.total_tokens;
            totals.cost += stats.total_cost;
            successes += stats.successful_requests;

            providers.insert(
                id,
                ProviderUsage {
                    total_requests: stats.total_requests,
                    successful_requests: stats.successful_requests,
                    failed_requests: stats.failed_requests,
                    total_tokens: stats.total_tokens,
                    total_cost: round_to(stats.total_cost, 4),
                    avg_latency_ms: round_to(stats.avg_latency_ms, 2),
                    last_request: stats.last_request,
                    healthy: self.usage.is_healthy(id),
                },
            );
        }

        if totals.requests > 0 {
            totals.success_rate = round_to(successes as f64 / totals.requests as f64 * 100.0, 2);
        }
        totals.cost = round_to(totals.cost, 4);

        UsageReport {
            providers,
            totals,
            cache: self.cache.stats(),
        }
    }

    /// Configuration and live state of every configured provider
    pub fn health_check(&self) -> HealthReport {
        self.registry
            .iter()
            .map(|(id, entry)| {
                let has_headroom = self
                    .limiters
                    .get(&id)
                    .is_some_and(|limiter| limiter.can_proceed(0));

                (
                    id,
                    ProviderHealth {
                        configured: entry.adapter.is_some(),
                        api_key_present: entry.has_credential(),
                        enabled: entry.descriptor.enabled,
                        healthy: self.usage.is_healthy(id),
                        rate_limit_status: if has_headroom {
                            RateLimitStatus::Ok
                        } else {
                            RateLimitStatus::Limited
                        },
                    },
                )
            })
            .collect()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("response cache cleared");
    }

    /// Mark every provider healthy again
    pub fn reset_health_status(&self) {
        self.usage.reset_health();
        info!("provider health reset");
    }

    /// Zero usage counters and forget rate-limiter history
    pub fn reset_usage_stats(&self) {
        self.usage.reset_stats();
        for limiter in self.limiters.values() {
            limiter.reset();
        }
        info!("usage statistics reset");
    }

    pub fn key_pool_status(&self) -> BTreeMap<ProviderId, KeyPoolStats> {
        self.registry
            .iter()
            .map(|(id, entry)| (id, entry.keys.stats()))
            .collect()
    }

    pub fn user_usage(&self, user_id: u64) -> UserUsage {
        self.user_limiter.usage(user_id)
    }

    pub fn recent_requests(&self, count: usize, user_id: Option<u64>) -> Vec<RequestLogEntry> {
        self.request_log.recent(count, user_id)
    }

    pub fn recent_errors(&self, count: usize) -> Vec<RequestLogEntry> {
        self.request_log.errors(count)
    }

    pub fn request_log_stats(&self) -> RequestLogStats {
        self.request_log.stats()
    }

    /// Direct access to the response cache
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }
}
