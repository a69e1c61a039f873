//! Request Log
//!
//! Bounded ring buffer of per-provider outcomes for debugging.

use crate::config::ProviderId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, VecDeque};

const PREVIEW_CHARS: usize = 100;

/// One logged provider outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestLogEntry {
    pub timestamp: DateTime<Utc>,
    pub provider: ProviderId,
    pub model: String,
    pub prompt_hash: String,
    pub prompt_preview: String,
    pub response_preview: String,
    pub tokens_used: u64,
    pub latency_ms: f64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
}

/// What the router knows about an outcome when it logs it
#[derive(Debug, Clone, Copy)]
pub struct Outcome<'a> {
    pub provider: ProviderId,
    pub model: &'a str,
    pub prompt: &'a str,
    pub response: &'a str,
    pub tokens_used: u64,
    pub latency_ms: f64,
    pub error: Option<&'a str>,
    pub user_id: Option<u64>,
}

/// Aggregate view over the logged entries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestLogStats {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub total_tokens: u64,
    pub by_provider: BTreeMap<ProviderId, usize>,
}

#[derive(Debug)]
pub struct RequestLog {
    max_entries: usize,
    entries: Mutex<VecDeque<RequestLogEntry>>,
}

impl RequestLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: Mutex::new(VecDeque::with_capacity(max_entries.min(1024))),
        }
    }

    pub fn log(&self, outcome: Outcome<'_>) {
        if self.max_entries == 0 {
            return;
        }

        let entry = RequestLogEntry {
            timestamp: Utc::now(),
            provider: outcome.provider,
            model: outcome.model.to_string(),
            prompt_hash: prompt_hash(outcome.prompt),
            prompt_preview: preview(outcome.prompt),
            response_preview: preview(outcome.response),
            tokens_used: outcome.tokens_used,
            latency_ms: outcome.latency_ms,
            success: outcome.error.is_none(),
            error: outcome.error.map(str::to_string),
            user_id: outcome.user_id,
        };

        let mut entries = self.entries.lock();
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Most recent `count` entries, oldest first, optionally for one user
    pub fn recent(&self, count: usize, user_id: Option<u64>) -> Vec<RequestLogEntry> {
        let entries = self.entries.lock();
        let matching: Vec<_> = entries
            .iter()
            .filter(|e| user_id.is_none() || e.user_id == user_id)
            .cloned()
            .collect();
        tail(matching, count)
    }

    pub fn errors(&self, count: usize) -> Vec<RequestLogEntry> {
        let entries = self.entries.lock();
        let failed: Vec<_> = entries.iter().filter(|e| !e.success).cloned().collect();
        tail(failed, count)
    }

    pub fn stats(&self) -> RequestLogStats {
        let entries = self.entries.lock();
        let total = entries.len();
        let success = entries.iter().filter(|e| e.success).count();

        let mut by_provider = BTreeMap::new();
        for entry in entries.iter() {
            *by_provider.entry(entry.provider).or_insert(0) += 1;
        }

        let (success_rate, avg_latency_ms) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                round_to(success as f64 / total as f64 * 100.0, 2),
                round_to(entries.iter().map(|e| e.latency_ms).sum::<f64>() / total as f64, 2),
            )
        };

        RequestLogStats {
            total,
            success,
            failure: total - success,
            success_rate,
            avg_latency_ms,
            total_tokens: entries.iter().map(|e| e.tokens_used).sum(),
            by_provider,
        }
    }
}

fn tail(mut items: Vec<RequestLogEntry>, count: usize) -> Vec<RequestLogEntry> {
    let skip = items.len().saturating_sub(count);
    items.drain(..skip);
    items
}

fn prompt_hash(prompt: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(prompt.as_bytes()));
    digest[..16].to_string()
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(provider: ProviderId, error: Option<&'static str>, user_id: Option<u64>) -> Outcome<'static> {
        Outcome {
            provider,
            model: "m",
            prompt: "prompt",
            response: if error.is_none() { "ok" } else { "" },
            tokens_used: if error.is_none() { 10 } else { 0 },
            latency_ms: if error.is_none() { 50.0 } else { 0.0 },
            error,
            user_id,
        }
    }

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let log = RequestLog::new(2);
        log.log(outcome(ProviderId::Gemini, None, Some(1)));
        log.log(outcome(ProviderId::OpenAi, None, Some(2)));
        log.log(outcome(ProviderId::Anthropic, Some("boom"), Some(1)));

        let recent = log.recent(10, None);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].provider, ProviderId::OpenAi);
        assert_eq!(recent[1].provider, ProviderId::Anthropic);

        let mine = log.recent(10, Some(1));
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_errors_and_stats() {
        let log = RequestLog::new(10);
        log.log(outcome(ProviderId::Gemini, Some("timeout"), None));
        log.log(outcome(ProviderId::OpenAi, None, None));
        log.log(outcome(ProviderId::OpenAi, None, None));

        assert_eq!(log.errors(5).len(), 1);
        assert_eq!(log.recent(1, None).len(), 1);

        let stats = log.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.success, 2);
        assert_eq!(stats.failure, 1);
        assert_eq!(stats.success_rate, 66.67);
        assert_eq!(stats.avg_latency_ms, 33.33);
        assert_eq!(stats.total_tokens, 20);
        assert_eq!(stats.by_provider[&ProviderId::OpenAi], 2);
    }

    #[test]
    fn test_previews_and_hash() {
        let long = "x".repeat(150);
        assert_eq!(preview(&long).len(), 103);
        assert_eq!(preview("short"), "short");
        assert_eq!(prompt_hash("abc").len(), 16);
        assert_eq!(prompt_hash("abc"), "ba7816bf8f01cfea");
    }

    #[test]
    fn test_empty_stats() {
        let stats = RequestLog::new(10).stats();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.success_rate, 0.0);
    }
}
