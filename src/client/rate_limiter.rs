//! Rate Limiting
//!
//! Sliding-window admission control over request count and token volume,
//! per provider and per calling user.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Timestamps recorded inside the trailing window, oldest first
#[derive(Debug, Default)]
struct WindowState {
    requests: VecDeque<Instant>,
    tokens: VecDeque<(Instant, u64)>,
}

impl WindowState {
    fn prune(&mut self, now: Instant, window: Duration) {
        let expired = |t: &Instant| now.saturating_duration_since(*t) >= window;

        while self.requests.front().is_some_and(expired) {
            self.requests.pop_front();
        }
        while self.tokens.front().is_some_and(|(t, _)| expired(t)) {
            self.tokens.pop_front();
        }
    }

    fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.tokens.is_empty()
    }

    fn token_total(&self) -> u64 {
        self.tokens.iter().map(|(_, n)| n).sum()
    }

    fn admits(&self, max_requests: u32, max_tokens: u64, projected_tokens: u64) -> bool {
        self.requests.len() < max_requests as usize
            && self.token_total() + projected_tokens <= max_tokens
    }

    fn push(&mut self, now: Instant, tokens: u64) {
        self.requests.push_back(now);
        if tokens > 0 {
            self.tokens.push_back((now, tokens));
        }
    }
}

/// Per-provider sliding-window limiter.
///
/// This is a soft limiter: it only answers whether a call fits the budget,
/// it never blocks. The router decides whether to skip or proceed.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    max_tokens: u64,
    window: Duration,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, max_tokens: u64, window: Duration) -> Self {
        Self {
            max_requests,
            max_tokens,
            window,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// Check whether a request projected to use `tokens` fits the window
    pub fn can_proceed(&self, tokens: u64) -> bool {
        self.can_proceed_at(tokens, Instant::now())
    }

    pub fn can_proceed_at(&self, tokens: u64, now: Instant) -> bool {
        let mut state = self.state.lock();
        state.prune(now, self.window);
        state.admits(self.max_requests, self.max_tokens, tokens)
    }

    /// Record a completed request and the tokens it consumed
    pub fn record(&self, tokens: u64) {
        self.record_at(tokens, Instant::now());
    }

    pub fn record_at(&self, tokens: u64, now: Instant) {
        self.state.lock().push(now, tokens);
    }

    /// Time until the oldest binding entry leaves the window; zero when a
    /// request would currently be admitted.
    pub fn wait_time(&self) -> Duration {
        self.wait_time_at(Instant::now())
    }

    pub fn wait_time_at(&self, now: Instant) -> Duration {
        let mut state = self.state.lock();
        state.prune(now, self.window);

        if state.admits(self.max_requests, self.max_tokens, 0) {
            return Duration::ZERO;
        }

        let oldest = if state.requests.len() >= self.max_requests as usize {
            state.requests.front().copied()
        } else {
            state.tokens.front().map(|(t, _)| *t)
        };

        // Nothing recorded yet the window still refuses: a zero budget
        match oldest {
            Some(t) => self.window.saturating_sub(now.saturating_duration_since(t)),
            None => self.window,
        }
    }

    /// Requests and tokens currently inside the window
    pub fn current_usage(&self) -> (usize, u64) {
        let mut state = self.state.lock();
        state.prune(Instant::now(), self.window);
        (state.requests.len(), state.token_total())
    }

    /// Forget all recorded history
    pub fn reset(&self) {
        *self.state.lock() = WindowState::default();
    }
}

/// A user's consumption inside the current window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserUsage {
    pub requests_this_window: u32,
    pub tokens_this_window: u64,
    pub requests_remaining: u32,
    pub tokens_remaining: u64,
}

/// Per-user sliding-window limiter shared by all providers
#[derive(Debug)]
pub struct UserRateLimiter {
    max_requests: u32,
    max_tokens: u64,
    window: Duration,
    users: Mutex<HashMap<u64, WindowState>>,
}

impl UserRateLimiter {
    pub fn new(max_requests: u32, max_tokens: u64, window: Duration) -> Self {
        Self {
            max_requests,
            max_tokens,
            window,
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether `user_id` may issue a request projected to use `tokens`
    pub fn can_proceed(&self, user_id: u64, tokens: u64) -> bool {
        self.can_proceed_at(user_id, tokens, Instant::now())
    }

    pub fn can_proceed_at(&self, user_id: u64, tokens: u64, now: Instant) -> bool {
        let mut users = self.users.lock();
        match self.live_state(&mut users, user_id, now) {
            Some(state) => state.admits(self.max_requests, self.max_tokens, tokens),
            None => tokens <= self.max_tokens && self.max_requests > 0,
        }
    }

    pub fn record(&self, user_id: u64, tokens: u64) {
        self.record_at(user_id, tokens, Instant::now());
    }

    pub fn record_at(&self, user_id: u64, tokens: u64, now: Instant) {
        self.users
            .lock()
            .entry(user_id)
            .or_default()
            .push(now, tokens);
    }

    pub fn usage(&self, user_id: u64) -> UserUsage {
        self.usage_at(user_id, Instant::now())
    }

    pub fn usage_at(&self, user_id: u64, now: Instant) -> UserUsage {
        let mut users = self.users.lock();
        let (requests, tokens) = match self.live_state(&mut users, user_id, now) {
            Some(state) => (state.requests.len() as u32, state.token_total()),
            None => (0, 0),
        };

        UserUsage {
            requests_this_window: requests,
            tokens_this_window: tokens,
            requests_remaining: self.max_requests.saturating_sub(requests),
            tokens_remaining: self.max_tokens.saturating_sub(tokens),
        }
    }

    /// Users with history inside the current window
    pub fn tracked_users(&self) -> usize {
        self.users.lock().len()
    }

    /// Prune a user's window, forgetting the user once it is empty
    fn live_state<'a>(
        &self,
        users: &'a mut HashMap<u64, WindowState>,
        user_id: u64,
        now: Instant,
    ) -> Option<&'a WindowState> {
        let state = users.get_mut(&user_id)?;
        state.prune(now, self.window);
        if state.is_empty() {
            users.remove(&user_id);
            return None;
        }
        users.get(&user_id)
    }
}
