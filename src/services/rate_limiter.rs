//! Sliding-window rate limiting
//!
//! Guards the admin login against brute force and the public submission
//! endpoints (lead capture, chat) against floods:
//! - failed logins per username (5 per 15 minutes)
//! - login requests per client IP (10 per minute)
//! - public submissions per client IP (configurable, 20 per 10 minutes by default)

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use tokio::sync::RwLock;

use crate::config::RateLimitConfig;

/// Timestamps of recent events per key, kept for `window`
pub struct SlidingWindow<K> {
    limit: usize,
    window: Duration,
    events: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
}

impl<K: Eq + Hash + Clone> SlidingWindow<K> {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            events: RwLock::new(HashMap::new()),
        }
    }

    /// True when `key` already has `limit` events inside the window
    pub async fn is_limited(&self, key: &K) -> bool {
        let cutoff = Utc::now() - self.window;
        let mut events = self.events.write().await;
        match events.get_mut(key) {
            Some(times) => {
                times.retain(|t| *t > cutoff);
                times.len() >= self.limit
            }
            None => false,
        }
    }

    pub async fn record(&self, key: K) {
        let mut events = self.events.write().await;
        events.entry(key).or_default().push(Utc::now());
    }

    /// Check and record in one step. Returns false when over the limit, in
    /// which case nothing is recorded.
    pub async fn try_acquire(&self, key: K) -> bool {
        let cutoff = Utc::now() - self.window;
        let mut events = self.events.write().await;
        let times = events.entry(key).or_default();
        times.retain(|t| *t > cutoff);
        if times.len() >= self.limit {
            return false;
        }
        times.push(Utc::now());
        true
    }

    pub async fn clear(&self, key: &K) {
        self.events.write().await.remove(key);
    }

    /// Drop expired timestamps and empty keys
    pub async fn prune(&self) {
        let cutoff = Utc::now() - self.window;
        let mut events = self.events.write().await;
        events.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
    }

    pub async fn tracked_keys(&self) -> usize {
        self.events.read().await.len()
    }

    /// Seconds a limited client should wait
    pub fn retry_after_secs(&self) -> i64 {
        self.window.num_seconds()
    }
}

/// All limiters used by the API
pub struct RateLimiter {
    login_usernames: SlidingWindow<String>,
    login_ips: SlidingWindow<String>,
    submissions: SlidingWindow<String>,
}

impl RateLimiter {
    pub const LOGIN_FAILURES_PER_USERNAME: usize = 5;
    pub const LOGIN_REQUESTS_PER_IP: usize = 10;

    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            login_usernames: SlidingWindow::new(Self::LOGIN_FAILURES_PER_USERNAME, Duration::minutes(15)),
            login_ips: SlidingWindow::new(Self::LOGIN_REQUESTS_PER_IP, Duration::minutes(1)),
            submissions: SlidingWindow::new(
                config.submissions_per_window,
                Duration::minutes(config.window_minutes),
            ),
        }
    }

    /// Check if username is locked out after repeated failures
    pub async fn is_username_limited(&self, username: &str) -> bool {
        self.login_usernames.is_limited(&username.to_lowercase()).await
    }

    pub async fn record_failed_login(&self, username: &str) {
        self.login_usernames.record(username.to_lowercase()).await;
    }

    /// Clear failed attempts for username (on successful login)
    pub async fn clear_username(&self, username: &str) {
        self.login_usernames.clear(&username.to_lowercase()).await;
    }

    /// Count a login request from `ip`; false when the IP is over its limit
    pub async fn allow_login_request(&self, ip: &str) -> bool {
        self.login_ips.try_acquire(ip.to_string()).await
    }

    /// Count a public submission from `ip`; false when the IP is over its limit
    pub async fn allow_submission(&self, ip: &str) -> bool {
        self.submissions.try_acquire(ip.to_string()).await
    }

    pub fn username_retry_after(&self) -> i64 {
        self.login_usernames.retry_after_secs()
    }

    pub fn login_ip_retry_after(&self) -> i64 {
        self.login_ips.retry_after_secs()
    }

    pub fn submission_retry_after(&self) -> i64 {
        self.submissions.retry_after_secs()
    }

    /// Clean up old entries (called periodically)
    pub async fn cleanup(&self) {
        self.login_usernames.prune().await;
        self.login_ips.prune().await;
        self.submissions.prune().await;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&RateLimitConfig::default())
    }
}
