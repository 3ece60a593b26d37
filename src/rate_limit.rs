//! Tracks server-advertised rate-limit headroom per endpoint.
//!
//! Purely advisory: the admission gate does not consult this tracker. Callers
//! that must respect an advertised reset explicitly call [`RateLimitTracker::wait_for_reset`].

use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
}

#[derive(Default)]
pub struct RateLimitTracker {
    entries: Mutex<HashMap<String, RateLimitInfo>>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert an entry from response metadata. A zero limit or reset is
    /// treated as absent metadata and ignored.
    pub fn record(&self, endpoint: &str, limit: u32, remaining: u32, reset_epoch_secs: i64) {
        if limit == 0 || reset_epoch_secs == 0 {
            return;
        }
        let Some(reset_time) = Utc.timestamp_opt(reset_epoch_secs, 0).single() else {
            return;
        };
        debug!(endpoint, limit, remaining, %reset_time, "rate limit recorded");
        self.entries.lock().expect("rate limit lock poisoned").insert(
            endpoint.to_string(),
            RateLimitInfo {
                limit,
                remaining,
                reset_time,
            },
        );
    }

    /// Current entry for an endpoint, if any non-expired one exists.
    pub fn info(&self, endpoint: &str) -> Option<RateLimitInfo> {
        self.info_at(endpoint, Utc::now())
    }

    /// True iff the endpoint has zero advertised headroom and its reset time
    /// has not passed.
    pub fn is_limited(&self, endpoint: &str) -> bool {
        self.is_limited_at(endpoint, Utc::now())
    }

    /// Non-negative time until the endpoint's advertised reset; zero when no
    /// entry exists or the reset already passed.
    pub fn time_until_reset(&self, endpoint: &str) -> Duration {
        self.time_until_reset_at(endpoint, Utc::now())
    }

    /// Sleep until the endpoint's advertised reset, if one is pending.
    pub async fn wait_for_reset(&self, endpoint: &str) {
        let wait = self.time_until_reset(endpoint);
        if !wait.is_zero() {
            debug!(endpoint, ?wait, "waiting for advertised rate limit reset");
            tokio::time::sleep(wait).await;
        }
    }

    fn info_at(&self, endpoint: &str, now: DateTime<Utc>) -> Option<RateLimitInfo> {
        let mut entries = self.entries.lock().expect("rate limit lock poisoned");
        match entries.get(endpoint) {
            Some(info) if now >= info.reset_time => {
                // Expired entries are evicted lazily on read.
                entries.remove(endpoint);
                None
            }
            Some(info) => Some(info.clone()),
            None => None,
        }
    }

    fn is_limited_at(&self, endpoint: &str, now: DateTime<Utc>) -> bool {
        self.info_at(endpoint, now)
            .is_some_and(|info| info.remaining == 0)
    }

    fn time_until_reset_at(&self, endpoint: &str, now: DateTime<Utc>) -> Duration {
        match self.info_at(endpoint, now) {
            Some(info) => (info.reset_time - now).to_std().unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    const ENDPOINT: &str = "/twitter/create_tweet_v2";

    #[test]
    fn exhausted_entry_is_limited_until_reset() {
        let tracker = RateLimitTracker::new();
        let now = Utc::now();
        tracker.record(ENDPOINT, 100, 0, (now + TimeDelta::seconds(60)).timestamp());
        assert!(tracker.is_limited(ENDPOINT));
        assert!(tracker.time_until_reset(ENDPOINT) > Duration::ZERO);
    }

    #[test]
    fn headroom_left_is_not_limited() {
        let tracker = RateLimitTracker::new();
        let now = Utc::now();
        tracker.record(ENDPOINT, 100, 7, (now + TimeDelta::seconds(60)).timestamp());
        assert!(!tracker.is_limited(ENDPOINT));
    }

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let tracker = RateLimitTracker::new();
        let now = Utc::now();
        tracker.record(ENDPOINT, 100, 0, (now - TimeDelta::seconds(5)).timestamp());
        assert!(!tracker.is_limited(ENDPOINT));
        assert_eq!(tracker.info(ENDPOINT), None);
        assert_eq!(tracker.time_until_reset(ENDPOINT), Duration::ZERO);
    }

    #[test]
    fn unknown_endpoint_has_zero_wait() {
        let tracker = RateLimitTracker::new();
        assert!(!tracker.is_limited("/twitter/unknown"));
        assert_eq!(tracker.time_until_reset("/twitter/unknown"), Duration::ZERO);
    }

    #[test]
    fn missing_metadata_is_ignored() {
        let tracker = RateLimitTracker::new();
        tracker.record(ENDPOINT, 0, 0, 0);
        assert_eq!(tracker.info(ENDPOINT), None);
    }
}
