//! In-memory sliding-window request limiter.

use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: usize,
    /// Time until the oldest hit leaves the window; set only when denied.
    pub retry_after: Option<Duration>,
}

/// Allows at most `limit` hits per key within any `window`-long interval.
#[derive(Debug)]
pub struct SlidingWindowRateLimiter {
    limit: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowRateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub async fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now()).await
    }

    pub(crate) async fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut hits = self.hits.lock().await;
        let window = hits.entry(key.to_string()).or_default();
        prune(window, now, self.window);

        if window.len() < self.limit {
            window.push_back(now);
            return RateLimitDecision {
                allowed: true,
                remaining: self.limit - window.len(),
                retry_after: None,
            };
        }

        let retry_after = window
            .front()
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now));
        RateLimitDecision {
            allowed: false,
            remaining: 0,
            retry_after,
        }
    }

    /// Drop keys with no hits left in the window. Returns how many were removed.
    pub async fn purge_idle(&self) -> usize {
        self.purge_idle_at(Instant::now()).await
    }

    pub(crate) async fn purge_idle_at(&self, now: Instant) -> usize {
        let mut hits = self.hits.lock().await;
        let before = hits.len();
        hits.retain(|_, window| {
            prune(window, now, self.window);
            !window.is_empty()
        });
        before - hits.len()
    }

    pub async fn tracked_keys(&self) -> usize {
        self.hits.lock().await.len()
    }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant, length: Duration) {
    while let Some(oldest) = window.front() {
        if now.saturating_duration_since(*oldest) >= length {
            window.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_denies_after_limit_within_window() {
        let limiter = SlidingWindowRateLimiter::new(3, Duration::from_secs(10));
        let start = Instant::now();

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check_at("member-a", start).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = limiter
            .check_at("member-a", start + Duration::from_secs(4))
            .await;
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Some(Duration::from_secs(6)));

        // Other keys have their own window.
        assert!(limiter.check_at("member-b", start).await.allowed);
    }

    #[tokio::test]
    async fn test_window_slides_instead_of_resetting() {
        let limiter = SlidingWindowRateLimiter::new(2, Duration::from_secs(10));
        let start = Instant::now();

        assert!(limiter.check_at("k", start).await.allowed);
        assert!(limiter.check_at("k", start + Duration::from_secs(6)).await.allowed);
        assert!(!limiter.check_at("k", start + Duration::from_secs(9)).await.allowed);

        // The first hit expires at t=10; the second is still inside the window.
        let decision = limiter.check_at("k", start + Duration::from_secs(10)).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert!(!limiter.check_at("k", start + Duration::from_secs(12)).await.allowed);
    }

    #[tokio::test]
    async fn test_denied_requests_do_not_extend_the_window() {
        let limiter = SlidingWindowRateLimiter::new(1, Duration::from_secs(5));
        let start = Instant::now();

        assert!(limiter.check_at("k", start).await.allowed);
        for secs in 1..5 {
            assert!(!limiter.check_at("k", start + Duration::from_secs(secs)).await.allowed);
        }
        assert!(limiter.check_at("k", start + Duration::from_secs(5)).await.allowed);
    }

    #[tokio::test]
    async fn test_purge_idle_drops_expired_keys() {
        let limiter = SlidingWindowRateLimiter::new(5, Duration::from_secs(1));
        let start = Instant::now();
        limiter.check_at("old", start).await;
        limiter.check_at("fresh", start + Duration::from_secs(2)).await;

        let removed = limiter.purge_idle_at(start + Duration::from_millis(2500)).await;
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_keys().await, 1);
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        assert_eq!(SlidingWindowRateLimiter::new(0, Duration::from_secs(1)).limit(), 1);
    }
}
