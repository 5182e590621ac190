//! Login throttling over the persisted attempt log.
//!
//! A login is refused once the failures in the trailing window that match the
//! email OR the client origin reach the threshold. Because the count comes
//! from the store, the limit holds across restarts and replicas.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use super::store::AuthStore;

pub const DEFAULT_WINDOW_MINUTES: i64 = 15;
pub const DEFAULT_MAX_FAILURES: i64 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

#[derive(Clone, Copy, Debug)]
pub struct LoginRateLimiter {
    window: Duration,
    max_failures: i64,
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginRateLimiter {
    /// Default policy: 10 failures per 15 minutes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            window: Duration::minutes(DEFAULT_WINDOW_MINUTES),
            max_failures: DEFAULT_MAX_FAILURES,
        }
    }

    #[must_use]
    pub const fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub const fn with_max_failures(mut self, max_failures: i64) -> Self {
        self.max_failures = max_failures;
        self
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    #[must_use]
    pub const fn max_failures(&self) -> i64 {
        self.max_failures
    }

    /// # Errors
    /// Returns an error if the attempt log cannot be read.
    pub async fn check(
        &self,
        store: &dyn AuthStore,
        email: &str,
        origin: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision> {
        let failures = store
            .recent_failure_count(email, origin, now - self.window)
            .await?;
        if failures >= self.max_failures {
            Ok(RateLimitDecision::Limited)
        } else {
            Ok(RateLimitDecision::Allowed)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::{store::MemoryStore, types::LoginAttempt};

    async fn fail(store: &MemoryStore, email: &str, origin: &str, at: DateTime<Utc>) {
        store
            .record_login_attempt(&LoginAttempt {
                email: email.to_string(),
                user_id: None,
                origin: Some(origin.to_string()),
                success: false,
                created_at: at,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn limits_at_threshold() {
        let store = MemoryStore::new();
        let limiter = LoginRateLimiter::new();
        let now = Utc::now();
        for _ in 0..9 {
            fail(&store, "a@example.com", "10.0.0.1", now).await;
        }
        assert_eq!(
            limiter.check(&store, "a@example.com", Some("10.0.0.1"), now).await.unwrap(),
            RateLimitDecision::Allowed
        );
        fail(&store, "a@example.com", "10.0.0.1", now).await;
        assert_eq!(
            limiter.check(&store, "a@example.com", Some("10.0.0.1"), now).await.unwrap(),
            RateLimitDecision::Limited
        );
    }

    #[tokio::test]
    async fn origin_failures_limit_other_emails() {
        let store = MemoryStore::new();
        let limiter = LoginRateLimiter::new().with_max_failures(3);
        let now = Utc::now();
        for n in 0..3 {
            fail(&store, &format!("u{n}@example.com"), "10.0.0.7", now).await;
        }
        assert_eq!(
            limiter.check(&store, "fresh@example.com", Some("10.0.0.7"), now).await.unwrap(),
            RateLimitDecision::Limited
        );
        assert_eq!(
            limiter.check(&store, "fresh@example.com", Some("10.0.0.8"), now).await.unwrap(),
            RateLimitDecision::Allowed
        );
    }

    #[tokio::test]
    async fn old_failures_fall_out_of_window() {
        let store = MemoryStore::new();
        let limiter = LoginRateLimiter::new().with_max_failures(1);
        let now = Utc::now();
        fail(&store, "a@example.com", "10.0.0.1", now - Duration::minutes(16)).await;
        assert_eq!(
            limiter.check(&store, "a@example.com", None, now).await.unwrap(),
            RateLimitDecision::Allowed
        );
    }
}
