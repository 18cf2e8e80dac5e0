//! Fixed-window rate limiting keyed by client IP and session id.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Requests allowed per IP per window.
const IP_LIMIT: u32 = 120;

/// Requests allowed per session per window.
const SESSION_LIMIT: u32 = 60;

/// Window length in seconds.
const WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct RateBucket {
    count: u32,
    reset: DateTime<Utc>,
}

/// Process-wide counting windows, one mapping per key space.
///
/// Each check is a self-contained read-modify-write on a single bucket
/// entry, so concurrent handlers never contend across keys.
pub struct RateLimiter {
    ip: DashMap<String, RateBucket>,
    session: DashMap<String, RateBucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            ip: DashMap::new(),
            session: DashMap::new(),
        }
    }

    /// Count one request against the IP bucket and, if a session key is
    /// supplied, the session bucket. Returns true only when both allow it.
    pub fn check(&self, ip: &str, session_id: Option<&str>) -> bool {
        self.check_at(ip, session_id, Utc::now())
    }

    pub(crate) fn check_at(
        &self,
        ip: &str,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        let ip_ok = hit_bucket(&self.ip, ip, IP_LIMIT, now);
        let session_ok = match session_id {
            Some(key) => hit_bucket(&self.session, key, SESSION_LIMIT, now),
            None => true,
        };
        ip_ok && session_ok
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn hit_bucket(map: &DashMap<String, RateBucket>, key: &str, limit: u32, now: DateTime<Utc>) -> bool {
    let mut bucket = map.entry(key.to_string()).or_insert_with(|| RateBucket {
        count: 0,
        reset: now + Duration::seconds(WINDOW_SECS),
    });
    if now > bucket.reset {
        bucket.count = 0;
        bucket.reset = now + Duration::seconds(WINDOW_SECS);
    }
    bucket.count += 1;
    bucket.count <= limit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_exactly_limit_calls_per_window() {
        let limiter = RateLimiter::new();
        let now = Utc::now();
        for _ in 0..SESSION_LIMIT {
            assert!(limiter.check_at("10.0.0.1", Some("sess"), now));
        }
        // The (limit+1)-th call in the same window is rejected.
        assert!(!limiter.check_at("10.0.0.1", Some("sess"), now));
    }

    #[test]
    fn window_rolls_over_after_reset_time() {
        let limiter = RateLimiter::new();
        let now = Utc::now();
        for _ in 0..=SESSION_LIMIT {
            limiter.check_at("10.0.0.1", Some("sess"), now);
        }
        assert!(!limiter.check_at("10.0.0.1", Some("sess"), now));

        let later = now + Duration::seconds(WINDOW_SECS + 1);
        assert!(limiter.check_at("10.0.0.1", Some("sess"), later));
    }

    #[test]
    fn ip_only_checks_skip_session_bucket() {
        let limiter = RateLimiter::new();
        let now = Utc::now();
        for _ in 0..IP_LIMIT {
            assert!(limiter.check_at("10.0.0.2", None, now));
        }
        assert!(!limiter.check_at("10.0.0.2", None, now));
    }

    #[test]
    fn buckets_are_independent_across_keys() {
        let limiter = RateLimiter::new();
        let now = Utc::now();
        for _ in 0..SESSION_LIMIT {
            limiter.check_at("10.0.0.3", Some("a"), now);
        }
        assert!(!limiter.check_at("10.0.0.3", Some("a"), now));
        // A different session under a different IP is unaffected.
        assert!(limiter.check_at("10.0.0.4", Some("b"), now));
    }
}
