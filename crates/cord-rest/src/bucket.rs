//! Per-route rate-limit bucket state.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Rate-limit headers parsed from a response.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RateLimitHeaders {
    /// `X-RateLimit-Limit`: requests allowed per window.
    pub limit: Option<u64>,
    /// `X-RateLimit-Remaining`: budget left in the current window.
    pub remaining: Option<u64>,
    /// `X-RateLimit-Reset`: wall-clock seconds when the window resets.
    pub reset: Option<f64>,
}

impl RateLimitHeaders {
    /// Parse the rate-limit headers out of a response header map.
    #[must_use]
    pub fn parse(headers: &reqwest::header::HeaderMap) -> Self {
        fn field<T: std::str::FromStr>(
            headers: &reqwest::header::HeaderMap,
            name: &str,
        ) -> Option<T> {
            headers.get(name)?.to_str().ok()?.parse().ok()
        }

        Self {
            limit: field(headers, "x-ratelimit-limit"),
            remaining: field(headers, "x-ratelimit-remaining"),
            reset: field(headers, "x-ratelimit-reset"),
        }
    }

    /// Whether any rate-limit header was present.
    #[must_use]
    pub fn any(&self) -> bool {
        self.limit.is_some() || self.remaining.is_some() || self.reset.is_some()
    }
}

/// Budget state for one rate-limit bucket.
///
/// Invariant: `remaining` never goes below zero; when it hits zero no
/// request on this bucket is admitted until `reset_at` passes.
#[derive(Debug, Clone)]
pub struct Bucket {
    /// Requests allowed per window; `None` until the first response
    /// teaches us.
    pub limit: Option<u64>,
    /// Budget left in the current window.
    pub remaining: u64,
    /// Wall-clock end of the current window.
    pub reset_at: Option<DateTime<Utc>>,
    /// Last admission, for idle pruning.
    pub last_used: Instant,
}

impl Default for Bucket {
    fn default() -> Self {
        Self::new()
    }
}

impl Bucket {
    /// Create a bucket with everything unknown.
    #[must_use]
    pub fn new() -> Self {
        Self {
            limit: None,
            remaining: 1,
            reset_at: None,
            last_used: Instant::now(),
        }
    }

    /// Whether the server has taught this bucket its limit yet.
    #[must_use]
    pub const fn limit_known(&self) -> bool {
        self.limit.is_some()
    }

    /// How long admission must wait, if the budget is spent and the
    /// window has not reset.
    #[must_use]
    pub fn delay_until_ready(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.remaining > 0 {
            return None;
        }
        let reset_at = self.reset_at?;
        (reset_at - now).to_std().ok()
    }

    /// Account for one admitted request.
    pub fn consume(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
        self.last_used = Instant::now();
    }

    /// Refill the budget after the window boundary has been waited out.
    pub fn refill(&mut self) {
        if let Some(limit) = self.limit {
            self.remaining = limit;
        } else {
            self.remaining = 1;
        }
        self.reset_at = None;
    }

    /// Update state from response headers.
    pub fn ingest(&mut self, headers: &RateLimitHeaders) {
        if let Some(limit) = headers.limit {
            self.limit = Some(limit);
        }
        if let Some(remaining) = headers.remaining {
            self.remaining = remaining;
        }
        if let Some(reset) = headers.reset {
            let secs = reset.trunc() as i64;
            let nanos = (reset.fract() * 1e9) as u32;
            self.reset_at = DateTime::from_timestamp(secs, nanos);
        }
    }

    /// Whether this bucket has been idle longer than `max_idle`.
    #[must_use]
    pub fn idle_longer_than(&self, max_idle: Duration) -> bool {
        self.last_used.elapsed() > max_idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_fresh_bucket_admits_immediately() {
        let bucket = Bucket::new();
        assert!(bucket.delay_until_ready(Utc::now()).is_none());
        assert!(!bucket.limit_known());
    }

    #[test]
    fn test_exhausted_bucket_waits_for_reset() {
        let now = Utc::now();
        let mut bucket = Bucket::new();
        bucket.ingest(&RateLimitHeaders {
            limit: Some(5),
            remaining: Some(0),
            reset: Some((now + TimeDelta::seconds(2)).timestamp() as f64),
        });

        let delay = bucket.delay_until_ready(now).expect("should need a wait");
        assert!(delay <= Duration::from_secs(2));
        assert!(delay > Duration::from_millis(500));
    }

    #[test]
    fn test_elapsed_reset_means_no_wait() {
        let now = Utc::now();
        let mut bucket = Bucket::new();
        bucket.ingest(&RateLimitHeaders {
            limit: Some(5),
            remaining: Some(0),
            reset: Some((now - TimeDelta::seconds(3)).timestamp() as f64),
        });
        assert!(bucket.delay_until_ready(now).is_none());
    }

    #[test]
    fn test_refill_restores_learned_limit() {
        let mut bucket = Bucket::new();
        bucket.ingest(&RateLimitHeaders {
            limit: Some(5),
            remaining: Some(0),
            reset: Some(Utc::now().timestamp() as f64),
        });
        bucket.refill();
        assert_eq!(bucket.remaining, 5);
        assert!(bucket.reset_at.is_none());
    }

    #[test]
    fn test_consume_saturates_at_zero() {
        let mut bucket = Bucket::new();
        bucket.consume();
        bucket.consume();
        assert_eq!(bucket.remaining, 0);
    }

    #[test]
    fn test_header_parsing() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-ratelimit-limit", "5".parse().unwrap());
        headers.insert("x-ratelimit-remaining", "3".parse().unwrap());
        headers.insert("x-ratelimit-reset", "1470173023.123".parse().unwrap());

        let parsed = RateLimitHeaders::parse(&headers);
        assert_eq!(parsed.limit, Some(5));
        assert_eq!(parsed.remaining, Some(3));
        assert!(parsed.any());
        assert!((parsed.reset.unwrap() - 1_470_173_023.123).abs() < 1e-6);
    }

    #[test]
    fn test_missing_headers_parse_as_none() {
        let headers = reqwest::header::HeaderMap::new();
        let parsed = RateLimitHeaders::parse(&headers);
        assert!(!parsed.any());
    }
}
