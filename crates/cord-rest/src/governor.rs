//! The rate-limit governor.
//!
//! Every REST request is admitted here before it touches the wire. The
//! governor keeps one [`Bucket`] per route key, serializes requests that
//! share a bucket at the budget boundary, holds mutating methods in
//! submission order, and pauses all egress during a global lockout.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Method;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::bucket::{Bucket, RateLimitHeaders};
use crate::error::{RestError, RestResult};

/// A bucket is discarded after this much idleness.
pub const BUCKET_MAX_IDLE: Duration = Duration::from_secs(5 * 60);

/// Cadence of the idle-bucket janitor.
pub const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Retry policy for transport failures, 5xx responses, and 429s.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// First backoff delay for transport/5xx retries.
    pub backoff_base: Duration,
    /// Backoff ceiling.
    pub backoff_cap: Duration,
    /// Attempts per request for transport/5xx failures.
    pub max_attempts: u32,
    /// Re-submissions allowed when the server answers 429.
    pub max_rate_limit_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            max_attempts: 5,
            max_rate_limit_retries: 5,
        }
    }
}

impl RetryConfig {
    /// Backoff delay for the given attempt number (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2f64.powi(attempt.saturating_sub(1) as i32);
        let millis = (self.backoff_base.as_millis() as f64 * factor) as u64;
        Duration::from_millis(millis).min(self.backoff_cap)
    }
}

/// Process-wide REST quiescence in response to a global 429.
#[derive(Debug, Default)]
pub struct GlobalLockout {
    until: Mutex<Option<Instant>>,
}

impl GlobalLockout {
    /// Create an unlocked lockout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether egress is currently paused.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.until.lock().is_some_and(|t| t > Instant::now())
    }

    /// Pause all egress for the given duration.
    pub fn lock_for(&self, duration: Duration) {
        warn!(?duration, "global rate limit hit, pausing all REST egress");
        let deadline = Instant::now() + duration;
        let mut until = self.until.lock();
        // Never shorten an existing lockout.
        if until.map_or(true, |t| t < deadline) {
            *until = Some(deadline);
        }
    }

    /// Wait until egress is allowed again.
    pub async fn wait_until_clear(&self) {
        loop {
            let deadline = {
                let mut until = self.until.lock();
                match *until {
                    Some(t) if t > Instant::now() => Some(t),
                    _ => {
                        *until = None;
                        None
                    }
                }
            };
            match deadline {
                Some(t) => sleep(t.saturating_duration_since(Instant::now())).await,
                None => return,
            }
        }
    }
}

/// One bucket's admission gate plus its budget state.
///
/// The async gate is fair, which is what preserves submission order; the
/// sync mutex guards the counters so header ingestion never waits behind
/// queued admissions.
#[derive(Debug)]
struct BucketHandle {
    gate: tokio::sync::Mutex<()>,
    state: Mutex<Bucket>,
}

impl BucketHandle {
    fn new() -> Self {
        Self {
            gate: tokio::sync::Mutex::new(()),
            state: Mutex::new(Bucket::new()),
        }
    }

    fn ingest(&self, headers: &RateLimitHeaders) {
        if headers.any() {
            self.state.lock().ingest(headers);
        }
    }
}

/// Admits REST requests under per-route and global limits.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Arc<BucketHandle>>>,
    global: GlobalLockout,
    retry: RetryConfig,
    max_idle: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RateLimiter {
    /// Create a governor with the given retry policy.
    #[must_use]
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            global: GlobalLockout::new(),
            retry,
            max_idle: BUCKET_MAX_IDLE,
        }
    }

    /// Override the idle threshold for bucket pruning.
    #[must_use]
    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// The global lockout shared by every bucket.
    #[must_use]
    pub fn global(&self) -> &GlobalLockout {
        &self.global
    }

    /// Number of live buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }

    fn handle(&self, key: &str) -> Arc<BucketHandle> {
        let mut buckets = self.buckets.lock();
        Arc::clone(
            buckets
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(BucketHandle::new())),
        )
    }

    /// Drop buckets that have been idle past the threshold and have no
    /// queued or in-flight requests. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, handle| {
            if !handle.state.lock().idle_longer_than(self.max_idle) {
                return true;
            }
            // A failed try_lock means someone is queued or in flight.
            handle.gate.try_lock().is_err()
        });
        before - buckets.len()
    }

    /// Spawn the background janitor that prunes idle buckets until the
    /// governor is dropped.
    pub fn spawn_janitor(limiter: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(limiter);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await; // first tick fires immediately
            loop {
                timer.tick().await;
                let Some(limiter) = weak.upgrade() else { break };
                let removed = limiter.prune_idle();
                if removed > 0 {
                    debug!(removed, "pruned idle rate-limit buckets");
                }
            }
        })
    }

    /// Submit a request to the governor.
    ///
    /// `perform` executes exactly one wire attempt; the governor decides
    /// when and how often to call it. The returned response may still be
    /// a non-2xx status (other than 429, which is consumed here) for the
    /// caller to interpret.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitExhausted` after too many 429s, `Timeout` when
    /// an attempt deadline elapses, and `Transport` when the connection
    /// layer fails past the retry budget.
    pub async fn submit<F, Fut>(
        &self,
        bucket_key: &str,
        method: &Method,
        perform: F,
    ) -> RestResult<reqwest::Response>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = RestResult<reqwest::Response>>,
    {
        let handle = self.handle(bucket_key);
        let mut rate_limit_retries = 0u32;

        loop {
            self.global.wait_until_clear().await;

            // Fair queue: admissions on one bucket happen in submission
            // order.
            let gate = handle.gate.lock().await;

            loop {
                let delay = handle.state.lock().delay_until_ready(Utc::now());
                match delay {
                    Some(delay) => {
                        trace!(bucket = bucket_key, ?delay, "bucket exhausted, waiting");
                        sleep(delay).await;
                        handle.state.lock().refill();
                    }
                    None => break,
                }
            }

            // A global lockout may have landed while we waited out the
            // window.
            self.global.wait_until_clear().await;

            let hold = Self::must_hold(method, &handle);
            handle.state.lock().consume();

            let outcome = if hold {
                let outcome = self.perform_with_backoff(&perform).await;
                if let Ok(response) = &outcome {
                    handle.ingest(&RateLimitHeaders::parse(response.headers()));
                }
                drop(gate);
                outcome
            } else {
                drop(gate);
                let outcome = self.perform_with_backoff(&perform).await;
                if let Ok(response) = &outcome {
                    handle.ingest(&RateLimitHeaders::parse(response.headers()));
                }
                outcome
            };

            let response = outcome?;

            if response.status().as_u16() == 429 {
                rate_limit_retries += 1;
                if rate_limit_retries > self.retry.max_rate_limit_retries {
                    return Err(RestError::RateLimitExhausted {
                        route: bucket_key.to_string(),
                    });
                }

                let retry_after = Self::retry_after(&response);
                if Self::is_global(&response) {
                    self.global.lock_for(retry_after);
                } else {
                    debug!(bucket = bucket_key, ?retry_after, "bucket 429, backing off");
                    sleep(retry_after).await;
                }
                continue;
            }

            return Ok(response);
        }
    }

    /// Whether the request must keep the admission gate for its whole
    /// flight: mutating methods preserve submission order, and the first
    /// request on a bucket whose limit is still unknown probes alone.
    fn must_hold(method: &Method, handle: &BucketHandle) -> bool {
        matches!(*method, Method::PATCH | Method::PUT | Method::DELETE)
            || !handle.state.lock().limit_known()
    }

    async fn perform_with_backoff<F, Fut>(&self, perform: &F) -> RestResult<reqwest::Response>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = RestResult<reqwest::Response>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match perform().await {
                Ok(response) if response.status().is_server_error() => {
                    if attempt >= self.retry.max_attempts {
                        // Out of retries; surface the 5xx to the caller.
                        return Ok(response);
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    debug!(status = %response.status(), ?delay, attempt, "server error, retrying");
                    sleep(delay).await;
                }
                Ok(response) => return Ok(response),
                Err(RestError::Transport(reason)) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(RestError::Transport(reason));
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    debug!(%reason, ?delay, attempt, "transport error, retrying");
                    sleep(delay).await;
                }
                // Deadlines and caller bugs are not retried.
                Err(other) => return Err(other),
            }
        }
    }

    fn retry_after(response: &reqwest::Response) -> Duration {
        response
            .headers()
            .get("retry-after")
            .and_then(|value| value.to_str().ok())
            .and_then(|text| text.parse::<f64>().ok())
            .map_or(Duration::from_secs(1), Duration::from_secs_f64)
    }

    fn is_global(response: &reqwest::Response) -> bool {
        response.headers().contains_key("x-ratelimit-global")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn response(status: u16, headers: &[(&str, &str)]) -> reqwest::Response {
        let mut builder = http::Response::builder().status(status);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        reqwest::Response::from(builder.body("").expect("valid response"))
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            backoff_base: Duration::from_millis(5),
            backoff_cap: Duration::from_millis(40),
            max_attempts: 5,
            max_rate_limit_retries: 5,
        }
    }

    #[test]
    fn test_backoff_delays() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(30)); // capped
    }

    #[test]
    fn test_global_lockout_state() {
        let lockout = GlobalLockout::new();
        assert!(!lockout.is_locked());

        lockout.lock_for(Duration::from_secs(5));
        assert!(lockout.is_locked());
    }

    #[test]
    fn test_global_lockout_never_shortens() {
        let lockout = GlobalLockout::new();
        lockout.lock_for(Duration::from_secs(60));
        lockout.lock_for(Duration::from_millis(1));
        assert!(lockout.is_locked());
    }

    #[tokio::test]
    async fn test_global_lockout_clears() {
        let lockout = GlobalLockout::new();
        lockout.lock_for(Duration::from_millis(30));

        let start = Instant::now();
        lockout.wait_until_clear().await;
        assert!(start.elapsed() >= Duration::from_millis(25));
        assert!(!lockout.is_locked());
    }

    #[tokio::test]
    async fn test_submit_passes_through_success() {
        let limiter = RateLimiter::new(fast_retry());
        let response = limiter
            .submit("GET /gateway", &Method::GET, || async {
                Ok(response(200, &[]))
            })
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(limiter.bucket_count(), 1);
    }

    #[tokio::test]
    async fn test_submit_resubmits_on_429() {
        let limiter = RateLimiter::new(fast_retry());
        let calls = AtomicU32::new(0);

        let result = limiter
            .submit("POST /channels/1/messages", &Method::POST, || async {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                if call == 0 {
                    Ok(response(429, &[("retry-after", "0.01")]))
                } else {
                    Ok(response(200, &[]))
                }
            })
            .await
            .unwrap();

        assert_eq!(result.status().as_u16(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_submit_exhausts_after_too_many_429s() {
        let limiter = RateLimiter::new(fast_retry());
        let calls = AtomicU32::new(0);

        let result = limiter
            .submit("POST /channels/1/messages", &Method::POST, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(response(429, &[("retry-after", "0.001")]))
            })
            .await;

        match result {
            Err(RestError::RateLimitExhausted { route }) => {
                assert_eq!(route, "POST /channels/1/messages");
            }
            other => panic!("expected RateLimitExhausted, got {other:?}"),
        }
        // Initial submit plus five re-submissions.
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_global_429_locks_all_egress() {
        let limiter = Arc::new(RateLimiter::new(fast_retry()));
        let calls = AtomicU32::new(0);

        // First submit trips the global lockout for 100ms then succeeds.
        let start = Instant::now();
        limiter
            .submit("GET /a", &Method::GET, || async {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                if call == 0 {
                    Ok(response(
                        429,
                        &[("retry-after", "0.1"), ("x-ratelimit-global", "true")],
                    ))
                } else {
                    Ok(response(200, &[]))
                }
            })
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(95));

        // A different bucket submitted during lockout also waits it out.
        assert!(!limiter.global().is_locked());
    }

    #[tokio::test]
    async fn test_5xx_retries_then_succeeds() {
        let limiter = RateLimiter::new(fast_retry());
        let calls = AtomicU32::new(0);

        let result = limiter
            .submit("GET /gateway", &Method::GET, || async {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                if call < 2 {
                    Ok(response(502, &[]))
                } else {
                    Ok(response(200, &[]))
                }
            })
            .await
            .unwrap();

        assert_eq!(result.status().as_u16(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_5xx_surfaces_after_retry_budget() {
        let limiter = RateLimiter::new(RetryConfig {
            max_attempts: 2,
            ..fast_retry()
        });
        let calls = AtomicU32::new(0);

        let result = limiter
            .submit("GET /gateway", &Method::GET, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(response(503, &[]))
            })
            .await
            .unwrap();

        assert_eq!(result.status().as_u16(), 503);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_4xx_is_not_retried() {
        let limiter = RateLimiter::new(fast_retry());
        let calls = AtomicU32::new(0);

        let result = limiter
            .submit("GET /gateway", &Method::GET, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(response(404, &[]))
            })
            .await
            .unwrap();

        assert_eq!(result.status().as_u16(), 404);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_not_retried() {
        let limiter = RateLimiter::new(fast_retry());
        let calls = AtomicU32::new(0);

        let result = limiter
            .submit("GET /gateway", &Method::GET, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RestError::Timeout)
            })
            .await;

        assert!(matches!(result, Err(RestError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_error_exhausts_attempts() {
        let limiter = RateLimiter::new(RetryConfig {
            max_attempts: 3,
            ..fast_retry()
        });
        let calls = AtomicU32::new(0);

        let result = limiter
            .submit("GET /gateway", &Method::GET, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RestError::Transport("connection refused".into()))
            })
            .await;

        assert!(matches!(result, Err(RestError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_bucket_serializes_on_boundary() {
        // Every response reports limit=1, remaining=0, reset one window
        // ahead; concurrent PATCHes must go out one at a time.
        let limiter = Arc::new(RateLimiter::new(fast_retry()));
        let in_flight = Arc::new(AtomicU32::new(0));
        let max_in_flight = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = Arc::clone(&limiter);
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            handles.push(tokio::spawn(async move {
                limiter
                    .submit("PATCH /channels/1", &Method::PATCH, || {
                        let in_flight = Arc::clone(&in_flight);
                        let max_in_flight = Arc::clone(&max_in_flight);
                        async move {
                            let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                            max_in_flight.fetch_max(current, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                            let reset = (Utc::now()
                                + chrono::TimeDelta::milliseconds(30))
                            .timestamp_millis() as f64
                                / 1000.0;
                            Ok(response(
                                200,
                                &[
                                    ("x-ratelimit-limit", "1"),
                                    ("x-ratelimit-remaining", "0"),
                                    ("x-ratelimit-reset", &format!("{reset:.3}")),
                                ],
                            ))
                        }
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_buckets_run_in_parallel() {
        let limiter = Arc::new(RateLimiter::new(fast_retry()));
        let in_flight = Arc::new(AtomicU32::new(0));
        let max_in_flight = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for bucket in 0..4 {
            let limiter = Arc::clone(&limiter);
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            handles.push(tokio::spawn(async move {
                let key = format!("GET /channels/{bucket}");
                limiter
                    .submit(&key, &Method::GET, || {
                        let in_flight = Arc::clone(&in_flight);
                        let max_in_flight = Arc::clone(&max_in_flight);
                        async move {
                            let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                            max_in_flight.fetch_max(current, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                            Ok(response(200, &[]))
                        }
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(max_in_flight.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_prune_idle_buckets() {
        let limiter = RateLimiter::new(fast_retry()).with_max_idle(Duration::ZERO);

        limiter
            .submit("GET /gateway", &Method::GET, || async {
                Ok(response(200, &[]))
            })
            .await
            .unwrap();
        assert_eq!(limiter.bucket_count(), 1);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(limiter.prune_idle(), 1);
        assert_eq!(limiter.bucket_count(), 0);
    }
}
