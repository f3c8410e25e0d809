// src/rate_limit.rs
//! Per-target token bucket with backoff-on-demand.
//!
//! One `RateLimiter` exists per rate-limited target and is shared as
//! `Arc<RateLimiter>`. The token bucket lives behind an async mutex; tokio's
//! mutex is fair, so concurrent `acquire` calls are served in arrival order.
//! The backoff delay sits behind its own short-lived lock so 429 handling
//! never queues behind a waiter.
//!
//! Callers do the request themselves:
//! 1) `acquire(timeout)` before the call,
//! 2) `handle_429(retry_after)` when the target answers 429,
//! 3) `reset_backoff()` after a successful call.

use std::time::Duration;

use metrics::counter;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Upper bound of a single internal wait so timeouts stay responsive.
const POLL_STEP: Duration = Duration::from_millis(100);

/// Longest backoff any source can impose, whatever its `Retry-After` says.
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Static limits for one kind of target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitProfile {
    pub requests_per_minute: u32,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
}

impl RateLimitProfile {
    /// For sources that punish bursts hard (30 req/min, x2.5, capped at 10 min).
    pub fn conservative() -> Self {
        Self {
            requests_per_minute: 30,
            backoff_multiplier: 2.5,
            max_backoff: Duration::from_secs(600),
        }
    }

    /// Default for everything else (60 req/min, x2.0, capped at 5 min).
    pub fn generic() -> Self {
        Self {
            requests_per_minute: 60,
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(300),
        }
    }

    /// Resolve a preset by name, case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match Self::canonical_name(name)? {
            "conservative" => Some(Self::conservative()),
            _ => Some(Self::generic()),
        }
    }

    /// The preset a name refers to; aliases and case variants collapse.
    pub fn canonical_name(name: &str) -> Option<&'static str> {
        match name.trim().to_ascii_lowercase().as_str() {
            "conservative" => Some("conservative"),
            "generic" | "default" => Some("generic"),
            _ => None,
        }
    }
}

impl Default for RateLimitProfile {
    fn default() -> Self {
        Self::generic()
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, capacity: f64, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    capacity: f64,
    /// Tokens per second.
    refill_rate: f64,
    backoff_multiplier: f64,
    max_backoff: f64,
    /// Token bucket. Held for the whole of `acquire`, so waiters are served
    /// in arrival order.
    state: Mutex<BucketState>,
    /// Active backoff in seconds; 0 means none. Kept apart from the bucket so
    /// `handle_429` / `reset_backoff` never wait behind a sleeping `acquire`.
    delay: parking_lot::Mutex<f64>,
}

impl RateLimiter {
    /// Start with a full bucket and no backoff.
    pub fn new(name: impl Into<String>, profile: RateLimitProfile) -> Self {
        let capacity = f64::from(profile.requests_per_minute.max(1));
        Self {
            name: name.into(),
            capacity,
            refill_rate: capacity / 60.0,
            backoff_multiplier: profile.backoff_multiplier.max(1.0),
            max_backoff: profile.max_backoff.min(MAX_DELAY).as_secs_f64(),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            delay: parking_lot::Mutex::new(0.0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Wait out any backoff, then take one token.
    ///
    /// Returns `false` if `timeout` elapses first (lock wait included); waits
    /// indefinitely when `timeout` is `None` or too large to represent.
    pub async fn acquire(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        let mut state = match deadline {
            Some(d) => match tokio::time::timeout_at(d, self.state.lock()).await {
                Ok(guard) => guard,
                Err(_) => {
                    debug!(target: "rate_limit", limiter = %self.name, "timed out waiting for limiter lock");
                    return false;
                }
            },
            None => self.state.lock().await,
        };

        let delay = self.delay_secs();
        if delay > 0.0 {
            debug!(
                target: "rate_limit",
                limiter = %self.name,
                delay_secs = delay,
                "waiting out backoff"
            );
            let started = Instant::now();
            loop {
                // Re-read each step: a reset ends the wait early, a new 429 extends it.
                let remaining = secs(self.delay_secs()).saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    break;
                }
                match next_step(remaining, deadline) {
                    Some(step) => sleep(step).await,
                    None => return false,
                }
            }
        }

        loop {
            state.refill(self.capacity, self.refill_rate);
            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                return true;
            }
            let needed = secs((1.0 - state.tokens) / self.refill_rate);
            match next_step(needed, deadline) {
                Some(step) => sleep(step).await,
                None => {
                    debug!(target: "rate_limit", limiter = %self.name, "timed out waiting for token");
                    return false;
                }
            }
        }
    }

    /// Record a 429. An explicit `retry_after` wins (bounded by one day);
    /// otherwise grow the delay exponentially up to `max_backoff`.
    pub async fn handle_429(&self, retry_after: Option<Duration>) {
        let delay = {
            let mut delay = self.delay.lock();
            *delay = match retry_after {
                Some(d) => d.min(MAX_DELAY).as_secs_f64(),
                None if *delay <= 0.0 => self.backoff_multiplier.min(self.max_backoff),
                None => (*delay * self.backoff_multiplier).min(self.max_backoff),
            };
            *delay
        };
        counter!("ingest_rate_limited_total").increment(1);
        warn!(
            target: "rate_limit",
            limiter = %self.name,
            delay_secs = delay,
            explicit = retry_after.is_some(),
            "rate limited; backing off"
        );
    }

    pub async fn reset_backoff(&self) {
        let mut delay = self.delay.lock();
        if *delay > 0.0 {
            debug!(target: "rate_limit", limiter = %self.name, "backoff reset");
        }
        *delay = 0.0;
    }

    pub async fn current_delay(&self) -> Duration {
        secs(self.delay_secs())
    }

    /// Token count after a lazy refill.
    pub async fn available_tokens(&self) -> f64 {
        let mut state = self.state.lock().await;
        state.refill(self.capacity, self.refill_rate);
        state.tokens
    }

    fn delay_secs(&self) -> f64 {
        *self.delay.lock()
    }
}

/// Seconds to `Duration`, saturating at `MAX_DELAY`; NaN and negatives are zero.
fn secs(s: f64) -> Duration {
    if s.is_nan() || s <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(s)
        .unwrap_or(MAX_DELAY)
        .min(MAX_DELAY)
}

/// Next sleep: `min(remaining_wait, POLL_STEP, remaining_timeout)`, or `None` once the deadline passed.
fn next_step(remaining: Duration, deadline: Option<Instant>) -> Option<Duration> {
    let mut step = remaining.min(POLL_STEP);
    if let Some(d) = deadline {
        let left = d.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return None;
        }
        step = step.min(left);
    }
    Some(step.max(Duration::from_millis(1)))
}

/// Parse a `Retry-After` header: delta-seconds or an HTTP-date. Values beyond
/// one day are clamped to one day.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let v = value.trim();
    if let Ok(s) = v.parse::<f64>() {
        return (s.is_finite() && s >= 0.0).then(|| secs(s));
    }
    let at = chrono::DateTime::parse_from_rfc2822(v).ok()?;
    let delta = at.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO).min(MAX_DELAY))
}
