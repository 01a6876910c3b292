// =============================================================================
// rate_limiter.rs — ONE BUCKET, MANY THIRSTY WORKERS
// =============================================================================
//
// Filing repositories publish fair-access policies and they mean them. Every
// worker that talks to the same service shares one of these, so the service
// sees a single polite client instead of N enthusiastic ones.
//
// Token bucket: tokens accrue continuously at `rate` per second up to
// `burst`. `acquire()` takes one token, sleeping as long as needed first.
// The lock is held only for the arithmetic; nobody sleeps while holding it.
// =============================================================================

use parking_lot::Mutex;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{IngestError, Result};

/// Slowest accepted rate: one token every ~11.6 days.
pub const MIN_RATE: f64 = 1e-6;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Thread-safe token bucket shared by every worker hitting one service.
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rate", &self.rate)
            .field("burst", &self.burst)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter that starts with a full bucket.
    ///
    /// `rate` must be finite and at least [`MIN_RATE`]. A `burst` below one
    /// token would never let anything through, so it is raised to one.
    pub fn new(rate: f64, burst: f64) -> Result<Self> {
        if !rate.is_finite() || rate < MIN_RATE {
            return Err(IngestError::Config(format!(
                "rate limiter rate must be a finite value >= {MIN_RATE}, got {rate}"
            )));
        }
        let burst = if burst.is_finite() { burst.max(1.0) } else { 1.0 };

        info!(rate = rate, burst = burst, "Rate limiter initialized");

        Ok(Self {
            rate,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn burst(&self) -> f64 {
        self.burst
    }

    /// Block until a token is available, then consume it.
    pub fn acquire(&self) {
        loop {
            let wait = match self.take_or_wait() {
                None => return,
                Some(wait) => wait,
            };
            debug!(wait_ms = wait.as_millis() as u64, "Rate limiter throttling caller");
            std::thread::sleep(wait);
        }
    }

    /// Take a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.take_or_wait().is_none()
    }

    /// Tokens currently banked (after refill). Informational only.
    pub fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        bucket.tokens
    }

    /// Consume a token and return `None`, or return how long until one exists.
    fn take_or_wait(&self) -> Option<Duration> {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - bucket.tokens;
            Some(Duration::try_from_secs_f64(deficit / self.rate).unwrap_or(Duration::MAX))
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_refill = now;
    }
}
