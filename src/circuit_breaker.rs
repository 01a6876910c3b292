// =============================================================================
// circuit_breaker.rs — WHEN THE EXTRACTION SERVICE GOES DARK
// =============================================================================
//
// A run fans out hundreds of entity jobs against one extraction service. If
// that service falls over halfway through, every remaining job would sit on
// its HTTP timeout before failing. Three hundred tickers times thirty seconds
// is a long time to learn something we knew after the fifth failure.
//
// So the fetcher wraps every call in a breaker:
//
//   Closed   → calls flow; N consecutive service failures trip it
//   Open     → calls fail immediately with CircuitOpen until the cooldown ends
//   HalfOpen → calls flow again; M successes close it, one failure reopens it
//
// Only failures that say something about the service count. A response we
// could not decode is our problem, not theirs, and leaves the breaker alone.
// =============================================================================

use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Thresholds for one breaker.
#[derive(Debug, Clone, Copy)]
pub struct BreakerPolicy {
    /// Consecutive service failures that trip a closed breaker.
    pub failure_threshold: u32,
    /// Cooldown before an open breaker lets calls through again.
    pub reset_timeout: Duration,
    /// Successes in half-open needed to close.
    pub success_threshold: u32,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
    last_state_change: Instant,
    total_trips: u64,
    rejected: u64,
}

/// Thread-safe breaker, shared by every job that goes through one fetcher.
pub struct CircuitBreaker {
    name: String,
    policy: BreakerPolicy,
    inner: RwLock<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, policy: BreakerPolicy) -> Self {
        let name = name.into();
        info!(
            name = %name,
            failure_threshold = policy.failure_threshold,
            reset_timeout_secs = policy.reset_timeout.as_secs(),
            success_threshold = policy.success_threshold,
            "Circuit breaker armed"
        );

        Self {
            name,
            policy,
            inner: RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
                last_state_change: Instant::now(),
                total_trips: 0,
                rejected: 0,
            }),
        }
    }

    /// Run `call` unless the breaker is open, and feed its outcome back.
    pub fn call<T>(
        &self,
        call: impl FnOnce() -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        if !self.allow_request() {
            return Err(FetchError::CircuitOpen(self.name.clone()));
        }
        let outcome = call();
        match &outcome {
            Ok(_) => self.record_success(),
            Err(e) if e.is_service_failure() => self.record_failure(),
            Err(_) => {}
        }
        outcome
    }

    /// Whether a call may proceed right now. Moves Open → HalfOpen once the
    /// cooldown has elapsed.
    pub fn allow_request(&self) -> bool {
        {
            let inner = self.inner.read();
            match inner.state {
                CircuitState::Closed | CircuitState::HalfOpen => return true,
                CircuitState::Open => {}
            }
        }

        let mut inner = self.inner.write();
        if inner.state != CircuitState::Open {
            return true;
        }
        let cooled = inner
            .opened_at
            .map_or(true, |at| at.elapsed() >= self.policy.reset_timeout);
        if cooled {
            info!(name = %self.name, "Circuit breaker OPEN -> HALF_OPEN, probing the service");
            inner.state = CircuitState::HalfOpen;
            inner.success_count = 0;
            inner.last_state_change = Instant::now();
            true
        } else {
            inner.rejected += 1;
            false
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.policy.success_threshold {
                    info!(name = %self.name, "Circuit breaker HALF_OPEN -> CLOSED, service recovered");
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.opened_at = None;
                    inner.last_state_change = Instant::now();
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.write();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.policy.failure_threshold {
                    warn!(
                        name = %self.name,
                        failures = inner.failure_count,
                        "Circuit breaker TRIPPED, CLOSED -> OPEN"
                    );
                    Self::trip(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                warn!(name = %self.name, "Probe failed in HALF_OPEN, back to OPEN");
                Self::trip(&mut inner);
            }
            CircuitState::Open => inner.opened_at = Some(Instant::now()),
        }
    }

    fn trip(inner: &mut BreakerInner) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.success_count = 0;
        inner.total_trips += 1;
        inner.last_state_change = Instant::now();
    }

    pub fn state(&self) -> CircuitState {
        self.inner.read().state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.read();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            total_trips: inner.total_trips,
            rejected: inner.rejected,
            secs_in_state: inner.last_state_change.elapsed().as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub total_trips: u64,
    pub rejected: u64,
    pub secs_in_state: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(reset: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "extraction",
            BreakerPolicy {
                failure_threshold: 3,
                reset_timeout: reset,
                success_threshold: 2,
            },
        )
    }

    fn transport() -> Result<(), FetchError> {
        Err(FetchError::Transport("connection refused".into()))
    }

    #[test]
    fn test_starts_closed() {
        let cb = breaker(Duration::from_secs(5));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_trips_after_threshold_and_rejects_fast() {
        let cb = breaker(Duration::from_secs(60));
        for _ in 0..3 {
            assert!(cb.call(transport).is_err());
        }
        assert_eq!(cb.state(), CircuitState::Open);

        let mut called = false;
        let result = cb.call(|| {
            called = true;
            Ok(())
        });
        assert!(matches!(result, Err(FetchError::CircuitOpen(name)) if name == "extraction"));
        assert!(!called);
        assert_eq!(cb.snapshot().rejected, 1);
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let cb = breaker(Duration::from_secs(5));
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_decode_errors_do_not_count() {
        let cb = breaker(Duration::from_secs(5));
        for _ in 0..5 {
            let _ = cb.call(|| -> Result<(), FetchError> { Err(FetchError::Decode("bad json".into())) });
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_closes_after_enough_successes() {
        let cb = breaker(Duration::ZERO);
        for _ in 0..3 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);

        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = breaker(Duration::ZERO);
        for _ in 0..3 {
            cb.record_failure();
        }
        assert!(cb.allow_request());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.snapshot().total_trips, 2);
    }
}
