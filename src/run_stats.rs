// ═══════════════════════════════════════════════════════════════
// RUN STATS - one set of counters per orchestrator run
// ═══════════════════════════════════════════════════════════════
//
// Workers bump these as they finish; the progress checkpoint and the final
// summary read them. Plain atomics, Relaxed ordering: every reader only
// wants a recent-enough picture, never a consistent one across counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Point-in-time view of a run's counters.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunStatsSnapshot {
    pub started: u64,
    pub completed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub rows_found: u64,
    pub rows_inserted: u64,
    pub elapsed_secs: f64,
    pub entities_per_minute: f64,
}

pub struct RunStats {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    rows_found: AtomicU64,
    rows_inserted: AtomicU64,
    start_time: Instant,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            started: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            rows_found: AtomicU64::new(0),
            rows_inserted: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of completed jobs, this one included.
    pub fn record_success(&self, rows_found: usize, rows_inserted: usize) -> u64 {
        self.rows_found.fetch_add(rows_found as u64, Ordering::Relaxed);
        self.rows_inserted.fetch_add(rows_inserted as u64, Ordering::Relaxed);
        self.succeeded.fetch_add(1, Ordering::Relaxed) + 1 + self.failed.load(Ordering::Relaxed)
    }

    /// Returns the number of completed jobs, this one included.
    pub fn record_failure(&self, timed_out: bool) -> u64 {
        if timed_out {
            self.timed_out.fetch_add(1, Ordering::Relaxed);
        }
        self.failed.fetch_add(1, Ordering::Relaxed) + 1 + self.succeeded.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> RunStatsSnapshot {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let succeeded = self.succeeded.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let completed = succeeded + failed;
        let entities_per_minute = if elapsed > 0.0 {
            completed as f64 / elapsed * 60.0
        } else {
            0.0
        };

        RunStatsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            completed,
            succeeded,
            failed,
            timed_out: self.timed_out.load(Ordering::Relaxed),
            rows_found: self.rows_found.load(Ordering::Relaxed),
            rows_inserted: self.rows_inserted.load(Ordering::Relaxed),
            elapsed_secs: elapsed,
            entities_per_minute,
        }
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}
