// =============================================================================
// config.rs — EVERY KNOB, IN ONE PLACE
// =============================================================================
//
// Nothing in the engine reads a global. The process builds one Config from
// the environment at startup, the CLI narrows it into a RunConfig for a
// single fetch run, and both get passed down explicitly.
//
// Every value can be overridden with a FILING_ENGINE_* variable (or a .env
// file). Unparseable values fall back to the default rather than killing the
// process over a typo in a timeout.
// =============================================================================

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::circuit_breaker::BreakerPolicy;
use crate::models::Family;
use crate::rate_limiter::MIN_RATE;

/// How the binary renders log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Process-wide configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // STORAGE
    // =========================================================================
    /// SQLite file shared by all three filing families.
    pub db_path: PathBuf,

    /// Directory with one `<family>.json` identifier mapping per family.
    pub universe_dir: PathBuf,

    // =========================================================================
    // EXTRACTION SERVICE
    // =========================================================================
    /// Base URL of the service that turns filing documents into rows.
    pub fetch_base_url: String,

    /// Sent on every outbound request. EDGAR mirrors insist on contact info.
    pub user_agent: String,

    pub http_timeout: Duration,

    // =========================================================================
    // THROTTLING
    // =========================================================================
    /// Outbound requests per second across all workers.
    pub rate_per_sec: f64,

    /// Tokens the limiter may bank while idle.
    pub rate_burst: u32,

    // =========================================================================
    // ORCHESTRATION
    // =========================================================================
    pub max_workers: usize,

    /// Wall-clock budget for one entity's job.
    pub job_timeout: Duration,

    /// Log a progress checkpoint every N completed entities.
    pub progress_every: usize,

    // =========================================================================
    // LOOKBACK WINDOWS (days)
    // =========================================================================
    pub activist_lookback_days: u32,
    pub holdings_lookback_days: u32,
    pub japan_lookback_days: u32,

    // =========================================================================
    // CIRCUIT BREAKER
    // =========================================================================
    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_reset_timeout: Duration,
    pub circuit_breaker_success_threshold: u32,

    // =========================================================================
    // LOGGING
    // =========================================================================
    pub log_format: LogFormat,
}

impl Config {
    /// Load from the process environment, after reading `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` is this over `env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str, default: &str| -> String {
            lookup(key).unwrap_or_else(|| default.to_string())
        };

        Config {
            db_path: PathBuf::from(get("FILING_ENGINE_DB_PATH", "data/filings.db")),
            universe_dir: PathBuf::from(get("FILING_ENGINE_UNIVERSE_DIR", "data/universe")),

            fetch_base_url: get("FILING_ENGINE_FETCH_BASE_URL", "http://127.0.0.1:8088"),
            user_agent: get(
                "FILING_ENGINE_USER_AGENT",
                "FilingSignalEngine/0.1 (ownership-research@filing-signal.dev)",
            ),
            http_timeout: Duration::from_secs(
                get("FILING_ENGINE_HTTP_TIMEOUT_SECS", "30").parse().unwrap_or(30),
            ),

            rate_per_sec: get("FILING_ENGINE_RATE_PER_SEC", "8.0")
                .parse::<f64>()
                .ok()
                .filter(|r| r.is_finite() && *r >= MIN_RATE)
                .unwrap_or(8.0),
            rate_burst: get("FILING_ENGINE_RATE_BURST", "8").parse().unwrap_or(8),

            max_workers: get("FILING_ENGINE_MAX_WORKERS", "4")
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .unwrap_or(4),
            job_timeout: Duration::from_secs(
                get("FILING_ENGINE_JOB_TIMEOUT_SECS", "300").parse().unwrap_or(300),
            ),
            progress_every: get("FILING_ENGINE_PROGRESS_EVERY", "25")
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .unwrap_or(25),

            activist_lookback_days: get("FILING_ENGINE_ACTIVIST_LOOKBACK_DAYS", "730")
                .parse()
                .unwrap_or(730),
            holdings_lookback_days: get("FILING_ENGINE_HOLDINGS_LOOKBACK_DAYS", "365")
                .parse()
                .unwrap_or(365),
            japan_lookback_days: get("FILING_ENGINE_JAPAN_LOOKBACK_DAYS", "730")
                .parse()
                .unwrap_or(730),

            circuit_breaker_failure_threshold: get("FILING_ENGINE_CB_FAILURE_THRESHOLD", "5")
                .parse()
                .unwrap_or(5),
            circuit_breaker_reset_timeout: Duration::from_secs(
                get("FILING_ENGINE_CB_RESET_TIMEOUT_SECS", "60").parse().unwrap_or(60),
            ),
            circuit_breaker_success_threshold: get("FILING_ENGINE_CB_SUCCESS_THRESHOLD", "2")
                .parse()
                .unwrap_or(2),

            log_format: get("FILING_ENGINE_LOG_FORMAT", "pretty")
                .parse()
                .unwrap_or(LogFormat::Pretty),
        }
    }

    pub fn default_lookback(&self, family: Family) -> u32 {
        match family {
            Family::Activist => self.activist_lookback_days,
            Family::Holdings => self.holdings_lookback_days,
            Family::Japan => self.japan_lookback_days,
        }
    }

    pub fn breaker_policy(&self) -> BreakerPolicy {
        BreakerPolicy {
            failure_threshold: self.circuit_breaker_failure_threshold,
            reset_timeout: self.circuit_breaker_reset_timeout,
            success_threshold: self.circuit_breaker_success_threshold,
        }
    }

    /// Universe file for one family.
    pub fn universe_path(&self, family: Family) -> PathBuf {
        self.universe_dir.join(format!("{}.json", family.slug()))
    }

    /// Run settings for one family with no CLI overrides applied.
    pub fn run_config(&self, family: Family) -> RunConfig {
        RunConfig {
            family,
            db_path: self.db_path.clone(),
            lookback_days: self.default_lookback(family),
            max_workers: self.max_workers,
            force_refresh: false,
            job_timeout: self.job_timeout,
            progress_every: self.progress_every,
        }
    }
}

/// Settings for one orchestrator run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub family: Family,
    pub db_path: PathBuf,
    pub lookback_days: u32,
    pub max_workers: usize,
    /// Ignore stored dedup keys and ask the collaborator for everything.
    pub force_refresh: bool,
    pub job_timeout: Duration,
    pub progress_every: usize,
}
