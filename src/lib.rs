//! Filing signal engine.
//!
//! Ingests ownership disclosures (13D/13G stakes, 13F holdings, Japanese
//! large-shareholding reports) into an idempotent SQLite store and reduces
//! them into per-ticker signals.
//!
//! The pieces, leaves first: [`rate_limiter::RateLimiter`] throttles the
//! outbound calls, [`store::FilingStore`] owns persistence for one family,
//! [`orchestrator::FetchOrchestrator`] fans fetch jobs out over a bounded
//! worker pool, and [`signals::SignalAggregator`] reads the results back.

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod fetchers;
pub mod models;
pub mod orchestrator;
pub mod rate_limiter;
pub mod run_stats;
pub mod signals;
pub mod store;
pub mod universe;

pub use config::{Config, RunConfig};
pub use error::{FetchError, IngestError, Result};
pub use fetchers::{FetchRequest, FilingFetcher, HttpFetcher};
pub use models::{
    ActivistStake, Entity, Family, FetchLogEntry, FetchStatus, InstitutionalHolding,
    JapanLargeStake,
};
pub use orchestrator::{EntityResult, FetchOrchestrator, RunSummary};
pub use rate_limiter::RateLimiter;
pub use signals::{flatten, SignalAggregator, Summarize};
pub use store::{Filing, FilingStore};
