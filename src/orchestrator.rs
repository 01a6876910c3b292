// =============================================================================
// orchestrator.rs — ONE JOB PER ENTITY, NONE OF THEM ALLOWED TO RUIN THE RUN
// =============================================================================
//
// A fetch run takes a universe of entities and, for each one, on a bounded
// pool of blocking worker threads:
//
//   open a private store connection → ensure schema → read known dedup keys
//   (unless forcing a refresh) → ask the fetcher → insert-or-ignore → log the
//   fetch
//
// Anything that goes wrong inside one job stays inside that job. It becomes a
// failed EntityResult and an "error: ..." fetch-log row; the siblings never
// notice. A job that blows its wall-clock budget is reported as timed out and
// its thread is left to finish on its own; whatever it inserts late stays, but
// it no longer gets a say in the fetch log. A job that panics is reported as
// such.
//
// The only thing the workers share is the rate limiter (and whatever the
// fetcher shares internally). Every job opens its own SQLite connection.
//
// A ctrl-c flips the shutdown watch. Jobs already running finish or time out;
// entities not yet submitted come back as skipped.
// =============================================================================

use chrono::{Days, NaiveDate, Utc};
use futures::future;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::error::{IngestError, Result};
use crate::fetchers::{FetchRequest, FilingFetcher};
use crate::models::{Entity, Family, FetchStatus};
use crate::rate_limiter::RateLimiter;
use crate::run_stats::{RunStats, RunStatsSnapshot};
use crate::store::{open_with_schema, Filing, FilingStore};

/// Outcome of one entity's job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityResult {
    pub entity_id: String,
    pub source_id: String,
    pub rows_found: usize,
    pub rows_inserted: usize,
    /// Set when the job failed; the counts are then zero.
    pub error: Option<String>,
}

impl EntityResult {
    fn success(entity: &Entity, rows_found: usize, rows_inserted: usize) -> Self {
        Self {
            entity_id: entity.entity_id.clone(),
            source_id: entity.source_id.clone(),
            rows_found,
            rows_inserted,
            error: None,
        }
    }

    fn failure(entity: &Entity, err: &IngestError) -> Self {
        Self {
            entity_id: entity.entity_id.clone(),
            source_id: entity.source_id.clone(),
            rows_found: 0,
            rows_inserted: 0,
            error: Some(err.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// What a run did, entity by entity and in total.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub family: Family,
    /// Per-entity results in completion order.
    pub results: Vec<EntityResult>,
    pub successful: Vec<String>,
    /// `(entity_id, message)` for every failed entity.
    pub failed: Vec<(String, String)>,
    /// Entities never submitted because the run was interrupted.
    pub skipped: Vec<String>,
    /// Genuinely new rows across the run.
    pub total_rows: usize,
    /// Rows the fetcher returned across the run, new or not.
    pub rows_found: usize,
    pub elapsed: Duration,
    pub stats: RunStatsSnapshot,
}

/// Set once the orchestrator stops waiting for a job. Whoever holds the lock
/// owns the job's fetch-log row, so a late worker cannot overwrite the
/// failure recorded for it.
type Abandoned = Arc<Mutex<bool>>;

/// Everything a worker thread needs, shared by all jobs of one run.
struct JobContext<F> {
    db_path: PathBuf,
    fetcher: Arc<dyn FilingFetcher<F>>,
    limiter: Arc<RateLimiter>,
    since: NaiveDate,
    force_refresh: bool,
}

pub struct FetchOrchestrator<F: Filing> {
    run: RunConfig,
    limiter: Arc<RateLimiter>,
    fetcher: Arc<dyn FilingFetcher<F>>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<F: Filing> FetchOrchestrator<F> {
    pub fn new(
        run: RunConfig,
        limiter: Arc<RateLimiter>,
        fetcher: Arc<dyn FilingFetcher<F>>,
    ) -> Self {
        Self {
            run,
            limiter,
            fetcher,
            shutdown: None,
        }
    }

    /// Stop submitting new jobs once `shutdown` reads `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Fetch every entity and wait for all submitted jobs to finish or time out.
    pub async fn run(&self, entities: Vec<Entity>) -> RunSummary {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let family = F::SCHEMA.family;
        let since = Utc::now()
            .date_naive()
            .checked_sub_days(Days::new(u64::from(self.run.lookback_days)))
            .unwrap_or(NaiveDate::MIN);
        let workers = self.run.max_workers.max(1);
        let progress_every = self.run.progress_every.max(1);
        let job_timeout = self.run.job_timeout;
        let total = entities.len();

        info!(
            run_id = %run_id,
            family = %family,
            entities = total,
            workers = workers,
            since = %since,
            force_refresh = self.run.force_refresh,
            "🚀 Fetch run starting"
        );

        self.prepare_store().await;

        let ctx = Arc::new(JobContext {
            db_path: self.run.db_path.clone(),
            fetcher: Arc::clone(&self.fetcher),
            limiter: Arc::clone(&self.limiter),
            since,
            force_refresh: self.run.force_refresh,
        });
        let stats = Arc::new(RunStats::new());
        let shutdown = self.shutdown.clone();
        let interrupted = move || shutdown.as_ref().is_some_and(|rx| *rx.borrow());

        let mut jobs = stream::iter(entities.iter().cloned())
            .take_while(|_| future::ready(!interrupted()))
            .map(|entity| {
                let ctx = Arc::clone(&ctx);
                let stats = Arc::clone(&stats);
                async move {
                    stats.record_started();
                    let outcome = run_job(ctx, &entity, job_timeout).await;
                    (entity, outcome)
                }
            })
            .buffer_unordered(workers);

        let mut results: Vec<EntityResult> = Vec::with_capacity(total);
        while let Some((entity, outcome)) = jobs.next().await {
            let completed = match outcome {
                Ok((found, inserted)) => {
                    debug!(
                        entity = %entity.entity_id,
                        rows_found = found,
                        rows_inserted = inserted,
                        "Entity fetched"
                    );
                    results.push(EntityResult::success(&entity, found, inserted));
                    stats.record_success(found, inserted)
                }
                Err(err) => {
                    warn!(entity = %entity.entity_id, error = %err, "❌ Entity fetch failed");
                    let timed_out = matches!(err, IngestError::Timeout { .. });
                    results.push(EntityResult::failure(&entity, &err));
                    stats.record_failure(timed_out)
                }
            };

            if is_checkpoint(completed, progress_every) {
                let snap = stats.snapshot();
                info!(
                    run_id = %run_id,
                    completed = snap.completed,
                    total = total,
                    succeeded = snap.succeeded,
                    failed = snap.failed,
                    rows_inserted = snap.rows_inserted,
                    per_minute = format!("{:.1}", snap.entities_per_minute),
                    "📊 Progress checkpoint"
                );
            }
        }
        drop(jobs);

        let submitted: HashSet<&str> = results.iter().map(|r| r.entity_id.as_str()).collect();
        let skipped: Vec<String> = entities
            .iter()
            .filter(|e| !submitted.contains(e.entity_id.as_str()))
            .map(|e| e.entity_id.clone())
            .collect();
        if !skipped.is_empty() {
            warn!(run_id = %run_id, skipped = skipped.len(), "🛑 Run interrupted, remaining entities skipped");
        }

        let summary = RunSummary {
            run_id,
            family,
            successful: results
                .iter()
                .filter(|r| r.is_ok())
                .map(|r| r.entity_id.clone())
                .collect(),
            failed: results
                .iter()
                .filter_map(|r| r.error.as_ref().map(|e| (r.entity_id.clone(), e.clone())))
                .collect(),
            total_rows: results.iter().map(|r| r.rows_inserted).sum(),
            rows_found: results.iter().map(|r| r.rows_found).sum(),
            skipped,
            results,
            elapsed: started.elapsed(),
            stats: stats.snapshot(),
        };

        info!(
            run_id = %run_id,
            family = %family,
            successful = summary.successful.len(),
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            new_rows = summary.total_rows,
            elapsed_secs = format!("{:.1}", summary.elapsed.as_secs_f64()),
            "✅ Fetch run complete"
        );
        summary
    }

    /// Create the tables once before fanning out, so workers do not race on
    /// schema creation. A failure here is left for each job to report.
    async fn prepare_store(&self) {
        let path = self.run.db_path.clone();
        let prepared =
            tokio::task::spawn_blocking(move || open_with_schema::<F>(&path).map(drop)).await;
        match prepared {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Could not prepare filing store before the run"),
            Err(e) => error!(error = %e, "Store preparation task failed"),
        }
    }
}

fn is_checkpoint(completed: u64, every: usize) -> bool {
    every > 0 && completed > 0 && completed % every as u64 == 0
}

/// Run one entity's job on a blocking thread under the wall-clock budget.
async fn run_job<F: Filing>(
    ctx: Arc<JobContext<F>>,
    entity: &Entity,
    job_timeout: Duration,
) -> Result<(usize, usize)> {
    let abandoned: Abandoned = Arc::new(Mutex::new(false));
    let worker_ctx = Arc::clone(&ctx);
    let worker_entity = entity.clone();
    let worker_abandoned = Arc::clone(&abandoned);
    let handle = tokio::task::spawn_blocking(move || {
        fetch_entity(&worker_ctx, &worker_entity, &worker_abandoned)
    });

    let err = match tokio::time::timeout(job_timeout, handle).await {
        Ok(Ok(outcome)) => return outcome,
        Ok(Err(join_err)) => {
            error!(entity = %entity.entity_id, error = %join_err, "Entity job panicked");
            IngestError::JobPanicked {
                entity: entity.entity_id.clone(),
            }
        }
        Err(_) => IngestError::Timeout {
            entity: entity.entity_id.clone(),
            secs: job_timeout.as_secs_f64(),
        },
    };

    // The worker never got to record this failure itself, and from here on
    // it never will.
    let message = err.to_string();
    let log_entity = entity.clone();
    let _ = tokio::task::spawn_blocking(move || {
        let mut gone = abandoned.lock();
        *gone = true;
        record_failure(&ctx, &log_entity, &message);
    })
    .await;
    Err(err)
}

/// The body of one job. Records its own failure in the fetch log unless the
/// orchestrator has already given up on it.
fn fetch_entity<F: Filing>(
    ctx: &JobContext<F>,
    entity: &Entity,
    abandoned: &Mutex<bool>,
) -> Result<(usize, usize)> {
    let outcome = ingest_entity(ctx, entity, abandoned);
    if let Err(err) = &outcome {
        let gone = abandoned.lock();
        if !*gone {
            record_failure(ctx, entity, &err.to_string());
        }
    }
    outcome
}

fn ingest_entity<F: Filing>(
    ctx: &JobContext<F>,
    entity: &Entity,
    abandoned: &Mutex<bool>,
) -> Result<(usize, usize)> {
    let mut store = FilingStore::<F>::open(&ctx.db_path)?;
    store.ensure_schema()?;

    let known_keys = if ctx.force_refresh {
        HashSet::new()
    } else {
        store.known_keys(&entity.entity_id)?
    };
    debug!(entity = %entity.entity_id, known = known_keys.len(), "Fetching entity");

    let request = FetchRequest {
        entity: entity.clone(),
        since: ctx.since,
        limiter: Arc::clone(&ctx.limiter),
        known_keys,
    };
    let rows = ctx.fetcher.fetch(&request)?;
    let inserted = store.insert_records(&rows)?;

    let gone = abandoned.lock();
    if *gone {
        warn!(
            entity = %entity.entity_id,
            rows_inserted = inserted,
            "Abandoned job finished late, fetch log keeps its failure"
        );
    } else {
        store.log_fetch(&entity.entity_id, &entity.source_id, rows.len(), &FetchStatus::Ok)?;
    }
    Ok((rows.len(), inserted))
}

/// Best effort: a failure to log a failure is only worth a warning.
fn record_failure<F: Filing>(ctx: &JobContext<F>, entity: &Entity, message: &str) {
    let attempt = FilingStore::<F>::open(&ctx.db_path).and_then(|store| {
        store.ensure_schema()?;
        store.log_fetch(
            &entity.entity_id,
            &entity.source_id,
            0,
            &FetchStatus::Error(message.to_string()),
        )
    });
    if let Err(e) = attempt {
        warn!(entity = %entity.entity_id, error = %e, "Could not record failed fetch");
    }
}
