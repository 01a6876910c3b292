// =============================================================================
// FILING SIGNAL ENGINE — command line
// =============================================================================
//
//   filing-signal-engine fetch activist --tickers ACME,BETA
//   filing-signal-engine signal holdings --ticker AAPL
//   filing-signal-engine status japan --errors-only
//
// Logs go to stderr; anything meant for a pipe (signals, run summaries, the
// fetch log) goes to stdout.
//
// Exit codes: 0 when a run completes, however many entities failed inside it;
// 1 when the universe could not be loaded; 2 for anything else fatal.
// =============================================================================

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use filing_signal_engine::config::{Config, LogFormat};
use filing_signal_engine::universe::{load_universe, parse_override_list};
use filing_signal_engine::{
    flatten, ActivistStake, Entity, Family, FetchOrchestrator, FilingFetcher, FilingStore,
    HttpFetcher, IngestError, InstitutionalHolding, JapanLargeStake, RateLimiter, RunConfig,
    RunSummary, SignalAggregator, Summarize,
};

/// How long shutdown waits for abandoned (timed-out) workers.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(
    name = "filing-signal-engine",
    version,
    about = "Ingest ownership filings and compute per-ticker ownership signals"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch new filings for every entity in a family's universe.
    Fetch(FetchArgs),
    /// Print one ticker's signal as flat JSON.
    Signal(SignalArgs),
    /// Print the fetch log for a family.
    Status(StatusArgs),
}

#[derive(Args)]
struct FetchArgs {
    /// activist, holdings or japan
    family: Family,

    /// Comma-separated tickers to fetch instead of the whole universe.
    #[arg(long, conflicts_with = "funds")]
    tickers: Option<String>,

    /// Comma-separated fund ids to fetch instead of the whole universe.
    #[arg(long)]
    funds: Option<String>,

    #[arg(long)]
    lookback_days: Option<u32>,

    /// Ignore stored filings and ask for everything in the window.
    #[arg(long)]
    force_refresh: bool,

    #[arg(long)]
    max_workers: Option<usize>,

    #[arg(long)]
    db: Option<PathBuf>,

    /// Universe file; defaults to <universe_dir>/<family>.json.
    #[arg(long)]
    universe: Option<PathBuf>,
}

#[derive(Args)]
struct SignalArgs {
    family: Family,

    #[arg(long)]
    ticker: String,

    #[arg(long)]
    lookback_days: Option<u32>,

    #[arg(long)]
    db: Option<PathBuf>,
}

#[derive(Args)]
struct StatusArgs {
    family: Family,

    /// Only entities whose last fetch failed.
    #[arg(long)]
    errors_only: bool,

    #[arg(long)]
    db: Option<PathBuf>,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Pretty => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .with_writer(std::io::stderr)
            .init(),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::from_env();
    init_tracing(config.log_format);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("filing-engine")
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "❌ Could not start the async runtime");
            return ExitCode::from(2);
        }
    };

    let outcome = runtime.block_on(dispatch(cli.command, &config));
    // Timed-out workers are abandoned, not joined.
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    match outcome {
        Ok(code) => code,
        Err(e) => {
            error!(error = format!("{e:#}"), "❌ Fatal error");
            ExitCode::from(2)
        }
    }
}

async fn dispatch(command: Command, config: &Config) -> anyhow::Result<ExitCode> {
    match command {
        Command::Fetch(args) => run_fetch(config, args).await,
        Command::Signal(args) => run_signal(config, args).map(|()| ExitCode::SUCCESS),
        Command::Status(args) => run_status(config, args).map(|()| ExitCode::SUCCESS),
    }
}

// ═══════════════════════════════════════════
// FETCH
// ═══════════════════════════════════════════

async fn run_fetch(config: &Config, args: FetchArgs) -> anyhow::Result<ExitCode> {
    let family = args.family;
    let mut run = config.run_config(family);
    if let Some(days) = args.lookback_days {
        run.lookback_days = days;
    }
    if let Some(workers) = args.max_workers {
        run.max_workers = workers.max(1);
    }
    if let Some(db) = args.db {
        run.db_path = db;
    }
    run.force_refresh = args.force_refresh;

    let universe_path = args.universe.unwrap_or_else(|| config.universe_path(family));
    let overrides = args
        .tickers
        .or(args.funds)
        .map(|raw| parse_override_list(&raw));
    let entities = match load_universe(&universe_path, overrides.as_deref()) {
        Ok(entities) => entities,
        Err(e @ IngestError::UniverseUnavailable(_)) => {
            error!(family = %family, error = %e, "❌ Universe unavailable, nothing to fetch");
            return Ok(ExitCode::from(1));
        }
        Err(e) => return Err(e.into()),
    };

    info!(
        family = %family,
        entities = entities.len(),
        db = %run.db_path.display(),
        "🚛 Filing signal engine: fetch"
    );

    let limiter = Arc::new(RateLimiter::new(config.rate_per_sec, f64::from(config.rate_burst))?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => warn!("🛑 Interrupt received, finishing in-flight entities"),
            Err(e) => error!(error = %e, "Signal listener error"),
        }
        let _ = shutdown_tx.send(true);
    });

    let summary = match family {
        Family::Activist => {
            fetch_family::<ActivistStake>(config, run, limiter, entities, shutdown_rx).await?
        }
        Family::Holdings => {
            fetch_family::<InstitutionalHolding>(config, run, limiter, entities, shutdown_rx)
                .await?
        }
        Family::Japan => {
            fetch_family::<JapanLargeStake>(config, run, limiter, entities, shutdown_rx).await?
        }
    };

    for (entity, message) in &summary.failed {
        warn!(entity = %entity, error = %message, "Entity failed");
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(ExitCode::SUCCESS)
}

async fn fetch_family<F>(
    config: &Config,
    run: RunConfig,
    limiter: Arc<RateLimiter>,
    entities: Vec<Entity>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<RunSummary>
where
    F: filing_signal_engine::Filing + DeserializeOwned,
{
    let fetcher: Arc<dyn FilingFetcher<F>> = Arc::new(
        HttpFetcher::<F>::new(config, Handle::current()).context("building extraction client")?,
    );
    Ok(FetchOrchestrator::new(run, limiter, fetcher)
        .with_shutdown(shutdown)
        .run(entities)
        .await)
}

// ═══════════════════════════════════════════
// SIGNAL
// ═══════════════════════════════════════════

fn run_signal(config: &Config, args: SignalArgs) -> anyhow::Result<()> {
    let db = args.db.unwrap_or_else(|| config.db_path.clone());
    let lookback = args
        .lookback_days
        .unwrap_or_else(|| config.default_lookback(args.family));

    let signal = match args.family {
        Family::Activist => signal_map::<ActivistStake>(&db, &args.ticker, lookback)?,
        Family::Holdings => signal_map::<InstitutionalHolding>(&db, &args.ticker, lookback)?,
        Family::Japan => signal_map::<JapanLargeStake>(&db, &args.ticker, lookback)?,
    };
    println!("{}", serde_json::to_string_pretty(&signal)?);
    Ok(())
}

fn signal_map<F: Summarize>(
    db: &std::path::Path,
    ticker: &str,
    lookback_days: u32,
) -> anyhow::Result<serde_json::Map<String, serde_json::Value>> {
    let store = FilingStore::<F>::open_read_only(db)
        .with_context(|| format!("opening {}", db.display()))?;
    let signal = SignalAggregator::new(&store).compute_signal(ticker, lookback_days);
    Ok(flatten(&signal))
}

// ═══════════════════════════════════════════
// STATUS
// ═══════════════════════════════════════════

fn run_status(config: &Config, args: StatusArgs) -> anyhow::Result<()> {
    let db = args.db.unwrap_or_else(|| config.db_path.clone());
    match args.family {
        Family::Activist => print_status::<ActivistStake>(&db, args.errors_only),
        Family::Holdings => print_status::<InstitutionalHolding>(&db, args.errors_only),
        Family::Japan => print_status::<JapanLargeStake>(&db, args.errors_only),
    }
}

fn print_status<F: filing_signal_engine::Filing>(
    db: &std::path::Path,
    errors_only: bool,
) -> anyhow::Result<()> {
    let store = FilingStore::<F>::open_read_only(db)
        .with_context(|| format!("opening {}", db.display()))?;
    let entries = store.fetch_log_entries()?;
    let failing = entries.iter().filter(|e| !e.status.is_ok()).count();

    for entry in entries.iter().filter(|e| !errors_only || !e.status.is_ok()) {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            entry.entity_id,
            entry.source_id,
            entry.fetched_at.to_rfc3339(),
            entry.result_count,
            entry.status
        );
    }

    info!(
        table = F::SCHEMA.fetch_log_table,
        entities = entries.len(),
        failing = failing,
        records = store.record_count()?,
        "📊 Fetch log"
    );
    Ok(())
}
