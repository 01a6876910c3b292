// End to end over the public API: universe file → orchestrated fetch into a
// SQLite file → signals read back from a fresh connection.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use filing_signal_engine::universe::load_universe;
use filing_signal_engine::{
    flatten, ActivistStake, Family, FetchError, FetchOrchestrator, FetchRequest, FilingFetcher,
    FilingStore, InstitutionalHolding, RateLimiter, RunConfig, SignalAggregator,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn run_config(family: Family, db_path: PathBuf) -> RunConfig {
    RunConfig {
        family,
        db_path,
        lookback_days: 365,
        max_workers: 3,
        force_refresh: false,
        job_timeout: Duration::from_secs(30),
        progress_every: 2,
    }
}

fn holding(fund: &str, period: NaiveDate, filed: NaiveDate, shares: i64) -> InstitutionalHolding {
    InstitutionalHolding {
        fund_id: fund.to_string(),
        fund_cik: format!("cik-{fund}"),
        fund_name: format!("{fund} Capital"),
        filing_date: filed,
        report_period: period,
        issuer_name: "ACME CORP".into(),
        cusip: "004239109".into(),
        ticker: Some("ACME".into()),
        shares,
        value_usd: Some(shares as f64 * 12.5),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn holdings_pipeline_reports_quarter_over_quarter_moves() {
    let dir = tempfile::tempdir().unwrap();
    let universe_path = dir.path().join("holdings.json");
    std::fs::write(
        &universe_path,
        r#"{"FUNDA": "1", "FUNDB": "2", "FUNDC": "3", "FUNDD": "4", "FUNDX": "5"}"#,
    )
    .unwrap();
    let db = dir.path().join("filings.db");

    let q1 = (date(2024, 3, 31), date(2024, 5, 15));
    let q2 = (date(2024, 6, 30), date(2024, 8, 14));
    let mut filings: HashMap<&'static str, Vec<InstitutionalHolding>> = HashMap::new();
    filings.insert("FUNDA", vec![holding("FUNDA", q1.0, q1.1, 1_000)]);
    filings.insert(
        "FUNDB",
        vec![holding("FUNDB", q1.0, q1.1, 500), holding("FUNDB", q2.0, q2.1, 800)],
    );
    filings.insert(
        "FUNDC",
        vec![holding("FUNDC", q1.0, q1.1, 500), holding("FUNDC", q2.0, q2.1, 500)],
    );
    filings.insert("FUNDD", vec![holding("FUNDD", q2.0, q2.1, 700)]);

    let fetcher: Arc<dyn FilingFetcher<InstitutionalHolding>> = Arc::new(
        move |req: &FetchRequest| -> Result<Vec<InstitutionalHolding>, FetchError> {
            req.limiter.acquire();
            match filings.get(req.entity.entity_id.as_str()) {
                Some(rows) => Ok(rows.clone()),
                None => Err(FetchError::Status {
                    status: 502,
                    body: "upstream parser unavailable".into(),
                }),
            }
        },
    );

    let entities = load_universe(&universe_path, None).unwrap();
    assert_eq!(entities.len(), 5);

    let limiter = Arc::new(RateLimiter::new(50.0, 5.0).unwrap());
    let orchestrator = FetchOrchestrator::new(
        run_config(Family::Holdings, db.clone()),
        limiter,
        Arc::clone(&fetcher),
    );
    let summary = orchestrator.run(entities.clone()).await;

    assert_eq!(summary.successful.len(), 4);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "FUNDX");
    assert_eq!(summary.total_rows, 6);

    // Nothing new the second time around.
    let again = orchestrator.run(entities).await;
    assert_eq!(again.total_rows, 0);

    let store = FilingStore::<InstitutionalHolding>::open(&db).unwrap();
    assert_eq!(store.record_count().unwrap(), 6);

    let signal = SignalAggregator::new(&store).compute_signal_as_of("ACME", 365, date(2024, 9, 30));
    assert_eq!(signal.new_positions, vec!["FUNDD Capital".to_string()]);
    assert_eq!(signal.exited_positions, vec!["FUNDA Capital".to_string()]);
    assert_eq!(signal.latest_total_shares, 2_000);
    assert_eq!(signal.prior_total_shares, 2_000);
    assert_eq!(signal.shares_delta, Some(0));

    let flat = flatten(&signal);
    assert_eq!(flat["holder_count"], 3);
    assert_eq!(flat["ticker"], "ACME");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn activist_signal_is_empty_for_an_untouched_database() {
    let dir = tempfile::tempdir().unwrap();
    let store = FilingStore::<ActivistStake>::open(dir.path().join("fresh.db")).unwrap();

    let signal = SignalAggregator::new(&store).compute_signal("NOBODY", 730);
    assert_eq!(signal.filing_count, 0);
    assert_eq!(signal.latest_activist, None);
    assert!(store.fetch_log_entries().unwrap().is_empty());
}
