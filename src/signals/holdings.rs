// =============================================================================
// signals/holdings.rs — SMART MONEY, QUARTER OVER QUARTER
// =============================================================================
//
// Holdings are fetched per fund but summarized per security. For one ticker we
// look at the two most recent report periods present in the window and ask:
// who showed up, who left, and did the institutional share count move?
//
// A fund that re-files for the same period (13F-HR/A) is counted once, from
// its most recent filing for that period.
// =============================================================================

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use super::{max_opt, Summarize};
use crate::models::InstitutionalHolding;

/// Per-ticker institutional positioning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingsSignal {
    pub ticker: String,
    pub lookback_days: u32,
    /// Distinct funds holding the security in the latest period.
    pub holder_count: usize,
    pub latest_period: Option<NaiveDate>,
    pub prior_period: Option<NaiveDate>,
    pub latest_total_shares: i64,
    pub prior_total_shares: i64,
    /// Latest minus prior aggregate shares. Only set against a non-zero prior.
    pub shares_delta: Option<i64>,
    pub shares_delta_pct: Option<f64>,
    pub max_position_value: Option<f64>,
    /// Fund behind the most recently filed line.
    pub latest_holder: Option<String>,
    /// Funds present in the latest period only, sorted.
    pub new_positions: Vec<String>,
    /// Funds present in the prior period only, sorted.
    pub exited_positions: Vec<String>,
}

impl HoldingsSignal {
    pub fn empty(ticker: &str, lookback_days: u32) -> Self {
        Self {
            ticker: ticker.to_string(),
            lookback_days,
            holder_count: 0,
            latest_period: None,
            prior_period: None,
            latest_total_shares: 0,
            prior_total_shares: 0,
            shares_delta: None,
            shares_delta_pct: None,
            max_position_value: None,
            latest_holder: None,
            new_positions: vec![],
            exited_positions: vec![],
        }
    }
}

/// Funds and their summed shares for one report period.
#[derive(Default)]
struct PeriodBook {
    holders: BTreeSet<String>,
    total_shares: i64,
}

impl Summarize for InstitutionalHolding {
    type Signal = HoldingsSignal;

    fn summarize(ticker: &str, lookback_days: u32, rows: &[Self]) -> HoldingsSignal {
        let mut signal = HoldingsSignal::empty(ticker, lookback_days);
        let Some(first) = rows.first() else {
            return signal;
        };
        signal.latest_holder = Some(first.fund_name.clone());

        // Latest filing date per (period, fund); rows arrive newest first.
        let mut latest_filing: HashMap<(NaiveDate, &str), NaiveDate> = HashMap::new();
        for row in rows {
            latest_filing
                .entry((row.report_period, row.fund_cik.as_str()))
                .or_insert(row.filing_date);
            signal.max_position_value = max_opt(signal.max_position_value, row.value_usd);
        }

        let mut books: HashMap<NaiveDate, PeriodBook> = HashMap::new();
        for row in rows {
            let key = (row.report_period, row.fund_cik.as_str());
            if latest_filing.get(&key) != Some(&row.filing_date) {
                continue;
            }
            let book = books.entry(row.report_period).or_default();
            book.holders.insert(row.fund_name.clone());
            book.total_shares = book.total_shares.saturating_add(row.shares);
        }

        let mut periods: Vec<NaiveDate> = books.keys().copied().collect();
        periods.sort_unstable_by(|a, b| b.cmp(a));

        let latest_period = periods[0];
        let latest = &books[&latest_period];
        signal.latest_period = Some(latest_period);
        signal.holder_count = latest.holders.len();
        signal.latest_total_shares = latest.total_shares;

        if let Some(&prior_period) = periods.get(1) {
            let prior = &books[&prior_period];
            signal.prior_period = Some(prior_period);
            signal.prior_total_shares = prior.total_shares;

            signal.new_positions = latest.holders.difference(&prior.holders).cloned().collect();
            signal.exited_positions = prior.holders.difference(&latest.holders).cloned().collect();

            if prior.total_shares != 0 {
                let delta = latest.total_shares.saturating_sub(prior.total_shares);
                signal.shares_delta = Some(delta);
                signal.shares_delta_pct =
                    Some(delta as f64 / prior.total_shares as f64 * 100.0);
            }
        }

        signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::SignalAggregator;
    use crate::store::FilingStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn line(fund: &str, period: NaiveDate, filed: NaiveDate, shares: i64) -> InstitutionalHolding {
        InstitutionalHolding {
            fund_id: fund.to_lowercase(),
            fund_cik: format!("cik-{fund}"),
            fund_name: fund.into(),
            filing_date: filed,
            report_period: period,
            issuer_name: "ACME CORP".into(),
            cusip: "000000AA1".into(),
            ticker: Some("ACME".into()),
            shares,
            value_usd: Some(shares as f64 * 10.0),
        }
    }

    fn q1() -> (NaiveDate, NaiveDate) {
        (date(2024, 3, 31), date(2024, 5, 15))
    }

    fn q2() -> (NaiveDate, NaiveDate) {
        (date(2024, 6, 30), date(2024, 8, 14))
    }

    #[test]
    fn test_new_and_exited_positions() {
        let (p1, f1) = q1();
        let (p2, f2) = q2();
        let rows = vec![
            line("B", p2, f2, 100),
            line("C", p2, f2, 100),
            line("D", p2, f2, 100),
            line("A", p1, f1, 100),
            line("B", p1, f1, 100),
            line("C", p1, f1, 100),
        ];
        let signal = InstitutionalHolding::summarize("ACME", 365, &rows);

        assert_eq!(signal.new_positions, vec!["D"]);
        assert_eq!(signal.exited_positions, vec!["A"]);
        assert_eq!(signal.holder_count, 3);
        assert_eq!(signal.latest_period, Some(p2));
        assert_eq!(signal.prior_period, Some(p1));
    }

    #[test]
    fn test_share_delta_against_prior_period() {
        let (p1, f1) = q1();
        let (p2, f2) = q2();
        let rows = vec![line("A", p2, f2, 150), line("A", p1, f1, 100)];
        let signal = InstitutionalHolding::summarize("ACME", 365, &rows);

        assert_eq!(signal.latest_total_shares, 150);
        assert_eq!(signal.prior_total_shares, 100);
        assert_eq!(signal.shares_delta, Some(50));
        assert_eq!(signal.shares_delta_pct, Some(50.0));
        assert_eq!(signal.max_position_value, Some(1500.0));
    }

    #[test]
    fn test_no_delta_against_zero_or_missing_prior() {
        let (p1, f1) = q1();
        let (p2, f2) = q2();

        let single = InstitutionalHolding::summarize("ACME", 365, &[line("A", p2, f2, 150)]);
        assert_eq!(single.shares_delta, None);
        assert!(single.new_positions.is_empty());
        assert!(single.exited_positions.is_empty());

        let zero_prior = InstitutionalHolding::summarize(
            "ACME",
            365,
            &[line("A", p2, f2, 150), line("A", p1, f1, 0)],
        );
        assert_eq!(zero_prior.prior_period, Some(p1));
        assert_eq!(zero_prior.shares_delta, None);
        assert_eq!(zero_prior.shares_delta_pct, None);
    }

    #[test]
    fn test_absurd_share_counts_saturate() {
        let (p1, f1) = q1();
        let (p2, f2) = q2();
        let rows = vec![
            line("A", p2, f2, i64::MAX),
            line("B", p2, f2, i64::MAX),
            line("A", p1, f1, -5),
        ];
        let signal = InstitutionalHolding::summarize("ACME", 365, &rows);

        assert_eq!(signal.latest_total_shares, i64::MAX);
        assert_eq!(signal.prior_total_shares, -5);
        assert_eq!(signal.shares_delta, Some(i64::MAX));
    }

    #[test]
    fn test_amended_report_for_same_period_counts_once() {
        let (p2, f2) = q2();
        let amended = date(2024, 9, 1);
        let rows = vec![line("A", p2, amended, 120), line("A", p2, f2, 100)];
        let signal = InstitutionalHolding::summarize("ACME", 365, &rows);

        assert_eq!(signal.holder_count, 1);
        assert_eq!(signal.latest_total_shares, 120);
        assert_eq!(signal.prior_period, None);
    }

    #[test]
    fn test_aggregator_reads_by_security_ticker() {
        let (p1, f1) = q1();
        let (p2, f2) = q2();
        let mut store = FilingStore::<InstitutionalHolding>::open_in_memory().unwrap();
        store.ensure_schema().unwrap();

        let mut other = line("Z", p2, f2, 999);
        other.ticker = Some("OTHR".into());
        other.cusip = "999999ZZ9".into();
        store
            .insert_records(&[
                line("A", p1, f1, 100),
                line("B", p1, f1, 100),
                line("C", p1, f1, 100),
                line("B", p2, f2, 100),
                line("C", p2, f2, 100),
                line("D", p2, f2, 100),
                other,
            ])
            .unwrap();

        let signal = SignalAggregator::new(&store).compute_signal_as_of("ACME", 365, date(2024, 9, 30));
        assert_eq!(signal.new_positions, vec!["D"]);
        assert_eq!(signal.exited_positions, vec!["A"]);
        assert_eq!(signal.shares_delta, Some(0));
    }
}
