// =============================================================================
// signals/activist.rs — WHO IS CIRCLING THE BOARDROOM
// =============================================================================

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;

use super::purpose::is_activist_purpose;
use super::{max_opt, Summarize};
use crate::models::ActivistStake;

/// Per-ticker summary of 13D/13G holder lines in a window. Counts are per
/// holder line, so a joint filing by three reporting persons counts three.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivistSignal {
    pub ticker: String,
    pub lookback_days: u32,
    pub filing_count: usize,
    /// Schedule 13D lines.
    pub activist_count: usize,
    /// Schedule 13G lines.
    pub passive_count: usize,
    pub amendment_count: usize,
    pub distinct_filers: usize,
    /// Lines whose stated purpose reads as activist, whatever the form.
    pub activist_purpose_count: usize,
    pub max_stake_pct: Option<f64>,
    /// Most recent 13D filer.
    pub latest_activist: Option<String>,
    pub latest_filer: Option<String>,
    pub latest_filing_date: Option<NaiveDate>,
}

impl ActivistSignal {
    pub fn empty(ticker: &str, lookback_days: u32) -> Self {
        Self {
            ticker: ticker.to_string(),
            lookback_days,
            filing_count: 0,
            activist_count: 0,
            passive_count: 0,
            amendment_count: 0,
            distinct_filers: 0,
            activist_purpose_count: 0,
            max_stake_pct: None,
            latest_activist: None,
            latest_filer: None,
            latest_filing_date: None,
        }
    }
}

impl Summarize for ActivistStake {
    type Signal = ActivistSignal;

    fn summarize(ticker: &str, lookback_days: u32, rows: &[Self]) -> ActivistSignal {
        let mut signal = ActivistSignal::empty(ticker, lookback_days);
        let mut filers: HashSet<&str> = HashSet::new();

        for row in rows {
            signal.filing_count += 1;
            if row.is_activist {
                signal.activist_count += 1;
                if signal.latest_activist.is_none() {
                    signal.latest_activist = Some(row.filer_name.clone());
                }
            } else {
                signal.passive_count += 1;
            }
            if row.is_amendment() {
                signal.amendment_count += 1;
            }
            if is_activist_purpose(row.purpose.as_deref()) {
                signal.activist_purpose_count += 1;
            }
            signal.max_stake_pct = max_opt(signal.max_stake_pct, row.percent_owned);
            filers.insert(row.filer_name.as_str());
        }

        if let Some(first) = rows.first() {
            signal.latest_filer = Some(first.filer_name.clone());
            signal.latest_filing_date = Some(first.filing_date);
        }
        signal.distinct_filers = filers.len();
        signal
    }
}
