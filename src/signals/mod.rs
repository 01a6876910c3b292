// =============================================================================
// signals/mod.rs — FROM A PILE OF FILINGS TO A HANDFUL OF NUMBERS
// =============================================================================
//
// The aggregator is a pure read over one FilingStore. It keeps no state and
// never writes. Ask twice, get the same answer twice.
//
// It also never fails: a store with no tables, a ticker nobody filed on, or a
// database hiccup all produce a well-formed, empty signal. Downstream scoring
// merges these into bigger records and has no use for an error here.
// =============================================================================

pub mod activist;
pub mod holdings;
pub mod japan;
pub mod purpose;

use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::Debug;
use tracing::{debug, warn};

use crate::store::{Filing, FilingStore};

pub use activist::ActivistSignal;
pub use holdings::HoldingsSignal;
pub use japan::JapanSignal;

/// A filing family that can be reduced to a per-ticker signal.
pub trait Summarize: Filing {
    type Signal: Serialize + Clone + Debug + PartialEq;

    /// Reduce rows (already windowed, newest first) into a signal.
    fn summarize(ticker: &str, lookback_days: u32, rows: &[Self]) -> Self::Signal;
}

/// Read-only reducer over one family's store.
pub struct SignalAggregator<'a, F: Filing> {
    store: &'a FilingStore<F>,
}

impl<'a, F: Summarize> SignalAggregator<'a, F> {
    pub fn new(store: &'a FilingStore<F>) -> Self {
        Self { store }
    }

    /// Signal over the last `lookback_days` days, counted back from today (UTC).
    pub fn compute_signal(&self, ticker: &str, lookback_days: u32) -> F::Signal {
        self.compute_signal_as_of(ticker, lookback_days, Utc::now().date_naive())
    }

    /// Signal over the `lookback_days` days ending at `as_of`, inclusive.
    pub fn compute_signal_as_of(
        &self,
        ticker: &str,
        lookback_days: u32,
        as_of: NaiveDate,
    ) -> F::Signal {
        let since = as_of
            .checked_sub_days(Days::new(u64::from(lookback_days)))
            .unwrap_or(NaiveDate::MIN);

        let rows = match self.store.rows_for_ticker(ticker, since) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    ticker = ticker,
                    family = %F::SCHEMA.family,
                    error = %e,
                    "Signal query failed — returning an empty signal"
                );
                Vec::new()
            }
        };
        let rows: Vec<F> = rows
            .into_iter()
            .filter(|row| row.filing_date() <= as_of)
            .collect();

        debug!(
            ticker = ticker,
            family = %F::SCHEMA.family,
            rows = rows.len(),
            since = %since,
            "Computing signal"
        );
        F::summarize(ticker, lookback_days, &rows)
    }
}

/// A signal as a flat JSON object, ready to merge into a scoring record.
pub fn flatten<S: Serialize>(signal: &S) -> Map<String, Value> {
    match serde_json::to_value(signal) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => Map::new(),
    }
}

/// Running maximum over optional values, ignoring NaN.
pub(crate) fn max_opt(current: Option<f64>, candidate: Option<f64>) -> Option<f64> {
    match (current, candidate.filter(|v| !v.is_nan())) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (None, b) => b,
        (a, None) => a,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivistStake;

    #[test]
    fn test_max_opt_ignores_missing_and_nan() {
        assert_eq!(max_opt(None, None), None);
        assert_eq!(max_opt(None, Some(3.0)), Some(3.0));
        assert_eq!(max_opt(Some(5.0), Some(3.0)), Some(5.0));
        assert_eq!(max_opt(Some(5.0), Some(f64::NAN)), Some(5.0));
    }

    #[test]
    fn test_signal_before_any_schema_is_empty() {
        let store = FilingStore::<ActivistStake>::open_in_memory().unwrap();
        let signal = SignalAggregator::new(&store).compute_signal("ACME", 365);
        assert_eq!(signal, ActivistSignal::empty("ACME", 365));
    }

    #[test]
    fn test_flatten_produces_flat_object() {
        let map = flatten(&ActivistSignal::empty("ACME", 30));
        assert_eq!(map.get("ticker"), Some(&Value::from("ACME")));
        assert_eq!(map.get("filing_count"), Some(&Value::from(0)));
        assert!(map.values().all(|v| !v.is_object()));
    }
}
