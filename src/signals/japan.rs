// =============================================================================
// signals/japan.rs — 大量保有報告書, SUMMARIZED
// =============================================================================

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;

use super::purpose::is_activist_purpose;
use super::{max_opt, Summarize};
use crate::models::JapanLargeStake;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JapanSignal {
    pub ticker: String,
    pub lookback_days: u32,
    pub filing_count: usize,
    pub new_report_count: usize,
    pub change_report_count: usize,
    pub activist_purpose_count: usize,
    pub distinct_filers: usize,
    pub max_holding_ratio: Option<f64>,
    /// Largest jump in holding ratio (percentage points) any single report
    /// disclosed against its own previous ratio.
    pub max_ratio_increase: Option<f64>,
    pub latest_filer: Option<String>,
    pub latest_activist_filer: Option<String>,
    pub latest_filing_date: Option<NaiveDate>,
}

impl JapanSignal {
    pub fn empty(ticker: &str, lookback_days: u32) -> Self {
        Self {
            ticker: ticker.to_string(),
            lookback_days,
            filing_count: 0,
            new_report_count: 0,
            change_report_count: 0,
            activist_purpose_count: 0,
            distinct_filers: 0,
            max_holding_ratio: None,
            max_ratio_increase: None,
            latest_filer: None,
            latest_activist_filer: None,
            latest_filing_date: None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ReportKind {
    New,
    Change,
    Other,
}

fn report_kind(report_type: &str) -> ReportKind {
    let lowered = report_type.to_lowercase();
    if lowered.contains("new") || report_type.contains("新規") {
        ReportKind::New
    } else if lowered.contains("change") || report_type.contains("変更") {
        ReportKind::Change
    } else {
        ReportKind::Other
    }
}

fn ratio_increase(row: &JapanLargeStake) -> Option<f64> {
    match (row.holding_ratio, row.previous_ratio) {
        (Some(now), Some(before)) => Some(now - before).filter(|d| d.is_finite()),
        _ => None,
    }
}

impl Summarize for JapanLargeStake {
    type Signal = JapanSignal;

    fn summarize(ticker: &str, lookback_days: u32, rows: &[Self]) -> JapanSignal {
        let mut signal = JapanSignal::empty(ticker, lookback_days);
        let mut filers: HashSet<&str> = HashSet::new();

        for row in rows {
            signal.filing_count += 1;
            match report_kind(&row.report_type) {
                ReportKind::New => signal.new_report_count += 1,
                ReportKind::Change => signal.change_report_count += 1,
                ReportKind::Other => {}
            }
            if is_activist_purpose(row.purpose.as_deref()) {
                signal.activist_purpose_count += 1;
                if signal.latest_activist_filer.is_none() {
                    signal.latest_activist_filer = Some(row.filer_name.clone());
                }
            }
            signal.max_holding_ratio = max_opt(signal.max_holding_ratio, row.holding_ratio);
            signal.max_ratio_increase = max_opt(signal.max_ratio_increase, ratio_increase(row));
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

#[cfg(test)]
mod tests {
    use super::*;

    fn report(doc: &str, filer: &str, kind: &str, ratio: Option<f64>, purpose: &str) -> JapanLargeStake {
        JapanLargeStake {
            ticker: "6758".into(),
            edinet_code: "E01777".into(),
            doc_id: doc.into(),
            filing_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            filer_name: filer.into(),
            shares_held: None,
            holding_ratio: ratio,
            previous_ratio: None,
            report_type: kind.into(),
            purpose: Some(purpose.into()),
        }
    }

    #[test]
    fn test_report_kind_accepts_english_and_japanese() {
        assert_eq!(report_kind("New"), ReportKind::New);
        assert_eq!(report_kind("新規"), ReportKind::New);
        assert_eq!(report_kind("変更報告書"), ReportKind::Change);
        assert_eq!(report_kind("correction"), ReportKind::Other);
    }

    #[test]
    fn test_summarize_counts_and_activist_filer() {
        let rows = vec![
            report("S3", "BlackRock Japan", "change", Some(6.01), "純投資"),
            report("S2", "Oasis Management", "change", Some(9.50), "重要提案行為等を行うこと"),
            report("S1", "Oasis Management", "new", Some(5.20), "純投資"),
        ];
        let signal = JapanLargeStake::summarize("6758", 730, &rows);

        assert_eq!(signal.filing_count, 3);
        assert_eq!(signal.new_report_count, 1);
        assert_eq!(signal.change_report_count, 2);
        assert_eq!(signal.activist_purpose_count, 1);
        assert_eq!(signal.distinct_filers, 2);
        assert_eq!(signal.max_holding_ratio, Some(9.5));
        assert_eq!(signal.latest_filer.as_deref(), Some("BlackRock Japan"));
        assert_eq!(signal.latest_activist_filer.as_deref(), Some("Oasis Management"));
        assert_eq!(signal.max_ratio_increase, None);
    }

    #[test]
    fn test_largest_ratio_jump_needs_both_ratios() {
        let mut jump = report("S2", "Oasis Management", "change", Some(9.5), "純投資");
        jump.previous_ratio = Some(5.5);
        let mut cut = report("S3", "Oasis Management", "change", Some(4.0), "純投資");
        cut.previous_ratio = Some(9.5);
        let first = report("S1", "Oasis Management", "new", Some(5.5), "純投資");

        let signal = JapanLargeStake::summarize("6758", 730, &[cut, jump, first]);
        assert_eq!(signal.max_ratio_increase, Some(4.0));
    }
}
