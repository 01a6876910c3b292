// =============================================================================
// models.rs — THE DISCLOSURES, AS PLAIN STRUCTS
// =============================================================================
//
// Three filing families, three record shapes:
//
// * ActivistStake        — SEC Schedule 13D / 13G beneficial-ownership lines
// * InstitutionalHolding — one security line of a 13F-HR holdings report
// * JapanLargeStake      — EDINET large-shareholding (大量保有報告書) lines
//
// Filings are historical facts. Once stored, a row is never updated and never
// deleted by this crate. The optional fields are optional because the
// upstream parsers cannot always find them, not because they may change.
// =============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The filing family a store, fetcher or signal belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Schedule 13D/13G beneficial-ownership stakes, fetched per ticker.
    Activist,
    /// 13F institutional holdings, fetched per fund.
    Holdings,
    /// Japanese large-shareholding reports, fetched per ticker.
    Japan,
}

impl Family {
    pub const ALL: [Family; 3] = [Family::Activist, Family::Holdings, Family::Japan];

    /// Lowercase name used in file names, URLs and table prefixes.
    pub fn slug(&self) -> &'static str {
        match self {
            Family::Activist => "activist",
            Family::Holdings => "holdings",
            Family::Japan => "japan",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Family {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "activist" | "13d" | "13g" => Ok(Family::Activist),
            "holdings" | "13f" | "institutional" => Ok(Family::Holdings),
            "japan" | "edinet" | "jp" => Ok(Family::Japan),
            other => Err(format!(
                "unknown filing family '{other}' (expected activist, holdings or japan)"
            )),
        }
    }
}

/// The unit of fetch: a ticker for stake families, a fund for holdings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    /// Ticker symbol or fund identifier.
    pub entity_id: String,
    /// Identifier the filing repository knows it by (CIK, EDINET code).
    pub source_id: String,
}

impl Entity {
    pub fn new(entity_id: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            source_id: source_id.into(),
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.entity_id, self.source_id)
    }
}

/// One holder line of a Schedule 13D or 13G filing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivistStake {
    pub ticker: String,
    /// Issuer CIK.
    pub cik: String,
    pub accession_number: String,
    pub filing_date: NaiveDate,
    /// e.g. "SC 13D", "SC 13G/A".
    pub form_type: String,
    pub filer_name: String,
    #[serde(default)]
    pub shares_owned: Option<i64>,
    #[serde(default)]
    pub percent_owned: Option<f64>,
    /// 13D filers reserve the right to push management around; 13G filers
    /// promise they won't.
    pub is_activist: bool,
    #[serde(default)]
    pub purpose: Option<String>,
}

impl ActivistStake {
    pub fn is_amendment(&self) -> bool {
        self.form_type.trim_end().ends_with("/A")
    }
}

/// One security line of a 13F-HR report, seen from the fund's side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionalHolding {
    /// Fund identifier used to drive the fetch.
    pub fund_id: String,
    pub fund_cik: String,
    pub fund_name: String,
    pub filing_date: NaiveDate,
    /// Quarter end the report covers.
    pub report_period: NaiveDate,
    pub issuer_name: String,
    pub cusip: String,
    /// The held security's ticker, when the parser could resolve the CUSIP.
    #[serde(default)]
    pub ticker: Option<String>,
    pub shares: i64,
    #[serde(default)]
    pub value_usd: Option<f64>,
}

/// One filer line of an EDINET large-shareholding report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JapanLargeStake {
    pub ticker: String,
    pub edinet_code: String,
    pub doc_id: String,
    pub filing_date: NaiveDate,
    pub filer_name: String,
    #[serde(default)]
    pub shares_held: Option<i64>,
    /// Holding ratio in percent.
    #[serde(default)]
    pub holding_ratio: Option<f64>,
    #[serde(default)]
    pub previous_ratio: Option<f64>,
    /// "new", "change", "correction", ...
    pub report_type: String,
    #[serde(default)]
    pub purpose: Option<String>,
}

/// Outcome of one fetch attempt, as written to the fetch log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchStatus {
    Ok,
    Error(String),
}

impl FetchStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, FetchStatus::Ok)
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStatus::Ok => f.write_str("ok"),
            FetchStatus::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

impl From<&str> for FetchStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "ok" => FetchStatus::Ok,
            other => FetchStatus::Error(
                other.strip_prefix("error: ").unwrap_or(other).to_string(),
            ),
        }
    }
}

/// The single fetch-log row kept per entity. Latest attempt wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchLogEntry {
    pub entity_id: String,
    pub source_id: String,
    pub fetched_at: DateTime<Utc>,
    /// Rows the collaborator returned in this attempt, not a running total.
    pub result_count: i64,
    pub status: FetchStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_parses_aliases() {
        assert_eq!("13F".parse::<Family>().unwrap(), Family::Holdings);
        assert_eq!(" Activist ".parse::<Family>().unwrap(), Family::Activist);
        assert_eq!("edinet".parse::<Family>().unwrap(), Family::Japan);
        assert!("crypto".parse::<Family>().is_err());
    }

    #[test]
    fn test_fetch_status_round_trips_through_text() {
        let err = FetchStatus::Error("HTTP 503".into());
        assert_eq!(err.to_string(), "error: HTTP 503");
        assert_eq!(FetchStatus::from(err.to_string().as_str()), err);
        assert_eq!(FetchStatus::from("ok"), FetchStatus::Ok);
    }

    #[test]
    fn test_amendment_detection() {
        let stake = ActivistStake {
            ticker: "ACME".into(),
            cik: "0000001".into(),
            accession_number: "ACC1".into(),
            filing_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            form_type: "SC 13D/A".into(),
            filer_name: "FundX".into(),
            shares_owned: None,
            percent_owned: None,
            is_activist: true,
            purpose: None,
        };
        assert!(stake.is_amendment());
    }

    #[test]
    fn test_holding_deserializes_without_optionals() {
        let json = r#"{
            "fund_id": "BRK", "fund_cik": "0001067983", "fund_name": "Berkshire",
            "filing_date": "2024-02-14", "report_period": "2023-12-31",
            "issuer_name": "APPLE INC", "cusip": "037833100", "shares": 100
        }"#;
        let holding: InstitutionalHolding = serde_json::from_str(json).unwrap();
        assert_eq!(holding.ticker, None);
        assert_eq!(holding.value_usd, None);
        assert_eq!(holding.shares, 100);
    }
}
