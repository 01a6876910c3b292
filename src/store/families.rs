// =============================================================================
// store/families.rs — THREE FILING FAMILIES, ONE SHAPE
// =============================================================================
//
// Where each family keeps its rows, what makes a row unique, and which value
// counts as "already seen" when we ask the collaborator to skip work.
//
// Dedup granularity is intentionally NOT uniform:
//
// * activist / japan: known keys are document ids (accession number, EDINET
//   doc id). One document, many holder lines.
// * holdings: known keys are filing dates per fund. A fund can legitimately
//   file something new on a date we have never seen, and collapsing this to a
//   per-document id would hide amended same-period reports.
// =============================================================================

use chrono::NaiveDate;
use rusqlite::types::ToSql;
use rusqlite::Row;

use super::schema::{Column, FamilySchema};
use super::Filing;
use crate::models::{ActivistStake, Family, InstitutionalHolding, JapanLargeStake};

impl Filing for ActivistStake {
    const SCHEMA: FamilySchema = FamilySchema {
        family: Family::Activist,
        table: "activist_stakes",
        fetch_log_table: "activist_fetch_log",
        entity_column: "ticker",
        source_column: "cik",
        date_column: "filing_date",
        ticker_column: "ticker",
        known_key_column: "accession_number",
        columns: &[
            Column::new("ticker", "TEXT NOT NULL"),
            Column::new("cik", "TEXT NOT NULL"),
            Column::new("accession_number", "TEXT NOT NULL"),
            Column::new("filing_date", "TEXT NOT NULL"),
            Column::new("form_type", "TEXT NOT NULL"),
            Column::new("filer_name", "TEXT NOT NULL"),
            Column::new("shares_owned", "INTEGER"),
            Column::new("percent_owned", "REAL"),
            Column::new("is_activist", "INTEGER NOT NULL"),
            Column::new("purpose", "TEXT"),
        ],
        unique_key: &["accession_number", "filer_name"],
    };

    fn entity_id(&self) -> &str {
        &self.ticker
    }

    fn known_key(&self) -> String {
        self.accession_number.clone()
    }

    fn filing_date(&self) -> NaiveDate {
        self.filing_date
    }

    fn bind_values(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.ticker as &dyn ToSql,
            &self.cik,
            &self.accession_number,
            &self.filing_date,
            &self.form_type,
            &self.filer_name,
            &self.shares_owned,
            &self.percent_owned,
            &self.is_activist,
            &self.purpose,
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            ticker: row.get("ticker")?,
            cik: row.get("cik")?,
            accession_number: row.get("accession_number")?,
            filing_date: row.get("filing_date")?,
            form_type: row.get("form_type")?,
            filer_name: row.get("filer_name")?,
            shares_owned: row.get("shares_owned")?,
            percent_owned: row.get("percent_owned")?,
            is_activist: row.get("is_activist")?,
            purpose: row.get("purpose")?,
        })
    }
}

impl Filing for InstitutionalHolding {
    const SCHEMA: FamilySchema = FamilySchema {
        family: Family::Holdings,
        table: "institutional_holdings",
        fetch_log_table: "holdings_fetch_log",
        entity_column: "fund_id",
        source_column: "fund_cik",
        date_column: "filing_date",
        ticker_column: "ticker",
        known_key_column: "filing_date",
        columns: &[
            Column::new("fund_id", "TEXT NOT NULL"),
            Column::new("fund_cik", "TEXT NOT NULL"),
            Column::new("fund_name", "TEXT NOT NULL"),
            Column::new("filing_date", "TEXT NOT NULL"),
            Column::new("report_period", "TEXT NOT NULL"),
            Column::new("issuer_name", "TEXT NOT NULL"),
            Column::new("cusip", "TEXT NOT NULL"),
            Column::new("ticker", "TEXT"),
            Column::new("shares", "INTEGER NOT NULL"),
            Column::new("value_usd", "REAL"),
        ],
        unique_key: &["fund_cik", "filing_date", "cusip"],
    };

    fn entity_id(&self) -> &str {
        &self.fund_id
    }

    fn known_key(&self) -> String {
        self.filing_date.format("%Y-%m-%d").to_string()
    }

    fn filing_date(&self) -> NaiveDate {
        self.filing_date
    }

    fn bind_values(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.fund_id as &dyn ToSql,
            &self.fund_cik,
            &self.fund_name,
            &self.filing_date,
            &self.report_period,
            &self.issuer_name,
            &self.cusip,
            &self.ticker,
            &self.shares,
            &self.value_usd,
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            fund_id: row.get("fund_id")?,
            fund_cik: row.get("fund_cik")?,
            fund_name: row.get("fund_name")?,
            filing_date: row.get("filing_date")?,
            report_period: row.get("report_period")?,
            issuer_name: row.get("issuer_name")?,
            cusip: row.get("cusip")?,
            ticker: row.get("ticker")?,
            shares: row.get("shares")?,
            value_usd: row.get("value_usd")?,
        })
    }
}

impl Filing for JapanLargeStake {
    const SCHEMA: FamilySchema = FamilySchema {
        family: Family::Japan,
        table: "japan_large_stakes",
        fetch_log_table: "japan_fetch_log",
        entity_column: "ticker",
        source_column: "edinet_code",
        date_column: "filing_date",
        ticker_column: "ticker",
        known_key_column: "doc_id",
        columns: &[
            Column::new("ticker", "TEXT NOT NULL"),
            Column::new("edinet_code", "TEXT NOT NULL"),
            Column::new("doc_id", "TEXT NOT NULL"),
            Column::new("filing_date", "TEXT NOT NULL"),
            Column::new("filer_name", "TEXT NOT NULL"),
            Column::new("shares_held", "INTEGER"),
            Column::new("holding_ratio", "REAL"),
            Column::new("previous_ratio", "REAL"),
            Column::new("report_type", "TEXT NOT NULL"),
            Column::new("purpose", "TEXT"),
        ],
        unique_key: &["doc_id", "filer_name"],
    };

    fn entity_id(&self) -> &str {
        &self.ticker
    }

    fn known_key(&self) -> String {
        self.doc_id.clone()
    }

    fn filing_date(&self) -> NaiveDate {
        self.filing_date
    }

    fn bind_values(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.ticker as &dyn ToSql,
            &self.edinet_code,
            &self.doc_id,
            &self.filing_date,
            &self.filer_name,
            &self.shares_held,
            &self.holding_ratio,
            &self.previous_ratio,
            &self.report_type,
            &self.purpose,
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            ticker: row.get("ticker")?,
            edinet_code: row.get("edinet_code")?,
            doc_id: row.get("doc_id")?,
            filing_date: row.get("filing_date")?,
            filer_name: row.get("filer_name")?,
            shares_held: row.get("shares_held")?,
            holding_ratio: row.get("holding_ratio")?,
            previous_ratio: row.get("previous_ratio")?,
            report_type: row.get("report_type")?,
            purpose: row.get("purpose")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FilingStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn holding(fund_cik: &str, filing: NaiveDate, cusip: &str) -> InstitutionalHolding {
        InstitutionalHolding {
            fund_id: "FUND".into(),
            fund_cik: fund_cik.into(),
            fund_name: "Fund".into(),
            filing_date: filing,
            report_period: date(2023, 12, 31),
            issuer_name: "ISSUER".into(),
            cusip: cusip.into(),
            ticker: Some("ACME".into()),
            shares: 10,
            value_usd: None,
        }
    }

    fn japan(doc_id: &str, filer: &str) -> JapanLargeStake {
        JapanLargeStake {
            ticker: "7203".into(),
            edinet_code: "E02144".into(),
            doc_id: doc_id.into(),
            filing_date: date(2024, 5, 10),
            filer_name: filer.into(),
            shares_held: Some(5_000_000),
            holding_ratio: Some(5.12),
            previous_ratio: None,
            report_type: "new".into(),
            purpose: Some("純投資".into()),
        }
    }

    #[test]
    fn test_column_count_matches_bind_values() {
        let stake = ActivistStake {
            ticker: "ACME".into(),
            cik: "1".into(),
            accession_number: "A".into(),
            filing_date: date(2024, 1, 1),
            form_type: "SC 13G".into(),
            filer_name: "F".into(),
            shares_owned: None,
            percent_owned: None,
            is_activist: false,
            purpose: None,
        };
        assert_eq!(stake.bind_values().len(), ActivistStake::SCHEMA.columns.len());
        assert_eq!(
            holding("1", date(2024, 1, 1), "C").bind_values().len(),
            InstitutionalHolding::SCHEMA.columns.len()
        );
        assert_eq!(japan("D", "F").bind_values().len(), JapanLargeStake::SCHEMA.columns.len());
    }

    #[test]
    fn test_holdings_uniqueness_is_fund_date_and_security() {
        let mut store = FilingStore::<InstitutionalHolding>::open_in_memory().unwrap();
        store.ensure_schema().unwrap();

        let q4 = date(2024, 2, 14);
        let inserted = store
            .insert_records(&[
                holding("111", q4, "AAA"),
                holding("111", q4, "AAA"),
                holding("111", q4, "BBB"),
                holding("222", q4, "AAA"),
                holding("111", date(2024, 5, 15), "AAA"),
            ])
            .unwrap();
        assert_eq!(inserted, 4);
    }

    #[test]
    fn test_holdings_known_keys_are_filing_dates() {
        let mut store = FilingStore::<InstitutionalHolding>::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        let rec = holding("111", date(2024, 2, 14), "AAA");
        store.insert_records(&[rec.clone()]).unwrap();

        let keys = store.known_keys("FUND").unwrap();
        assert!(keys.contains(&rec.known_key()));
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn test_japan_round_trips_optional_fields() {
        let mut store = FilingStore::<JapanLargeStake>::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        store
            .insert_records(&[japan("S100ABCD", "Effissimo"), japan("S100ABCD", "Effissimo")])
            .unwrap();

        let rows = store.rows_for_ticker("7203", date(2024, 1, 1)).unwrap();
        assert_eq!(rows, vec![japan("S100ABCD", "Effissimo")]);
        assert_eq!(store.known_keys("7203").unwrap().len(), 1);
    }
}
