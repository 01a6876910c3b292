// =============================================================================
// store/mod.rs — THE IDEMPOTENT FILING CABINET
// =============================================================================
//
// One generic store, three filing families. A FilingStore owns one SQLite
// connection and is never shared between threads: every orchestrator job
// opens its own, and SQLite serializes the writers (WAL + busy timeout).
//
// The rules of the cabinet:
//
// * Writing a filing we already have is a no-op that returns 0, not an error.
// * Reading from a cabinet that has never been assembled (no tables yet)
//   returns nothing, not an error.
// * Everything else that goes wrong on a write goes back to the caller.
// =============================================================================

pub mod families;
pub mod schema;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{FetchLogEntry, FetchStatus};

pub use schema::{Column, FamilySchema};

/// How long a connection waits on another writer before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// A record type that knows how to live in a FilingStore.
pub trait Filing: Sized + Send + 'static {
    const SCHEMA: FamilySchema;

    /// Value of the schema's entity column.
    fn entity_id(&self) -> &str;

    /// Value of the schema's known-key column, as `known_keys` returns it.
    fn known_key(&self) -> String;

    fn filing_date(&self) -> NaiveDate;

    /// Values in `SCHEMA.columns` order.
    fn bind_values(&self) -> Vec<&dyn ToSql>;

    /// Build a record from a row selected with `SCHEMA.column_list()`.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// Idempotent store for one filing family.
pub struct FilingStore<F: Filing> {
    conn: Connection,
    _family: PhantomData<fn() -> F>,
}

impl<F: Filing> FilingStore<F> {
    /// Open (or create) the database file. Does not create tables; call
    /// `ensure_schema` for that.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        debug!(path = %path.display(), family = %F::SCHEMA.family, "Opened filing store");

        Ok(Self::from_connection(conn))
    }

    /// Open an existing database without creating, migrating or switching
    /// its journal mode. A missing file is an error; missing tables read as
    /// empty like everywhere else.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        debug!(path = %path.display(), family = %F::SCHEMA.family, "Opened filing store read-only");

        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            _family: PhantomData,
        }
    }

    pub fn schema(&self) -> FamilySchema {
        F::SCHEMA
    }

    /// Create tables and indexes if they are missing. Cheap after the first call.
    pub fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(&F::SCHEMA.create_sql())?;
        Ok(())
    }

    /// Dedup keys already stored for one entity. Empty before the schema exists.
    pub fn known_keys(&self, entity_id: &str) -> Result<HashSet<String>> {
        or_empty(self.query_known_keys(entity_id))
    }

    fn query_known_keys(&self, entity_id: &str) -> rusqlite::Result<HashSet<String>> {
        let mut stmt = self.conn.prepare_cached(&F::SCHEMA.known_keys_sql())?;
        let keys = stmt
            .query_map([entity_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(keys)
    }

    /// Insert every record that is not already present. Returns how many
    /// were genuinely new. The batch is one transaction.
    pub fn insert_records(&mut self, records: &[F]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare_cached(&F::SCHEMA.insert_sql())?;
            for record in records {
                inserted += stmt.execute(record.bind_values().as_slice())?;
            }
        }
        tx.commit()?;

        debug!(
            family = %F::SCHEMA.family,
            offered = records.len(),
            inserted = inserted,
            "Insert batch committed"
        );
        Ok(inserted)
    }

    /// Replace the fetch-log row for an entity with this attempt's outcome.
    pub fn log_fetch(
        &self,
        entity_id: &str,
        source_id: &str,
        result_count: usize,
        status: &FetchStatus,
    ) -> Result<()> {
        self.log_fetch_at(entity_id, source_id, result_count, status, Utc::now())
    }

    pub fn log_fetch_at(
        &self,
        entity_id: &str,
        source_id: &str,
        result_count: usize,
        status: &FetchStatus,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(&F::SCHEMA.upsert_fetch_log_sql())?;
        stmt.execute(params![
            entity_id,
            source_id,
            fetched_at,
            result_count as i64,
            status.to_string(),
        ])?;
        Ok(())
    }

    pub fn fetch_log(&self, entity_id: &str) -> Result<Option<FetchLogEntry>> {
        let sql = format!(
            "SELECT entity_id, source_id, fetched_at, result_count, status \
             FROM {} WHERE entity_id = ?1",
            F::SCHEMA.fetch_log_table
        );
        or_empty(
            self.conn
                .query_row(&sql, [entity_id], fetch_log_from_row)
                .optional(),
        )
    }

    /// All fetch-log rows, most recent attempt first.
    pub fn fetch_log_entries(&self) -> Result<Vec<FetchLogEntry>> {
        let sql = format!(
            "SELECT entity_id, source_id, fetched_at, result_count, status \
             FROM {} ORDER BY fetched_at DESC, entity_id",
            F::SCHEMA.fetch_log_table
        );
        or_empty(self.query_fetch_log_entries(&sql))
    }

    fn query_fetch_log_entries(&self, sql: &str) -> rusqlite::Result<Vec<FetchLogEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let entries = stmt
            .query_map([], fetch_log_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Records for one ticker filed on or after `since`, newest first.
    pub fn rows_for_ticker(&self, ticker: &str, since: NaiveDate) -> Result<Vec<F>> {
        or_empty(self.query_rows_for_ticker(ticker, since))
    }

    fn query_rows_for_ticker(&self, ticker: &str, since: NaiveDate) -> rusqlite::Result<Vec<F>> {
        let mut stmt = self.conn.prepare_cached(&F::SCHEMA.rows_for_ticker_sql())?;
        let rows = stmt
            .query_map(params![ticker, since], |row| F::from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn record_count(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", F::SCHEMA.table);
        or_empty(
            self.conn
                .query_row(&sql, [], |row| row.get::<_, i64>(0))
                .map(|n| n as usize),
        )
    }

    pub fn entity_record_count(&self, entity_id: &str) -> Result<usize> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            F::SCHEMA.table,
            F::SCHEMA.entity_column
        );
        or_empty(
            self.conn
                .query_row(&sql, [entity_id], |row| row.get::<_, i64>(0))
                .map(|n| n as usize),
        )
    }
}

/// Open a store and make sure its tables exist. Logs once per call.
pub fn open_with_schema<F: Filing>(path: impl AsRef<Path>) -> Result<FilingStore<F>> {
    let store = FilingStore::<F>::open(path.as_ref())?;
    store.ensure_schema()?;
    info!(
        path = %path.as_ref().display(),
        table = F::SCHEMA.table,
        "Filing store ready"
    );
    Ok(store)
}

fn fetch_log_from_row(row: &Row<'_>) -> rusqlite::Result<FetchLogEntry> {
    let status: String = row.get(4)?;
    Ok(FetchLogEntry {
        entity_id: row.get(0)?,
        source_id: row.get(1)?,
        fetched_at: row.get(2)?,
        result_count: row.get(3)?,
        status: FetchStatus::from(status.as_str()),
    })
}

/// SQLite reports a missing table as a generic error with this message prefix.
pub(crate) fn is_missing_table(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.starts_with("no such table")
    )
}

/// Read-path degradation: a store nobody has written to yet holds no data.
fn or_empty<T: Default>(result: rusqlite::Result<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(err) if is_missing_table(&err) => Ok(T::default()),
        Err(err) => Err(err.into()),
    }
}
