// =============================================================================
// store/schema.rs — A TABLE, DESCRIBED INSTEAD OF COPY-PASTED
// =============================================================================
//
// Every filing family gets the same two tables: the records table with its
// uniqueness constraint and entity/date indexes, and a fetch-log table with
// one row per entity. What differs is the table name, the columns, and which
// columns make a row unique. FamilySchema captures exactly that and renders
// the SQL, so the three families cannot drift apart.
// =============================================================================

use crate::models::Family;

/// One column of a records table.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    /// Full SQLite type clause, e.g. `TEXT NOT NULL`.
    pub sql_type: &'static str,
}

impl Column {
    pub const fn new(name: &'static str, sql_type: &'static str) -> Self {
        Self { name, sql_type }
    }
}

/// Everything the generic store needs to know about one family's table.
#[derive(Debug, Clone, Copy)]
pub struct FamilySchema {
    pub family: Family,
    pub table: &'static str,
    pub fetch_log_table: &'static str,
    /// Column holding the fetch unit (ticker or fund id).
    pub entity_column: &'static str,
    /// Column holding the repository identifier (CIK, EDINET code).
    pub source_column: &'static str,
    /// Filing date column; lookback windows filter on it.
    pub date_column: &'static str,
    /// Column signals are computed by. Differs from the entity column for
    /// holdings, which are fetched per fund but summarized per security.
    pub ticker_column: &'static str,
    /// Column whose distinct values are handed to the collaborator as
    /// "already seen".
    pub known_key_column: &'static str,
    /// Insert order; `Filing::bind_values` must follow it.
    pub columns: &'static [Column],
    pub unique_key: &'static [&'static str],
}

impl FamilySchema {
    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| c.name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// DDL for both tables and their indexes. Every statement is
    /// `IF NOT EXISTS`, so running it again is a no-op.
    pub fn create_sql(&self) -> String {
        let t = self.table;
        let column_defs: String = self
            .columns
            .iter()
            .map(|c| format!("    {} {},\n", c.name, c.sql_type))
            .collect();

        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {t} (\n    \
                 id INTEGER PRIMARY KEY AUTOINCREMENT,\n\
             {column_defs}    \
                 ingested_at TEXT NOT NULL DEFAULT (datetime('now')),\n    \
                 UNIQUE ({unique})\n\
             );\n\
             CREATE INDEX IF NOT EXISTS idx_{t}_entity ON {t} ({entity});\n\
             CREATE INDEX IF NOT EXISTS idx_{t}_entity_date ON {t} ({entity}, {date});\n",
            unique = self.unique_key.join(", "),
            entity = self.entity_column,
            date = self.date_column,
        );

        if self.ticker_column != self.entity_column {
            sql.push_str(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{t}_ticker_date ON {t} ({ticker}, {date});\n",
                ticker = self.ticker_column,
                date = self.date_column,
            ));
        }

        sql.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {log} (\n    \
                 entity_id TEXT PRIMARY KEY,\n    \
                 source_id TEXT NOT NULL,\n    \
                 fetched_at TEXT NOT NULL,\n    \
                 result_count INTEGER NOT NULL,\n    \
                 status TEXT NOT NULL\n\
             );\n",
            log = self.fetch_log_table,
        ));

        sql
    }

    /// Insert that silently skips rows colliding on any uniqueness
    /// constraint. Other constraint failures (NOT NULL) still error.
    pub fn insert_sql(&self) -> String {
        let placeholders = (1..=self.columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
            self.table,
            self.column_list(),
            placeholders
        )
    }

    pub fn known_keys_sql(&self) -> String {
        format!(
            "SELECT DISTINCT {} FROM {} WHERE {} = ?1",
            self.known_key_column, self.table, self.entity_column
        )
    }

    /// Rows for one ticker within a window, newest first.
    pub fn rows_for_ticker_sql(&self) -> String {
        format!(
            "SELECT {cols} FROM {t} WHERE {ticker} = ?1 AND {date} >= ?2 \
             ORDER BY {date} DESC, id DESC",
            cols = self.column_list(),
            t = self.table,
            ticker = self.ticker_column,
            date = self.date_column,
        )
    }

    pub fn upsert_fetch_log_sql(&self) -> String {
        format!(
            "INSERT OR REPLACE INTO {} (entity_id, source_id, fetched_at, result_count, status) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            self.fetch_log_table
        )
    }
}
