//! SQLite access: the ledger database reader and the feed cache.
//!
//! The ledger reader extracts account and transaction rows from a
//! Firefly III database, with soft-deleted rows filtered in SQL. The
//! feed cache persists raw feed records in `{id, data}` tables so a run
//! can replay without touching the feed provider.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::error::{Result, SyncError};
use crate::models::{AccountRow, FeedAccount, FeedTransaction, FireflyId, TransactionRow};

/// Strips an optional `sqlite://` scheme from a database URL.
fn database_path(url: &str) -> &str {
    url.strip_prefix("sqlite://").unwrap_or(url)
}

/// Read-only access to a Firefly III database.
#[derive(Debug)]
pub struct FireflyDatabase {
    /// Long-lived connection, opened at the start of the run.
    conn: Connection,
}

/// Account rows: the type string comes from the joined type table, the
/// bank number and external id live in the per-account metadata table,
/// and the notes live in the polymorphic notes table.
const ACCOUNTS_SQL: &str = "\
SELECT a.id, t.type, a.name, a.iban,
       (SELECT m.data FROM account_meta m
         WHERE m.account_id = a.id AND m.name = 'account_number') AS account_number,
       (SELECT m.data FROM account_meta m
         WHERE m.account_id = a.id AND m.name = 'external_id') AS external_id,
       (SELECT n.text FROM notes n
         WHERE n.noteable_id = a.id
           AND n.noteable_type = 'FireflyIII\\Models\\Account'
           AND n.deleted_at IS NULL) AS notes
FROM accounts a
JOIN account_types t ON t.id = a.account_type_id
WHERE a.deleted_at IS NULL
ORDER BY a.id";

/// Transaction rows: each journal joined with its negative (source)
/// and positive (destination) splits; the signed destination amount is
/// what the pipeline consumes.
const TRANSACTIONS_SQL: &str = "\
SELECT j.id, tt.type, j.description, j.date,
       dst.amount, src.account_id, dst.account_id,
       dst.foreign_amount, c.code,
       (SELECT m.data FROM journal_meta m
         WHERE m.transaction_journal_id = j.id
           AND m.name = 'external_id'
           AND m.deleted_at IS NULL) AS external_id,
       (SELECT cat.name FROM categories cat
         JOIN category_transaction_journal ctj ON ctj.category_id = cat.id
         WHERE ctj.transaction_journal_id = j.id) AS category_name
FROM transaction_journals j
JOIN transaction_types tt ON tt.id = j.transaction_type_id
JOIN transactions src ON src.transaction_journal_id = j.id
    AND src.amount < 0 AND src.deleted_at IS NULL
JOIN transactions dst ON dst.transaction_journal_id = j.id
    AND dst.amount > 0 AND dst.deleted_at IS NULL
LEFT JOIN transaction_currencies c ON c.id = dst.foreign_currency_id
WHERE j.deleted_at IS NULL
ORDER BY j.id";

impl FireflyDatabase {
    /// Opens the ledger database.
    ///
    /// # Errors
    ///
    /// Returns an error when the database cannot be opened.
    pub fn open(url: &str) -> Result<Self> {
        let conn = Connection::open(database_path(url))?;
        Ok(Self { conn })
    }

    /// Reads all live account rows in id order.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    #[tracing::instrument(skip_all)]
    pub fn accounts(&self) -> Result<Vec<AccountRow>> {
        let mut statement = self.conn.prepare(ACCOUNTS_SQL)?;
        let rows = statement.query_map([], |row| {
            Ok(AccountRow {
                id: FireflyId::new(row.get(0)?),
                account_type: row.get(1)?,
                name: row.get(2)?,
                iban: row.get(3)?,
                account_number: row.get::<_, Option<String>>(4)?.map(decode_meta),
                external_id: row.get::<_, Option<String>>(5)?.map(decode_meta),
                notes: row.get(6)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<AccountRow>>>()
            .map_err(SyncError::from)
    }

    /// Reads all live transaction rows in id order, amounts rounded to
    /// two decimal places.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails or a stored value cannot
    /// be converted.
    #[tracing::instrument(skip_all)]
    pub fn transactions(&self) -> Result<Vec<TransactionRow>> {
        let mut statement = self.conn.prepare(TRANSACTIONS_SQL)?;
        let raw = statement.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, Option<f64>>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, Option<String>>(9)?,
                row.get::<_, Option<String>>(10)?,
            ))
        })?;

        let mut rows = Vec::new();
        for item in raw {
            let (
                id,
                transaction_type,
                description,
                date,
                amount,
                source_id,
                destination_id,
                foreign_amount,
                foreign_currency_code,
                external_id,
                category_name,
            ) = item?;
            rows.push(TransactionRow {
                id: FireflyId::new(id),
                transaction_type,
                description,
                date: parse_db_date(&date)?,
                amount: decimal_from_db(amount)?,
                source_id: FireflyId::new(source_id),
                destination_id: FireflyId::new(destination_id),
                foreign_amount: foreign_amount.map(decimal_from_db).transpose()?,
                foreign_currency_code,
                external_id: external_id.map(decode_meta),
                category_name,
            });
        }
        Ok(rows)
    }
}

#[cfg(test)]
impl FireflyDatabase {
    /// Test access to the underlying connection, for fixture setup.
    pub(crate) fn connection_for_tests(&self) -> &Connection {
        &self.conn
    }
}

/// Metadata values are stored JSON-encoded (`"\"12-3456…\""`); decode
/// them, falling back to the raw string for plain values.
fn decode_meta(raw: String) -> String {
    serde_json::from_str::<String>(&raw).unwrap_or(raw)
}

/// Parses the ledger's `YYYY-MM-DD HH:MM:SS` timestamps, accepting
/// RFC 3339 as a fallback.
fn parse_db_date(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

/// Converts a stored numeric to an exact decimal rounded to two
/// places.
fn decimal_from_db(value: f64) -> Result<Decimal> {
    Decimal::from_f64(value)
        .map(|decimal| decimal.round_dp(2))
        .ok_or_else(|| SyncError::InvalidAmount {
            value: value.to_string(),
        })
}

/// Local cache of raw feed records.
///
/// Two tables of `{id TEXT PRIMARY KEY, data TEXT}` hold accounts and
/// transactions verbatim as fetched from the feed.
#[derive(Debug)]
pub struct AkahuCache {
    /// Long-lived connection, opened at the start of the run.
    conn: Connection,
}

/// Cache schema, created on open.
const CACHE_SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS akahu_accounts (
    id TEXT PRIMARY KEY,
    data TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS akahu_transactions (
    id TEXT PRIMARY KEY,
    data TEXT NOT NULL
);";

impl AkahuCache {
    /// Opens (and if needed initializes) the cache database.
    ///
    /// # Errors
    ///
    /// Returns an error when the database cannot be opened or the
    /// schema cannot be created.
    pub fn open(url: &str) -> Result<Self> {
        let conn = Connection::open(database_path(url))?;
        conn.execute_batch(CACHE_SCHEMA)?;
        Ok(Self { conn })
    }

    /// Upserts raw account records.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MalformedFeedRecord`] for records without a
    /// string `_id`, or a database error.
    pub fn store_accounts(&self, items: &[serde_json::Value]) -> Result<()> {
        self.store("akahu_accounts", items)
    }

    /// Upserts raw transaction records.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MalformedFeedRecord`] for records without a
    /// string `_id`, or a database error.
    pub fn store_transactions(&self, items: &[serde_json::Value]) -> Result<()> {
        self.store("akahu_transactions", items)
    }

    /// Loads all cached accounts in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails or a record cannot be
    /// decoded.
    pub fn accounts(&self) -> Result<Vec<FeedAccount>> {
        self.load("akahu_accounts")
    }

    /// Loads all cached transactions in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails or a record cannot be
    /// decoded.
    pub fn transactions(&self) -> Result<Vec<FeedTransaction>> {
        self.load("akahu_transactions")
    }

    /// Upserts raw records into one cache table.
    fn store(&self, table: &str, items: &[serde_json::Value]) -> Result<()> {
        let sql = format!(
            "INSERT INTO {table} (id, data) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data"
        );
        let mut statement = self.conn.prepare(&sql)?;
        for item in items {
            let id = item
                .get("_id")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| SyncError::MalformedFeedRecord {
                    reason: format!("record without a string _id: {item}"),
                })?;
            statement.execute(rusqlite::params![id, item.to_string()])?;
        }
        Ok(())
    }

    /// Loads and decodes all records from one cache table.
    fn load<T: serde::de::DeserializeOwned>(&self, table: &str) -> Result<Vec<T>> {
        let sql = format!("SELECT data FROM {table} ORDER BY rowid");
        let mut statement = self.conn.prepare(&sql)?;
        let raw = statement.query_map([], |row| row.get::<_, String>(0))?;
        let mut items = Vec::new();
        for data in raw {
            items.push(serde_json::from_str(&data?)?);
        }
        Ok(items)
    }
}
