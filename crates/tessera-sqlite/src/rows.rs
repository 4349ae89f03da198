use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use std::ops::Bound;
use tessera_core::{
    codec::{decode_key, decode_key_text, decode_value_json},
    error::Result,
    types::{Entry, ScanRange, ScannedEntry, StoredRecord, Versionstamp},
};
use tracing::warn;

use crate::db_err;

/// Expiry is filtered in SQL, so it is not part of the mapped row.
const ENTRY_COLUMNS: &str = "sort_key, key_json, value_json, versionstamp";

struct RawRow {
    sort_key: Vec<u8>,
    key_json: String,
    value_json: String,
    versionstamp: i64,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            sort_key: row.get(0)?,
            key_json: row.get(1)?,
            value_json: row.get(2)?,
            versionstamp: row.get(3)?,
        })
    }

    fn into_entry(self) -> Result<Entry> {
        Ok(self.into_scanned()?.entry)
    }

    /// The `sort_key` column stays the scan position even when `key_json`
    /// only yields a best-effort key.
    fn into_scanned(self) -> Result<ScannedEntry> {
        let key = match decode_key_text(&self.key_json) {
            Ok(key) => key,
            Err(err) => {
                warn!(key_json = %self.key_json, error = %err, "Falling back to binary key");
                decode_key(&self.sort_key)?
            }
        };
        let entry = Entry {
            key,
            value: decode_value_json(&self.value_json)?,
            versionstamp: Versionstamp::new(self.versionstamp as u64),
        };
        Ok(ScannedEntry {
            position: self.sort_key,
            entry,
        })
    }
}

/// Live entry stored under an encoded key
pub fn select_entry(conn: &Connection, sort_key: &[u8], now_ms: i64) -> Result<Option<Entry>> {
    let sql = format!(
        "SELECT {} FROM kv_entries
         WHERE sort_key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
        ENTRY_COLUMNS
    );
    conn.query_row(&sql, rusqlite::params![sort_key, now_ms], RawRow::from_row)
        .optional()
        .map_err(db_err)?
        .map(RawRow::into_entry)
        .transpose()
}

/// Stored record under an encoded key, expired or not
pub fn select_record(conn: &Connection, sort_key: &[u8]) -> Result<Option<StoredRecord>> {
    let raw = conn
        .query_row(
            "SELECT value_json, versionstamp, expires_at FROM kv_entries WHERE sort_key = ?1",
            [sort_key],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            },
        )
        .optional()
        .map_err(db_err)?;

    raw.map(|(value_json, versionstamp, expires_at)| {
        Ok(StoredRecord {
            versionstamp: Versionstamp::new(versionstamp as u64),
            expires_at,
            value: decode_value_json(&value_json)?,
        })
    })
    .transpose()
}

/// Live entries within `range`, ordered by `sort_key`
pub fn select_range(
    conn: &Connection,
    range: &ScanRange,
    limit: usize,
    reverse: bool,
    now_ms: i64,
) -> Result<Vec<ScannedEntry>> {
    if limit == 0 || range.is_empty() {
        return Ok(Vec::new());
    }

    let mut sql = format!(
        "SELECT {} FROM kv_entries WHERE (expires_at IS NULL OR expires_at > ?1)",
        ENTRY_COLUMNS
    );
    let mut params: Vec<SqlValue> = vec![SqlValue::Integer(now_ms)];

    let mut push_bound = |bound: &Bound<Vec<u8>>, inclusive: &str, exclusive: &str| {
        let (op, bytes) = match bound {
            Bound::Included(b) => (inclusive, b),
            Bound::Excluded(b) => (exclusive, b),
            Bound::Unbounded => return,
        };
        params.push(SqlValue::Blob(bytes.clone()));
        sql.push_str(&format!(" AND sort_key {} ?{}", op, params.len()));
    };
    push_bound(&range.start, ">=", ">");
    push_bound(&range.end, "<=", "<");

    params.push(SqlValue::Integer(limit as i64));
    sql.push_str(&format!(
        " ORDER BY sort_key {} LIMIT ?{}",
        if reverse { "DESC" } else { "ASC" },
        params.len()
    ));

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), RawRow::from_row)
        .map_err(db_err)?;

    let mut entries = Vec::with_capacity(limit.min(1024));
    for row in rows {
        entries.push(row.map_err(db_err)?.into_scanned()?);
    }
    Ok(entries)
}
