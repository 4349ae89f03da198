use rusqlite::Connection;
use tessera_core::error::{Result, TesseraError};

use crate::db_err;

pub const SCHEMA_VERSION: u32 = 1;

/// Create the entry and meta tables if they do not exist yet
///
/// `sort_key` holds the order-preserving binary key encoding and is the only
/// column used for lookups and ordering; SQLite compares BLOBs with `memcmp`,
/// so `ORDER BY sort_key` is key order. `key_json` keeps the text form of the
/// key for inspection with ordinary SQL tools.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv_entries (
            sort_key BLOB PRIMARY KEY,
            key_json TEXT NOT NULL,
            value_json TEXT NOT NULL,
            versionstamp INTEGER NOT NULL,
            expires_at INTEGER
        ) WITHOUT ROWID;

        CREATE INDEX IF NOT EXISTS idx_kv_entries_expires_at
            ON kv_entries (expires_at) WHERE expires_at IS NOT NULL;

        CREATE TABLE IF NOT EXISTS kv_meta (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            versionstamp INTEGER NOT NULL DEFAULT 0,
            schema_version INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(db_err)?;

    conn.execute(
        "INSERT OR IGNORE INTO kv_meta (id, versionstamp, schema_version) VALUES (0, 0, ?1)",
        [SCHEMA_VERSION as i64],
    )
    .map_err(db_err)?;

    let current = schema_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(TesseraError::Config(format!(
            "database schema version {} is newer than supported version {}",
            current, SCHEMA_VERSION
        )));
    }
    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<u32> {
    conn.query_row(
        "SELECT schema_version FROM kv_meta WHERE id = 0",
        [],
        |row| {
            let v: i64 = row.get(0)?;
            Ok(v as u32)
        },
    )
    .map_err(db_err)
}
