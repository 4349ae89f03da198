use rusqlite::Transaction;
use tessera_core::{
    codec::{encode_key_text, encode_value_json},
    error::Result,
    traits::KvTxn,
    types::{Key, StoredRecord, Versionstamp},
};

use crate::db_err;
use crate::rows::select_record;

/// Write transaction for one atomic commit
///
/// Opened with `BEGIN IMMEDIATE` on the writer connection, so the write lock
/// is held from the first check to commit. Dropping it rolls back.
pub struct SqliteKvTxn<'a> {
    tx: Transaction<'a>,
}

impl<'a> SqliteKvTxn<'a> {
    pub fn new(tx: Transaction<'a>) -> Self {
        Self { tx }
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit().map_err(db_err)
    }
}

impl KvTxn for SqliteKvTxn<'_> {
    fn get_record(&mut self, key: &[u8]) -> Result<Option<StoredRecord>> {
        select_record(&self.tx, key)
    }

    fn put_record(
        &mut self,
        key: &Key,
        encoded: &[u8],
        record: &StoredRecord,
        _previous: Option<&StoredRecord>,
    ) -> Result<()> {
        let key_json = encode_key_text(key)?;
        let value_json = encode_value_json(&record.value)?;
        self.tx
            .execute(
                "INSERT INTO kv_entries (sort_key, key_json, value_json, versionstamp, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (sort_key) DO UPDATE SET
                    key_json = excluded.key_json,
                    value_json = excluded.value_json,
                    versionstamp = excluded.versionstamp,
                    expires_at = excluded.expires_at",
                rusqlite::params![
                    encoded,
                    key_json,
                    value_json,
                    record.versionstamp.as_u64() as i64,
                    record.expires_at
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn delete_record(&mut self, encoded: &[u8], _previous: &StoredRecord) -> Result<()> {
        self.tx
            .execute("DELETE FROM kv_entries WHERE sort_key = ?1", [encoded])
            .map_err(db_err)?;
        Ok(())
    }

    fn next_versionstamp(&mut self) -> Result<Versionstamp> {
        let next: i64 = self
            .tx
            .query_row(
                "UPDATE kv_meta SET versionstamp = versionstamp + 1, updated_at = datetime('now')
                 WHERE id = 0 RETURNING versionstamp",
                [],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(Versionstamp::new(next as u64))
    }
}
