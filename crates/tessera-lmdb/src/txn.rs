use lmdb::{Database, RwTransaction, Transaction, WriteFlags};
use tessera_core::{
    codec::{decode_record, encode_record},
    error::{Result, TesseraError},
    traits::KvTxn,
    types::{Key, StoredRecord, Versionstamp},
};

use crate::keys::{expiry_index_key, meta_keys};

/// Write transaction for one atomic commit
///
/// Wraps a single LMDB write transaction covering the entries, expiry index
/// and meta databases. Dropping it without [`LmdbKvTxn::commit`] aborts.
pub struct LmdbKvTxn<'a> {
    txn: RwTransaction<'a>,
    entries_db: Database,
    expiry_db: Database,
    meta_db: Database,
}

impl<'a> LmdbKvTxn<'a> {
    pub fn new(
        txn: RwTransaction<'a>,
        entries_db: Database,
        expiry_db: Database,
        meta_db: Database,
    ) -> Self {
        Self {
            txn,
            entries_db,
            expiry_db,
            meta_db,
        }
    }

    pub fn commit(self) -> Result<()> {
        self.txn
            .commit()
            .map_err(|e| TesseraError::Connectivity(e.to_string()))
    }

    fn unindex_expiry(&mut self, encoded: &[u8], previous: Option<&StoredRecord>) -> Result<()> {
        if let Some(at) = previous.and_then(|r| r.expires_at) {
            let index_key = expiry_index_key(at, encoded);
            match self.txn.del(self.expiry_db, &index_key, None) {
                Ok(()) | Err(lmdb::Error::NotFound) => {}
                Err(e) => return Err(TesseraError::Connectivity(e.to_string())),
            }
        }
        Ok(())
    }
}

/// Read the last allocated versionstamp from the meta database
pub(crate) fn read_versionstamp<T: Transaction>(txn: &T, meta_db: Database) -> Result<Versionstamp> {
    match txn.get(meta_db, &meta_keys::VERSIONSTAMP) {
        Ok(bytes) => {
            let raw = std::str::from_utf8(bytes)
                .map_err(|e| TesseraError::Encoding(e.to_string()))?
                .parse::<u64>()
                .map_err(|e| TesseraError::Encoding(e.to_string()))?;
            Ok(Versionstamp::new(raw))
        }
        Err(lmdb::Error::NotFound) => Ok(Versionstamp::ZERO),
        Err(e) => Err(TesseraError::Connectivity(e.to_string())),
    }
}

/// Read and decode a record from the entries database
pub(crate) fn read_record<T: Transaction>(
    txn: &T,
    entries_db: Database,
    encoded: &[u8],
) -> Result<Option<StoredRecord>> {
    match txn.get(entries_db, &encoded) {
        Ok(bytes) => Ok(Some(decode_record(bytes)?)),
        Err(lmdb::Error::NotFound) => Ok(None),
        Err(e) => Err(TesseraError::Connectivity(e.to_string())),
    }
}

impl KvTxn for LmdbKvTxn<'_> {
    fn get_record(&mut self, key: &[u8]) -> Result<Option<StoredRecord>> {
        read_record(&self.txn, self.entries_db, key)
    }

    fn put_record(
        &mut self,
        _key: &Key,
        encoded: &[u8],
        record: &StoredRecord,
        previous: Option<&StoredRecord>,
    ) -> Result<()> {
        let bytes = encode_record(record)?;
        self.txn
            .put(self.entries_db, &encoded, &bytes, WriteFlags::empty())
            .map_err(|e| TesseraError::Connectivity(e.to_string()))?;

        self.unindex_expiry(encoded, previous)?;
        if let Some(at) = record.expires_at {
            let index_key = expiry_index_key(at, encoded);
            self.txn
                .put(self.expiry_db, &index_key, &[], WriteFlags::empty())
                .map_err(|e| TesseraError::Connectivity(e.to_string()))?;
        }
        Ok(())
    }

    fn delete_record(&mut self, encoded: &[u8], previous: &StoredRecord) -> Result<()> {
        match self.txn.del(self.entries_db, &encoded, None) {
            Ok(()) | Err(lmdb::Error::NotFound) => {}
            Err(e) => return Err(TesseraError::Connectivity(e.to_string())),
        }
        self.unindex_expiry(encoded, Some(previous))
    }

    fn next_versionstamp(&mut self) -> Result<Versionstamp> {
        let next = read_versionstamp(&self.txn, self.meta_db)?.next()?;
        self.txn
            .put(
                self.meta_db,
                &meta_keys::VERSIONSTAMP,
                &next.as_u64().to_string(),
                WriteFlags::empty(),
            )
            .map_err(|e| TesseraError::Connectivity(e.to_string()))?;
        Ok(next)
    }
}
