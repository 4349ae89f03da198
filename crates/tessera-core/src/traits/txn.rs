use crate::error::Result;
use crate::types::{Key, StoredRecord, Versionstamp};

/// Write transaction a backend opens for one atomic commit.
///
/// Reads observe writes made earlier in the same transaction. Nothing is
/// visible to other readers until the backend commits the native transaction,
/// and dropping it without commit discards every staged change.
///
/// Not required to be Send, as LMDB transactions are thread-affine.
pub trait KvTxn {
    /// Current record under an encoded key, expired or not.
    fn get_record(&mut self, key: &[u8]) -> Result<Option<StoredRecord>>;

    /// Store `record` under `key`; `previous` is what `get_record` returned.
    fn put_record(
        &mut self,
        key: &Key,
        encoded: &[u8],
        record: &StoredRecord,
        previous: Option<&StoredRecord>,
    ) -> Result<()>;

    /// Remove the record under an encoded key.
    fn delete_record(&mut self, encoded: &[u8], previous: &StoredRecord) -> Result<()>;

    /// Allocate the versionstamp for this commit.
    ///
    /// Called at most once per transaction, only after every check held.
    fn next_versionstamp(&mut self) -> Result<Versionstamp>;
}
