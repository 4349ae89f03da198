use lmdb::{Cursor, Database, Transaction};
use lmdb_sys::{MDB_FIRST, MDB_LAST, MDB_NEXT, MDB_PREV, MDB_SET_RANGE};
use std::ops::Bound;
use tessera_core::{
    codec::{decode_key, decode_record},
    error::{Result, TesseraError},
    types::{ScanRange, ScannedEntry},
};

type CursorItem<'txn> = lmdb::Result<(Option<&'txn [u8]>, &'txn [u8])>;

/// Collect up to `limit` live entries of `range`, walking the cursor forward
/// or backward.
///
/// Positioning uses `MDB_SET_RANGE` on the relevant bound, so a scan touches
/// only the keys it returns plus expired ones it skips.
pub fn scan_range<T: Transaction>(
    txn: &T,
    db: Database,
    range: &ScanRange,
    limit: usize,
    reverse: bool,
    now_ms: i64,
) -> Result<Vec<ScannedEntry>> {
    let mut entries = Vec::new();
    if limit == 0 || range.is_empty() {
        return Ok(entries);
    }

    let cursor = txn
        .open_ro_cursor(db)
        .map_err(|e| TesseraError::Connectivity(e.to_string()))?;

    let mut item = if reverse {
        seek_last(&cursor, &range.end)?
    } else {
        seek_first(&cursor, &range.start)
    };

    loop {
        let (key, value) = match item {
            Ok((Some(key), value)) => (key, value),
            Ok((None, _)) | Err(lmdb::Error::NotFound) => break,
            Err(e) => return Err(TesseraError::Connectivity(e.to_string())),
        };

        if range.contains(key) {
            let record = decode_record(value)?;
            if record.is_live(now_ms) {
                entries.push(ScannedEntry {
                    position: key.to_vec(),
                    entry: record.into_entry(decode_key(key)?),
                });
                if entries.len() >= limit {
                    break;
                }
            }
        } else if past_range(range, key, reverse) {
            break;
        }

        item = cursor.get(None, None, if reverse { MDB_PREV } else { MDB_NEXT });
    }

    Ok(entries)
}

fn seek_first<'txn, C: Cursor<'txn>>(cursor: &C, start: &Bound<Vec<u8>>) -> CursorItem<'txn> {
    match start {
        Bound::Included(s) | Bound::Excluded(s) if !s.is_empty() => {
            cursor.get(Some(s), None, MDB_SET_RANGE)
        }
        _ => cursor.get(None, None, MDB_FIRST),
    }
}

fn seek_last<'txn, C: Cursor<'txn>>(cursor: &C, end: &Bound<Vec<u8>>) -> Result<CursorItem<'txn>> {
    let bound = match end {
        Bound::Included(e) | Bound::Excluded(e) if !e.is_empty() => e,
        _ => return Ok(cursor.get(None, None, MDB_LAST)),
    };
    match cursor.get(Some(bound), None, MDB_SET_RANGE) {
        // Landed at or after the bound; the first candidate is at most one step back.
        Ok((Some(found), value)) => {
            if matches!(end, Bound::Included(_)) && found == bound.as_slice() {
                Ok(Ok((Some(found), value)))
            } else {
                Ok(cursor.get(None, None, MDB_PREV))
            }
        }
        Ok((None, _)) | Err(lmdb::Error::NotFound) => Ok(cursor.get(None, None, MDB_LAST)),
        Err(e) => Err(TesseraError::Connectivity(e.to_string())),
    }
}

fn past_range(range: &ScanRange, key: &[u8], reverse: bool) -> bool {
    if reverse {
        match &range.start {
            Bound::Included(s) => key < s.as_slice(),
            Bound::Excluded(s) => key <= s.as_slice(),
            Bound::Unbounded => false,
        }
    } else {
        match &range.end {
            Bound::Included(e) => key > e.as_slice(),
            Bound::Excluded(e) => key >= e.as_slice(),
            Bound::Unbounded => false,
        }
    }
}
