//! Binary layout of a stored record: one format byte followed by bincode of
//! [`StoredRecord`].

use crate::error::{Result, TesseraError};
use crate::types::StoredRecord;

pub const RECORD_FORMAT_V1: u8 = 1;

pub fn encode_record(record: &StoredRecord) -> Result<Vec<u8>> {
    let body = bincode::serialize(record)?;
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(RECORD_FORMAT_V1);
    out.extend_from_slice(&body);
    Ok(out)
}

pub fn decode_record(bytes: &[u8]) -> Result<StoredRecord> {
    match bytes.split_first() {
        Some((&RECORD_FORMAT_V1, body)) => Ok(bincode::deserialize(body)?),
        Some((other, _)) => Err(TesseraError::Encoding(format!(
            "unsupported record format {}",
            other
        ))),
        None => Err(TesseraError::Encoding("empty record".into())),
    }
}
