/// Expiry index key: sortable expiry timestamp followed by the encoded entry key.
///
/// Flipping the sign bit makes big-endian byte order match numeric order, so a
/// cursor walking the index from the start sees the earliest expiries first.
pub fn expiry_index_key(expires_at: i64, encoded_key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + encoded_key.len());
    out.extend_from_slice(&((expires_at as u64) ^ (1 << 63)).to_be_bytes());
    out.extend_from_slice(encoded_key);
    out
}

/// Split an expiry index key into its timestamp and encoded entry key.
pub fn split_expiry_index_key(bytes: &[u8]) -> Option<(i64, &[u8])> {
    if bytes.len() <= 8 {
        return None;
    }
    let (ts, key) = bytes.split_at(8);
    let mut raw = [0u8; 8];
    raw.copy_from_slice(ts);
    Some(((u64::from_be_bytes(raw) ^ (1 << 63)) as i64, key))
}

/// Meta keys used in the meta database
pub mod meta_keys {
    pub const VERSIONSTAMP: &str = "versionstamp";
    pub const SCHEMA_VERSION: &str = "schema_version";
    pub const CREATED_AT: &str = "created_at";
}

pub const SCHEMA_VERSION: u32 = 1;
