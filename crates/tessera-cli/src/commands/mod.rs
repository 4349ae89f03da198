pub mod entry;
pub mod list;
pub mod status;

use anyhow::{Context, Result};
use tessera::codec::{decode_key_text, encode_key_text};
use tessera::codec::value::value_to_json;
use tessera::prelude::*;

/// Parse a key in any accepted text form
pub fn parse_key(raw: &str) -> Result<Key> {
    decode_key_text(raw).with_context(|| format!("Invalid key {:?}", raw))
}

pub fn format_key(key: &Key) -> Result<String> {
    Ok(encode_key_text(key)?)
}

pub fn format_value(value: &Value) -> Result<String> {
    Ok(serde_json::to_string_pretty(&value_to_json(value)?)?)
}
