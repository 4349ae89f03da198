//! Text forms of keys, for backends that keep keys in text columns.
//!
//! The canonical form is a JSON array of externally tagged parts:
//!
//! ```text
//! [{"text":"users"},{"int":-5},{"uint":7},{"bool":true},{"bytes":"AAE"}]
//! ```
//!
//! Stores written by older releases hold keys in two other shapes, which are
//! still read transparently:
//!
//! - a JSON array of bare scalars, either directly (`["users","u1"]`) or
//!   double-encoded inside a JSON string (`"[\"users\",\"u1\"]"`);
//! - a comma-joined string (`users,u1`), where every part is read back as text.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value as Json};

use crate::error::{Result, TesseraError};
use crate::types::{Key, KeyPart};

/// Shape of a stored text key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredKeyFormat {
    /// Array of tagged parts, as written by [`encode_key_text`].
    Structured,
    /// Array of bare JSON scalars, possibly wrapped in a JSON string.
    JsonArrayString,
    /// Parts joined with `,`; type information was never recorded.
    CommaJoined,
}

/// Render a key in the canonical structured form.
pub fn encode_key_text(key: &Key) -> Result<String> {
    if key.persistable_len() == 0 {
        return Err(TesseraError::Validation(
            "key must contain at least one non-symbol part".into(),
        ));
    }
    let parts: Vec<Json> = key
        .parts()
        .iter()
        .filter_map(|part| {
            let (tag, value) = match part {
                KeyPart::Uint(v) => ("uint", Json::from(*v)),
                KeyPart::Int(v) => ("int", Json::from(*v)),
                KeyPart::Text(s) => ("text", Json::from(s.as_str())),
                KeyPart::Bytes(b) => ("bytes", Json::from(URL_SAFE_NO_PAD.encode(b))),
                KeyPart::Bool(v) => ("bool", Json::from(*v)),
                KeyPart::Symbol(_) => return None,
            };
            let mut tagged = Map::with_capacity(1);
            tagged.insert(tag.to_string(), value);
            Some(Json::Object(tagged))
        })
        .collect();
    Ok(Json::Array(parts).to_string())
}

/// Work out which shape a stored text key has.
pub fn detect_format(raw: &str) -> StoredKeyFormat {
    match serde_json::from_str::<Json>(raw.trim()) {
        Ok(Json::Array(items)) if !items.is_empty() => {
            if items.iter().all(is_tagged_part) {
                StoredKeyFormat::Structured
            } else {
                StoredKeyFormat::JsonArrayString
            }
        }
        Ok(Json::String(inner)) if matches!(
            serde_json::from_str::<Json>(&inner),
            Ok(Json::Array(ref items)) if !items.is_empty()
        ) =>
        {
            StoredKeyFormat::JsonArrayString
        }
        _ => StoredKeyFormat::CommaJoined,
    }
}

/// Decode a stored text key in any supported format.
pub fn decode_key_text(raw: &str) -> Result<Key> {
    let format = detect_format(raw);
    decode_key_text_as(raw, format)
}

/// Decode a stored text key, assuming it has the given shape.
pub fn decode_key_text_as(raw: &str, format: StoredKeyFormat) -> Result<Key> {
    match format {
        StoredKeyFormat::Structured | StoredKeyFormat::JsonArrayString => {
            let items = match serde_json::from_str::<Json>(raw.trim())? {
                Json::Array(items) => items,
                Json::String(inner) => match serde_json::from_str::<Json>(&inner)? {
                    Json::Array(items) => items,
                    _ => return Err(not_an_array(raw)),
                },
                _ => return Err(not_an_array(raw)),
            };
            let parts = items.iter().map(decode_part).collect::<Result<Vec<_>>>()?;
            if parts.is_empty() {
                return Err(not_an_array(raw));
            }
            Ok(Key::new(parts))
        }
        StoredKeyFormat::CommaJoined => {
            if raw.is_empty() {
                return Err(TesseraError::Encoding("empty stored key".into()));
            }
            Ok(raw.split(',').map(KeyPart::from).collect())
        }
    }
}

fn not_an_array(raw: &str) -> TesseraError {
    TesseraError::Encoding(format!("stored key is not a non-empty JSON array: {}", raw))
}

fn is_tagged_part(item: &Json) -> bool {
    match item {
        Json::Object(map) if map.len() == 1 => map
            .keys()
            .all(|k| matches!(k.as_str(), "uint" | "int" | "text" | "bytes" | "bool")),
        _ => false,
    }
}

fn decode_part(item: &Json) -> Result<KeyPart> {
    match item {
        Json::Object(map) if is_tagged_part(item) => {
            let (tag, value) = map
                .iter()
                .next()
                .ok_or_else(|| TesseraError::Encoding("empty tagged key part".into()))?;
            let bad = || TesseraError::Encoding(format!("invalid {} key part: {}", tag, value));
            match tag.as_str() {
                "uint" => value.as_u64().map(KeyPart::Uint).ok_or_else(bad),
                "int" => value.as_i64().map(KeyPart::Int).ok_or_else(bad),
                "text" => value
                    .as_str()
                    .map(|s| KeyPart::Text(s.to_string()))
                    .ok_or_else(bad),
                "bool" => value.as_bool().map(KeyPart::Bool).ok_or_else(bad),
                "bytes" => {
                    let encoded = value.as_str().ok_or_else(bad)?;
                    URL_SAFE_NO_PAD
                        .decode(encoded)
                        .map(KeyPart::Bytes)
                        .map_err(|_| bad())
                }
                _ => Err(bad()),
            }
        }
        Json::String(s) => Ok(KeyPart::Text(s.clone())),
        Json::Bool(b) => Ok(KeyPart::Bool(*b)),
        Json::Number(n) => {
            if let Some(v) = n.as_i64() {
                Ok(KeyPart::Int(v))
            } else if let Some(v) = n.as_u64() {
                Ok(KeyPart::Uint(v))
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                        Ok(KeyPart::Int(f as i64))
                    }
                    _ => Err(TesseraError::Encoding(format!(
                        "fractional number {} cannot be a key part",
                        n
                    ))),
                }
            }
        }
        other => Err(TesseraError::Encoding(format!(
            "unsupported key part in stored key: {}",
            other
        ))),
    }
}
