//! Value serialization for each storage model.
//!
//! - Binary (embedded store): bincode of [`Value`].
//! - JSON (relational store): natural JSON where it is unambiguous. Integers
//!   are JSON integers and floats always carry a fraction or exponent, so the
//!   two never collapse into each other. Binary data is written as
//!   `{"$bytes": "<base64>"}`; a genuine object whose single key is `$bytes`
//!   or `$object` is escaped as `{"$object": {...}}`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Number, Value as Json};
use std::collections::BTreeMap;

use crate::error::{Result, TesseraError};
use crate::types::Value;

const BYTES_TAG: &str = "$bytes";
const OBJECT_TAG: &str = "$object";

pub fn encode_value_binary(value: &Value) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

pub fn decode_value_binary(bytes: &[u8]) -> Result<Value> {
    Ok(bincode::deserialize(bytes)?)
}

pub fn encode_value_json(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(&value_to_json(value)?)?)
}

pub fn decode_value_json(raw: &str) -> Result<Value> {
    let json: Json = serde_json::from_str(raw)?;
    Ok(value_from_json(json))
}

/// Lower a value into JSON. Fails only for non-finite floats.
pub fn value_to_json(value: &Value) -> Result<Json> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(v) => Json::Number(Number::from(*v)),
        Value::Float(f) => Json::Number(Number::from_f64(*f).ok_or_else(|| {
            TesseraError::Encoding(format!("non-finite float {} cannot be stored as JSON", f))
        })?),
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(b) => single(BYTES_TAG, Json::String(STANDARD.encode(b))),
        Value::Array(items) => Json::Array(
            items
                .iter()
                .map(value_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), value_to_json(v)?);
            }
            if needs_escape(map) {
                single(OBJECT_TAG, Json::Object(out))
            } else {
                Json::Object(out)
            }
        }
    })
}

/// Lift JSON into a value.
///
/// Integral numbers without a fraction become `Int`; integers beyond the
/// `i64` range fall back to `Float`.
pub fn value_from_json(json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => match n.as_i64() {
            Some(v) => Value::Int(v),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::String(s),
        Json::Array(items) => Value::Array(items.into_iter().map(value_from_json).collect()),
        Json::Object(mut map) => {
            if map.len() == 1 {
                if let Some(Json::String(encoded)) = map.get(BYTES_TAG) {
                    if let Ok(bytes) = STANDARD.decode(encoded) {
                        return Value::Bytes(bytes);
                    }
                }
                if let Some(Json::Object(_)) = map.get(OBJECT_TAG) {
                    if let Some(Json::Object(inner)) = map.remove(OBJECT_TAG) {
                        return Value::Object(object_from_json(inner));
                    }
                }
            }
            Value::Object(object_from_json(map))
        }
    }
}

fn object_from_json(map: Map<String, Json>) -> BTreeMap<String, Value> {
    map.into_iter()
        .map(|(k, v)| (k, value_from_json(v)))
        .collect()
}

fn needs_escape(map: &BTreeMap<String, Value>) -> bool {
    map.len() == 1 && (map.contains_key(BYTES_TAG) || map.contains_key(OBJECT_TAG))
}

fn single(tag: &str, value: Json) -> Json {
    let mut map = Map::with_capacity(1);
    map.insert(tag.to_string(), value);
    Json::Object(map)
}
