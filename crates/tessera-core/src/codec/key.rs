//! Order-preserving binary key encoding.
//!
//! Each persistable part becomes one self-delimiting segment:
//!
//! - unsigned: `0x10` + 8 bytes big-endian
//! - signed: `0x18` + 8 bytes big-endian of `value ^ i64::MIN` (sign bit flipped)
//! - text: `0x20` + escaped UTF-8 + `0x00`
//! - bytes: `0x28` + escaped bytes + `0x00`
//! - boolean: `0x30` (false) or `0x31` (true)
//!
//! Escaping maps `0x00 -> 0x01 0x01` and `0x01 -> 0x01 0x02`, so the `0x00`
//! terminator sorts a shorter string before any extension of it. Byte order of
//! encoded keys equals the logical order of [`Key`]. No segment starts with
//! [`PREFIX_END`], which makes `prefix ++ 0xFF` an exclusive upper bound for
//! everything under a prefix.

use crate::error::{Result, TesseraError};
use crate::types::{Key, KeyPart};

pub const TAG_UINT: u8 = 0x10;
pub const TAG_INT: u8 = 0x18;
pub const TAG_TEXT: u8 = 0x20;
pub const TAG_BYTES: u8 = 0x28;
pub const TAG_FALSE: u8 = 0x30;
pub const TAG_TRUE: u8 = 0x31;

/// Sorts after every segment tag.
pub const PREFIX_END: u8 = 0xFF;

const TERMINATOR_BYTE: u8 = 0x00;
const ESCAPE_BYTE: u8 = 0x01;

/// Encode a key, rejecting keys with no persistable part.
pub fn encode_key(key: &Key) -> Result<Vec<u8>> {
    if key.persistable_len() == 0 {
        return Err(TesseraError::Validation(
            "key must contain at least one non-symbol part".into(),
        ));
    }
    Ok(encode_parts(key.parts()))
}

/// Encode parts as-is; symbols are dropped and an empty result is allowed.
///
/// Used for prefixes, where the empty key addresses the whole keyspace.
pub fn encode_parts(parts: &[KeyPart]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(parts.len() * 10);
    for part in parts {
        match part {
            KeyPart::Uint(v) => {
                buf.push(TAG_UINT);
                buf.extend_from_slice(&v.to_be_bytes());
            }
            KeyPart::Int(v) => {
                buf.push(TAG_INT);
                buf.extend_from_slice(&((*v as u64) ^ (1 << 63)).to_be_bytes());
            }
            KeyPart::Text(s) => {
                buf.push(TAG_TEXT);
                write_terminated(s.as_bytes(), &mut buf);
            }
            KeyPart::Bytes(b) => {
                buf.push(TAG_BYTES);
                write_terminated(b, &mut buf);
            }
            KeyPart::Bool(false) => buf.push(TAG_FALSE),
            KeyPart::Bool(true) => buf.push(TAG_TRUE),
            KeyPart::Symbol(_) => {}
        }
    }
    buf
}

fn write_terminated(data: &[u8], buf: &mut Vec<u8>) {
    for &byte in data {
        match byte {
            TERMINATOR_BYTE => buf.extend_from_slice(&[ESCAPE_BYTE, 0x01]),
            ESCAPE_BYTE => buf.extend_from_slice(&[ESCAPE_BYTE, 0x02]),
            _ => buf.push(byte),
        }
    }
    buf.push(TERMINATOR_BYTE);
}

/// Decode an encoded key exactly, preserving every part's type.
pub fn decode_key(mut bytes: &[u8]) -> Result<Key> {
    if bytes.is_empty() {
        return Err(TesseraError::Encoding("empty encoded key".into()));
    }
    let mut parts = Vec::new();
    while let Some((&tag, rest)) = bytes.split_first() {
        bytes = rest;
        let part = match tag {
            TAG_UINT => KeyPart::Uint(u64::from_be_bytes(read_fixed(&mut bytes)?)),
            TAG_INT => {
                let raw = u64::from_be_bytes(read_fixed(&mut bytes)?);
                KeyPart::Int((raw ^ (1 << 63)) as i64)
            }
            TAG_TEXT => {
                let raw = read_terminated(&mut bytes)?;
                let text = String::from_utf8(raw)
                    .map_err(|e| TesseraError::Encoding(format!("invalid UTF-8 in key: {}", e)))?;
                KeyPart::Text(text)
            }
            TAG_BYTES => KeyPart::Bytes(read_terminated(&mut bytes)?),
            TAG_FALSE => KeyPart::Bool(false),
            TAG_TRUE => KeyPart::Bool(true),
            other => {
                return Err(TesseraError::Encoding(format!(
                    "unknown key part tag 0x{:02x}",
                    other
                )))
            }
        };
        parts.push(part);
    }
    Ok(Key::new(parts))
}

fn read_fixed(buf: &mut &[u8]) -> Result<[u8; 8]> {
    if buf.len() < 8 {
        return Err(TesseraError::Encoding("truncated integer key part".into()));
    }
    let mut out = [0u8; 8];
    out.copy_from_slice(&buf[..8]);
    *buf = &buf[8..];
    Ok(out)
}

fn read_terminated(buf: &mut &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::new();
    let mut i = 0;
    while i < buf.len() {
        match buf[i] {
            TERMINATOR_BYTE => {
                *buf = &buf[i + 1..];
                return Ok(result);
            }
            ESCAPE_BYTE => {
                match buf.get(i + 1) {
                    Some(0x01) => result.push(TERMINATOR_BYTE),
                    Some(0x02) => result.push(ESCAPE_BYTE),
                    Some(next) => {
                        return Err(TesseraError::Encoding(format!(
                            "invalid escape sequence: 0x01 0x{:02x}",
                            next
                        )))
                    }
                    None => {
                        return Err(TesseraError::Encoding(
                            "truncated escape sequence in key part".into(),
                        ))
                    }
                }
                i += 2;
            }
            byte => {
                result.push(byte);
                i += 1;
            }
        }
    }
    Err(TesseraError::Encoding(
        "unterminated key part (missing 0x00 terminator)".into(),
    ))
}
