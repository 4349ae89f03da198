use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::codec::key as key_codec;
use crate::error::Result;

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);

/// Process-unique marker usable as a key part.
///
/// Symbols only exist inside the running process. The key encoder drops them,
/// so a key that differs from another only by symbol parts addresses the same
/// stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(u64);

impl Symbol {
    pub fn new() -> Self {
        Symbol(NEXT_SYMBOL.fetch_add(1, AtomicOrdering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for Symbol {
    fn default() -> Self {
        Self::new()
    }
}

/// A single typed component of a [`Key`].
///
/// Parts of different types order as
/// `Uint < Int < Text < Bytes < Bool`, with `false < true`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Uint(u64),
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
    Bool(bool),
    Symbol(Symbol),
}

impl KeyPart {
    fn rank(&self) -> u8 {
        match self {
            KeyPart::Uint(_) => 0,
            KeyPart::Int(_) => 1,
            KeyPart::Text(_) => 2,
            KeyPart::Bytes(_) => 3,
            KeyPart::Bool(_) => 4,
            KeyPart::Symbol(_) => 5,
        }
    }

    /// Whether this part survives encoding.
    pub fn is_persistable(&self) -> bool {
        !matches!(self, KeyPart::Symbol(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            KeyPart::Uint(_) => "uint",
            KeyPart::Int(_) => "int",
            KeyPart::Text(_) => "text",
            KeyPart::Bytes(_) => "bytes",
            KeyPart::Bool(_) => "bool",
            KeyPart::Symbol(_) => "symbol",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            KeyPart::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Uint(a), KeyPart::Uint(b)) => a.cmp(b),
            (KeyPart::Int(a), KeyPart::Int(b)) => a.cmp(b),
            (KeyPart::Text(a), KeyPart::Text(b)) => a.as_bytes().cmp(b.as_bytes()),
            (KeyPart::Bytes(a), KeyPart::Bytes(b)) => a.cmp(b),
            (KeyPart::Bool(a), KeyPart::Bool(b)) => a.cmp(b),
            (KeyPart::Symbol(a), KeyPart::Symbol(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Uint(v) => write!(f, "{}u", v),
            KeyPart::Int(v) => write!(f, "{}", v),
            KeyPart::Text(s) => write!(f, "{:?}", s),
            KeyPart::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            KeyPart::Bool(v) => write!(f, "{}", v),
            KeyPart::Symbol(s) => write!(f, "Symbol({})", s.0),
        }
    }
}

macro_rules! key_part_from {
    ($($ty:ty => $variant:ident as $target:ty),* $(,)?) => {
        $(
            impl From<$ty> for KeyPart {
                fn from(v: $ty) -> Self {
                    KeyPart::$variant(v as $target)
                }
            }
        )*
    };
}

key_part_from! {
    i64 => Int as i64,
    i32 => Int as i64,
    u64 => Uint as u64,
    u32 => Uint as u64,
    usize => Uint as u64,
}

impl From<&str> for KeyPart {
    fn from(v: &str) -> Self {
        KeyPart::Text(v.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(v: String) -> Self {
        KeyPart::Text(v)
    }
}

impl From<&String> for KeyPart {
    fn from(v: &String) -> Self {
        KeyPart::Text(v.clone())
    }
}

impl From<bool> for KeyPart {
    fn from(v: bool) -> Self {
        KeyPart::Bool(v)
    }
}

impl From<Vec<u8>> for KeyPart {
    fn from(v: Vec<u8>) -> Self {
        KeyPart::Bytes(v)
    }
}

impl From<&[u8]> for KeyPart {
    fn from(v: &[u8]) -> Self {
        KeyPart::Bytes(v.to_vec())
    }
}

impl From<Symbol> for KeyPart {
    fn from(v: Symbol) -> Self {
        KeyPart::Symbol(v)
    }
}

/// An ordered sequence of typed parts; the sole identity of an entry.
///
/// Keys compare part by part and a strict prefix sorts first. For keys
/// without symbol parts this order is exactly the byte order of their
/// encodings, so every backend returns ranges in the same order.
///
/// Equality, hashing and ordering only look at persistable parts: two keys
/// that differ only in symbols address the same entry and compare equal.
#[derive(Debug, Clone, Default)]
pub struct Key(Vec<KeyPart>);

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.persisted().eq(other.persisted())
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.persistable_len().hash(state);
        for part in self.persisted() {
            part.hash(state);
        }
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.persisted().cmp(other.persisted())
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Key {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Key(parts)
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn into_parts(self) -> Vec<KeyPart> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a part, builder style.
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn push(&mut self, part: impl Into<KeyPart>) {
        self.0.push(part.into());
    }

    pub fn first(&self) -> Option<&KeyPart> {
        self.0.first()
    }

    fn persisted(&self) -> impl Iterator<Item = &KeyPart> + '_ {
        self.0.iter().filter(|p| p.is_persistable())
    }

    /// Number of parts that survive encoding.
    pub fn persistable_len(&self) -> usize {
        self.persisted().count()
    }

    /// This key with every symbol part removed.
    pub fn persistable(&self) -> Key {
        Key(self.persisted().cloned().collect())
    }

    pub fn starts_with(&self, prefix: &Key) -> bool {
        let mut own = self.persisted();
        prefix.persisted().all(|part| own.next() == Some(part))
    }

    /// Canonical order-preserving byte encoding.
    ///
    /// Fails with a validation error when no persistable part remains.
    pub fn encode(&self) -> Result<Vec<u8>> {
        key_codec::encode_key(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Key> {
        key_codec::decode_key(bytes)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", part)?;
        }
        write!(f, "]")
    }
}

impl From<Vec<KeyPart>> for Key {
    fn from(parts: Vec<KeyPart>) -> Self {
        Key(parts)
    }
}

impl FromIterator<KeyPart> for Key {
    fn from_iter<I: IntoIterator<Item = KeyPart>>(iter: I) -> Self {
        Key(iter.into_iter().collect())
    }
}

/// Build a [`Key`] from anything convertible into [`KeyPart`]s.
///
/// ```
/// use tessera_core::key;
/// let k = key!["users", "by_id", 42];
/// assert_eq!(k.len(), 3);
/// ```
#[macro_export]
macro_rules! key {
    () => {
        $crate::types::Key::default()
    };
    ($($part:expr),+ $(,)?) => {
        $crate::types::Key::new(vec![$($crate::types::KeyPart::from($part)),+])
    };
}
