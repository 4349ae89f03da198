pub mod atomic;
pub mod entry;
pub mod key;
pub mod list;
pub mod meta;
pub mod value;

pub use atomic::{AtomicWrite, Check, CommitResult, Mutation, MutationKind};
pub use entry::{Entry, EntryMaybe, StoredRecord, Versionstamp};
pub use key::{Key, KeyPart, Symbol};
pub use list::{Consistency, Cursor, ListSelector, ScanRange, ScanRequest, ScannedEntry};
pub use meta::{BackendKind, BackendMeta};
pub use value::Value;
