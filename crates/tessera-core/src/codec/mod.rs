pub mod key;
pub mod key_text;
pub mod record;
pub mod value;

pub use key::{decode_key, encode_key, encode_parts};
pub use key_text::{decode_key_text, detect_format, encode_key_text, StoredKeyFormat};
pub use record::{decode_record, encode_record};
pub use value::{decode_value_binary, decode_value_json, encode_value_binary, encode_value_json};
