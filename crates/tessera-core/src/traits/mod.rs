pub mod backend;
pub mod txn;

pub use backend::Backend;
pub use txn::KvTxn;
