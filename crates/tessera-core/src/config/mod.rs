pub mod lmdb;
pub mod queue;
pub mod sqlite;
pub mod store;

pub use lmdb::{LmdbConfig, SyncMode};
pub use queue::QueueConfig;
pub use sqlite::{ReadPoolConfig, SqliteConfig, SynchronousMode};
pub use store::{BackendConfig, LimitsConfig, StoreConfig};
