// Persisted key/value layer - settings in one scope, volatile state in the other

pub mod store;

pub use store::{KeyValueStore, KeyValueStoreExt, MemoryStore, Scope, SqliteStore, StoreError};

/// Result type alias because typing Result<T, StoreError> everywhere is tedious
pub type Result<T> = std::result::Result<T, StoreError>;
