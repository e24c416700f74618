//! Storage backends for the snip link store.
//!
//! Three implementations of [`snip_core::Store`] share one conflict policy:
//! [`MemoryStore`], [`FileStore`] (memory plus an append-only JSON log) and
//! [`PostgresStore`]. [`StorageBackend`] picks one of them at startup.

pub mod backend;
pub mod file;
pub mod memory;
pub mod postgres;

pub use backend::{BackendKind, StorageBackend, StorageConfig};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use snip_core::{ReadStore, Store, StoreError};
