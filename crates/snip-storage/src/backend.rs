use crate::file::FileStore;
use crate::memory::MemoryStore;
use crate::postgres::PostgresStore;
use async_trait::async_trait;
use snip_core::{
    LinkPair, LinkRef, ReadStore, Result, ShortCode, Store, StoreStats, UserId,
};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use tracing::info;
use typed_builder::TypedBuilder;

/// Selects and configures the storage backend.
///
/// The first configured option wins: a database DSN, then a file path,
/// then the in-memory store.
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct StorageConfig {
    #[builder(default, setter(strip_option, into))]
    pub database_dsn: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub file_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Returns the kind of backend this configuration selects.
    pub fn kind(&self) -> BackendKind {
        if self.database_dsn.as_deref().is_some_and(|dsn| !dsn.is_empty()) {
            BackendKind::Database
        } else if self
            .file_path
            .as_ref()
            .is_some_and(|p| !p.as_os_str().is_empty())
        {
            BackendKind::File
        } else {
            BackendKind::Memory
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    File,
    Database,
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::File => write!(f, "file"),
            BackendKind::Database => write!(f, "database"),
        }
    }
}

/// The storage backend of a process, chosen once at startup.
#[derive(Debug)]
pub enum StorageBackend {
    Memory(MemoryStore),
    File(FileStore),
    Database(PostgresStore),
}

impl StorageBackend {
    /// Opens the backend selected by `config`.
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        let backend = match (config.kind(), &config.database_dsn, &config.file_path) {
            (BackendKind::Database, Some(dsn), _) => {
                Self::Database(PostgresStore::connect(dsn).await?)
            }
            (BackendKind::File, _, Some(path)) => Self::File(FileStore::open(path).await?),
            _ => Self::Memory(MemoryStore::new()),
        };

        info!(backend = %backend.kind(), "storage initialized");
        Ok(backend)
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            StorageBackend::Memory(_) => BackendKind::Memory,
            StorageBackend::File(_) => BackendKind::File,
            StorageBackend::Database(_) => BackendKind::Database,
        }
    }

    /// Releases backend resources. Only the database holds any.
    pub async fn close(&self) {
        if let StorageBackend::Database(store) = self {
            store.close().await;
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            StorageBackend::Memory($store) => $call,
            StorageBackend::File($store) => $call,
            StorageBackend::Database($store) => $call,
        }
    };
}

#[async_trait]
impl ReadStore for StorageBackend {
    async fn get(&self, code: &ShortCode) -> Result<String> {
        dispatch!(self, store => store.get(code).await)
    }

    async fn get_all_urls(&self, user_id: &UserId) -> Result<Vec<LinkPair>> {
        dispatch!(self, store => store.get_all_urls(user_id).await)
    }

    async fn ping(&self) -> Result<()> {
        dispatch!(self, store => store.ping().await)
    }

    async fn stats(&self) -> Result<StoreStats> {
        dispatch!(self, store => store.stats().await)
    }
}

#[async_trait]
impl Store for StorageBackend {
    async fn set(
        &self,
        user_id: &UserId,
        code: &ShortCode,
        original_url: &str,
    ) -> Result<ShortCode> {
        dispatch!(self, store => store.set(user_id, code, original_url).await)
    }

    async fn set_batch(&self, user_id: &UserId, batch: Vec<LinkPair>) -> Result<Vec<LinkPair>> {
        dispatch!(self, store => store.set_batch(user_id, batch).await)
    }

    async fn delete_short_urls(&self, links: Vec<LinkRef>) -> Result<()> {
        dispatch!(self, store => store.delete_short_urls(links).await)
    }

    async fn hard_delete_urls(&self) -> Result<u64> {
        dispatch!(self, store => store.hard_delete_urls().await)
    }
}
