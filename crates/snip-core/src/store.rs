use crate::error::Result;
use crate::shortcode::{ShortCode, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A stored link record.
///
/// This is also the on-disk shape of one line of the file backend's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortLink {
    /// Opaque record identifier, never reused within a store.
    pub id: u64,
    pub user_id: UserId,
    pub short_url: ShortCode,
    pub original_url: String,
    #[serde(default)]
    pub is_deleted: bool,
}

impl ShortLink {
    /// A record that is not soft-deleted.
    pub fn is_live(&self) -> bool {
        !self.is_deleted
    }

    pub fn to_pair(&self) -> LinkPair {
        LinkPair {
            short_url: self.short_url.clone(),
            original_url: self.original_url.clone(),
        }
    }
}

/// A `{code, url}` pair, the unit of batch inserts and user listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPair {
    pub short_url: ShortCode,
    pub original_url: String,
}

impl LinkPair {
    pub fn new(short_url: ShortCode, original_url: impl Into<String>) -> Self {
        Self {
            short_url,
            original_url: original_url.into(),
        }
    }
}

/// Identifies one user's link for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRef {
    pub user_id: UserId,
    pub short_url: ShortCode,
}

impl LinkRef {
    pub fn new(user_id: impl Into<UserId>, short_url: ShortCode) -> Self {
        Self {
            user_id: user_id.into(),
            short_url,
        }
    }
}

/// Aggregate counters over live records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of live links across all users.
    pub urls: u64,
    /// Number of users owning at least one live link.
    pub users: u64,
}

/// A read-only view of a store.
///
/// This trait provides only the read operations from [`Store`],
/// allowing callers that only resolve codes to hold read-only access.
#[async_trait]
pub trait ReadStore: Send + Sync + 'static {
    /// Resolves a short code to its original URL.
    ///
    /// Returns `Err(NotFound)` if no record has this code and `Err(Deleted)`
    /// if every record with this code is soft-deleted.
    async fn get(&self, code: &ShortCode) -> Result<String>;

    /// Lists the live links of a user in insertion order.
    async fn get_all_urls(&self, user_id: &UserId) -> Result<Vec<LinkPair>>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<()>;

    /// Counts live links and the users owning them.
    async fn stats(&self) -> Result<StoreStats>;
}

#[async_trait]
pub trait Store: ReadStore {
    /// Inserts a new link for `user_id` and returns the stored code.
    ///
    /// Returns `Err(NotUnique)` with the existing code if the user already
    /// has a live link for `original_url`, and `Err(DuplicateCode)` if the
    /// code is already live for the user. Nothing is inserted on error.
    async fn set(
        &self,
        user_id: &UserId,
        code: &ShortCode,
        original_url: &str,
    ) -> Result<ShortCode>;

    /// Inserts a batch of links for `user_id` with all-or-nothing semantics.
    ///
    /// The whole batch is checked before anything is written. The first
    /// conflicting item is reported the same way as [`Store::set`] reports it
    /// and no item of the batch is inserted.
    async fn set_batch(&self, user_id: &UserId, batch: Vec<LinkPair>) -> Result<Vec<LinkPair>>;

    /// Soft-deletes the given links. Links that are unknown or already
    /// deleted are skipped.
    async fn delete_short_urls(&self, links: Vec<LinkRef>) -> Result<()>;

    /// Physically removes every soft-deleted record of every user.
    /// Returns the number of removed records.
    async fn hard_delete_urls(&self) -> Result<u64>;
}
