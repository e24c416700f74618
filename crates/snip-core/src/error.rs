use crate::shortcode::ShortCode;
use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors returned by every [`Store`](crate::store::Store) implementation.
///
/// The first four variants are part of the store contract and are matched
/// on by callers; the rest are infrastructure failures that are propagated
/// unchanged.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No record exists for the short code.
    #[error("unknown short code: {0}")]
    NotFound(String),
    /// The short code exists but has been soft-deleted.
    #[error("short code was deleted: {0}")]
    Deleted(ShortCode),
    /// Another live record of the same user already uses this code.
    #[error("short code is duplicate: {0}")]
    DuplicateCode(ShortCode),
    /// The user already has a live code for this original URL.
    #[error("url `{original_url}` is not unique, existing short code: {short_url}")]
    NotUnique {
        short_url: ShortCode,
        original_url: String,
    },
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage i/o failed: {0}")]
    Io(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
}

impl StoreError {
    /// Returns `true` for errors that signal a uniqueness conflict rather
    /// than a failure of the backend itself.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::DuplicateCode(_) | Self::NotUnique { .. })
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}
