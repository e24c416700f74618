use crate::service::BatchResponse;
use snip_core::{ShortCode, StoreError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
    #[error("short url not found: {0}")]
    NotFound(String),
    #[error("short url deleted: {0}")]
    Deleted(ShortCode),
    /// The url is already shortened for this user; `short_url` is the existing code.
    #[error("url already shortened as {short_url}")]
    NotUnique { short_url: ShortCode },
    /// A batch item collided with a live url; carries the existing code.
    #[error("batch item {} already shortened as {}", .0.correlation_id, .0.short_url)]
    BatchConflict(BatchResponse),
    #[error("no free short code after {attempts} attempts")]
    CodeExhausted {
        attempts: usize,
        #[source]
        last: StoreError,
    },
    #[error("storage error: {0}")]
    Storage(#[source] StoreError),
}

impl ShortenerError {
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ShortenerError::NotUnique { .. } | ShortenerError::BatchConflict(_)
        )
    }
}

impl From<StoreError> for ShortenerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(code) => Self::NotFound(code),
            StoreError::Deleted(code) => Self::Deleted(code),
            StoreError::NotUnique { short_url, .. } => Self::NotUnique { short_url },
            other => Self::Storage(other),
        }
    }
}
