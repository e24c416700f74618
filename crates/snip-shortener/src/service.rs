use crate::error::ShortenerError;
use crate::lifecycle::{LifecycleHandle, LifecycleManager};
use crate::settings::ShortenerSettings;
use snip_core::{LinkPair, LinkRef, ShortCode, Store, StoreError, StoreStats, UserId};
use snip_generator::Generator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub type Result<T> = std::result::Result<T, ShortenerError>;

/// One item of a batch shorten request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub correlation_id: String,
    pub original_url: String,
}

impl BatchRequest {
    pub fn new(correlation_id: impl Into<String>, original_url: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            original_url: original_url.into(),
        }
    }
}

/// The code assigned to one item of a batch, keyed by its correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResponse {
    pub correlation_id: String,
    pub short_url: ShortCode,
}

/// Link shortening on top of a [`Store`].
///
/// Candidate codes come from the generator and are not assumed to be unique:
/// a code collision is retried with a fresh candidate up to
/// `settings.max_attempts` times.
#[derive(Debug)]
pub struct ShortenerService<S, G> {
    store: Arc<S>,
    generator: Arc<G>,
    settings: ShortenerSettings,
}

impl<S, G> Clone for ShortenerService<S, G> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            generator: Arc::clone(&self.generator),
            settings: self.settings,
        }
    }
}

impl<S: Store, G: Generator> ShortenerService<S, G> {
    /// Creates a service with default settings and no background sweep.
    pub fn new(store: S, generator: G) -> Self {
        Self {
            store: Arc::new(store),
            generator: Arc::new(generator),
            settings: ShortenerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ShortenerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Creates a service and spawns its hard-delete sweep.
    ///
    /// Must be called within a tokio runtime. The sweep runs until the
    /// returned handle is shut down or `parent` is cancelled.
    pub fn start(
        store: S,
        generator: G,
        settings: ShortenerSettings,
        parent: &CancellationToken,
    ) -> (Self, LifecycleHandle) {
        let service = Self::new(store, generator).with_settings(settings);
        let handle = LifecycleManager::spawn(
            Arc::clone(&service.store),
            settings.sweep_interval,
            parent.child_token(),
        );
        (service, handle)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn settings(&self) -> &ShortenerSettings {
        &self.settings
    }

    /// Shortens `original_url` for `user_id`.
    ///
    /// If the user already has a live link for this url, fails with
    /// [`ShortenerError::NotUnique`] carrying the existing code.
    pub async fn shorten(&self, user_id: &UserId, original_url: &str) -> Result<ShortCode> {
        validate_url(original_url)?;

        let attempts = self.settings.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let candidate: ShortCode = self.generator.generate().into();

            match self.store.set(user_id, &candidate, original_url).await {
                Ok(code) => {
                    debug!(user_id = %user_id, code = %code, attempt, "shortened url");
                    return Ok(code);
                }
                Err(StoreError::DuplicateCode(code)) if attempt < attempts => {
                    debug!(user_id = %user_id, code = %code, attempt, "short code taken, retrying");
                }
                Err(e @ StoreError::DuplicateCode(_)) => {
                    warn!(user_id = %user_id, attempts, "no free short code");
                    return Err(ShortenerError::CodeExhausted { attempts, last: e });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Shortens every url of `requests` or none of them.
    ///
    /// Responses are in request order. A url the user already shortened fails
    /// the batch with [`ShortenerError::BatchConflict`].
    pub async fn shorten_batch(
        &self,
        user_id: &UserId,
        requests: Vec<BatchRequest>,
    ) -> Result<Vec<BatchResponse>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        for request in &requests {
            validate_url(&request.original_url)?;
        }

        let attempts = self.settings.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let batch: Vec<LinkPair> = requests
                .iter()
                .map(|r| LinkPair::new(self.generator.generate().into(), r.original_url.clone()))
                .collect();
            let candidates: Vec<ShortCode> = batch.iter().map(|p| p.short_url.clone()).collect();

            match self.store.set_batch(user_id, batch).await {
                Ok(stored) => {
                    debug!(user_id = %user_id, size = stored.len(), attempt, "shortened batch");
                    return Ok(requests
                        .into_iter()
                        .zip(stored)
                        .map(|(request, pair)| BatchResponse {
                            correlation_id: request.correlation_id,
                            short_url: pair.short_url,
                        })
                        .collect());
                }
                Err(StoreError::DuplicateCode(code)) if attempt < attempts => {
                    debug!(user_id = %user_id, code = %code, attempt, "batch code taken, retrying");
                }
                Err(e @ StoreError::DuplicateCode(_)) => {
                    warn!(user_id = %user_id, attempts, "no free short codes for batch");
                    return Err(ShortenerError::CodeExhausted { attempts, last: e });
                }
                Err(StoreError::NotUnique {
                    short_url,
                    original_url,
                }) => {
                    let position =
                        conflicting_position(&requests, &candidates, &original_url, &short_url);
                    let correlation_id = position
                        .map(|i| requests[i].correlation_id.clone())
                        .unwrap_or_default();
                    return Err(ShortenerError::BatchConflict(BatchResponse {
                        correlation_id,
                        short_url,
                    }));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Resolves a short code to its original url.
    pub async fn get_url(&self, code: &str) -> Result<String> {
        let code = ShortCode::new(code).map_err(|e| match e {
            StoreError::InvalidData(message) => ShortenerError::InvalidShortCode(message),
            other => other.into(),
        })?;
        Ok(self.store.get(&code).await?)
    }

    pub async fn get_all_urls(&self, user_id: &UserId) -> Result<Vec<LinkPair>> {
        Ok(self.store.get_all_urls(user_id).await?)
    }

    pub async fn ping_store(&self) -> Result<()> {
        Ok(self.store.ping().await?)
    }

    /// Soft-deletes the given links. Pairs that match nothing are ignored.
    pub async fn delete_short_urls(&self, links: Vec<LinkRef>) -> Result<()> {
        if links.is_empty() {
            return Ok(());
        }
        Ok(self.store.delete_short_urls(links).await?)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        Ok(self.store.stats().await?)
    }
}

/// Finds the batch item a url conflict belongs to.
///
/// A conflict with a stored link carries the stored code and belongs to the
/// first item with the url. A repeat within the batch carries the candidate
/// of the first occurrence and belongs to the second one.
fn conflicting_position(
    requests: &[BatchRequest],
    candidates: &[ShortCode],
    original_url: &str,
    short_url: &ShortCode,
) -> Option<usize> {
    let mut positions = requests
        .iter()
        .enumerate()
        .filter(|(_, r)| r.original_url == original_url)
        .map(|(i, _)| i);

    let first = positions.next()?;
    match positions.next() {
        Some(second) if candidates.get(first) == Some(short_url) => Some(second),
        _ => Some(first),
    }
}

/// Accepts absolute URIs only: a scheme is required.
fn validate_url(original_url: &str) -> Result<()> {
    if original_url.is_empty() {
        return Err(ShortenerError::InvalidUrl("URL cannot be empty".to_string()));
    }

    url::Url::parse(original_url)
        .map(|_| ())
        .map_err(|e| ShortenerError::InvalidUrl(format!("{original_url}: {e}")))
}
