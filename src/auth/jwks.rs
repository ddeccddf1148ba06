//! Public key set (JWKS) cache.
//!
//! # Contract
//!
//! A [`KeySetCache`] is populated at most once and read many times. It never
//! refreshes or invalidates within its lifetime: a key rotation at the
//! identity provider is picked up by the next process (cold start), and a
//! token signed by a key the cache does not hold fails verification.
//!
//! Population is idempotent. Concurrent first callers may each fetch the key
//! set; the first write wins and later fetches are discarded, so every caller
//! observes the same set. No lock is held across the network call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use parking_lot::RwLock;
use tracing::{debug, warn};

/// Default bound on a key set fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Key set fetch failures. Always a dependency failure, never a verdict on
/// the presented token.
#[derive(Debug, thiserror::Error)]
pub enum KeySetError {
    /// Network or HTTP error while fetching.
    #[error("key set fetch failed: {0}")]
    Fetch(String),

    /// The provider answered with something that is not a key set.
    #[error("key set response is not a valid JWKS: {0}")]
    Malformed(String),
}

/// Where a key set comes from.
#[async_trait]
pub trait KeySetSource: Send + Sync + 'static {
    /// Fetch the full key set.
    async fn fetch(&self) -> Result<JwkSet, KeySetError>;
}

/// Fetches the key set over HTTP from the provider's well-known URL.
pub struct HttpKeySetSource {
    http: reqwest::Client,
    url: String,
}

impl HttpKeySetSource {
    /// Create a source for `url` with the default fetch timeout.
    pub fn new(url: impl Into<String>) -> crate::Result<Self> {
        Self::with_timeout(url, DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a source for `url` with an explicit timeout.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        let url = url.into();
        if !url.starts_with("https://") {
            warn!(url = %url, "Key set URL is not HTTPS");
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    async fn fetch(&self) -> Result<JwkSet, KeySetError> {
        debug!(url = %self.url, "Fetching key set");
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| KeySetError::Fetch(e.to_string()))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| KeySetError::Fetch(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| KeySetError::Malformed(e.to_string()))
    }
}

/// A fixed key set, for pinned deployments and tests.
pub struct StaticKeySetSource(JwkSet);

impl StaticKeySetSource {
    /// Wrap an existing key set.
    #[must_use]
    pub fn new(keys: JwkSet) -> Self {
        Self(keys)
    }
}

#[async_trait]
impl KeySetSource for StaticKeySetSource {
    async fn fetch(&self) -> Result<JwkSet, KeySetError> {
        Ok(self.0.clone())
    }
}

/// Populate-once, read-many key set cache.
pub struct KeySetCache {
    source: Arc<dyn KeySetSource>,
    keys: RwLock<Option<Arc<JwkSet>>>,
}

impl KeySetCache {
    /// Create an empty cache that populates itself from `source` on first use.
    #[must_use]
    pub fn new(source: Arc<dyn KeySetSource>) -> Self {
        Self {
            source,
            keys: RwLock::new(None),
        }
    }

    /// Create a cache that is already populated.
    #[must_use]
    pub fn with_keys(keys: JwkSet) -> Self {
        let keys = Arc::new(keys);
        Self {
            source: Arc::new(StaticKeySetSource::new((*keys).clone())),
            keys: RwLock::new(Some(keys)),
        }
    }

    /// Whether the key set has been populated.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.keys.read().is_some()
    }

    /// Return the cached key set, fetching it on first use.
    pub async fn get(&self) -> Result<Arc<JwkSet>, KeySetError> {
        if let Some(keys) = self.keys.read().clone() {
            return Ok(keys);
        }

        let fetched = self.source.fetch().await?;
        debug!(keys = fetched.keys.len(), "Key set fetched");
        Ok(self.populate(fetched))
    }

    /// Store `keys` unless a set is already present; returns the stored set.
    pub fn populate(&self, keys: JwkSet) -> Arc<JwkSet> {
        let mut slot = self.keys.write();
        if let Some(existing) = slot.as_ref() {
            return Arc::clone(existing);
        }
        let keys = Arc::new(keys);
        *slot = Some(Arc::clone(&keys));
        keys
    }
}
