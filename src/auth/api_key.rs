//! Opaque API keys for non-interactive callers.
//!
//! Only the SHA-256 digest of a key is ever stored or compared. A presented
//! key is hashed, the record is looked up by that hash, and the caller is
//! admitted only if the record is active and not expired. Permissions and
//! rate limits ride along on the record for the caller to enforce.
//!
//! Keys look like `pw_<43-char URL-safe base64>` (256 bits of entropy). The
//! prefix makes them greppable and detectable by secret scanners.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

/// Prefix of every issued key.
pub const API_KEY_PREFIX: &str = "pw_";

/// Validation failure. Carries no detail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiKeyError {
    /// Unknown, revoked or expired key, or the store could not answer.
    #[error("Unauthorized")]
    Unauthorized,
}

/// Key-metadata store failure.
#[derive(Debug, thiserror::Error)]
#[error("key store error: {0}")]
pub struct StoreError(pub String);

/// Lifecycle status of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    /// Usable
    Active,
    /// Revoked by rotation or by an operator
    Revoked,
}

/// Stored metadata for one API key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    /// Hex SHA-256 of the key
    pub key_hash: String,
    /// Owning user or service
    pub owner: String,
    /// Permissions granted to the key, enforced by the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    /// Hard expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    /// Requests per minute; `None` or `0` means unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
    /// Lifecycle status
    pub status: KeyStatus,
}

impl ApiKeyRecord {
    /// Returns `true` if the record has an expiry at or before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }

    /// Returns `true` if the key may be used at `now`.
    #[must_use]
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == KeyStatus::Active && !self.is_expired_at(now)
    }
}

/// Hash a presented key for lookup.
#[must_use]
pub fn hash_api_key(key: &str) -> String {
    let hash = Sha256::digest(key.as_bytes());
    format!("{hash:x}")
}

/// Generate a fresh random key.
#[must_use]
pub fn generate_api_key() -> String {
    let random_bytes: [u8; 32] = rand::random();
    format!(
        "{API_KEY_PREFIX}{}",
        base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            random_bytes,
        )
    )
}

/// Trait abstracting the key-metadata store.
///
/// Implementations must be `Send + Sync` because the store is shared across
/// request tasks.
#[async_trait]
pub trait ApiKeyStore: Send + Sync + 'static {
    /// Look a record up by key hash.
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, StoreError>;

    /// Insert or replace a record.
    async fn put(&self, record: ApiKeyRecord) -> Result<(), StoreError>;

    /// All records belonging to `owner`.
    async fn list_for_owner(&self, owner: &str) -> Result<Vec<ApiKeyRecord>, StoreError>;
}

/// In-memory key store indexed by hash.
pub struct InMemoryApiKeyStore {
    by_hash: DashMap<String, ApiKeyRecord>,
}

impl InMemoryApiKeyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_hash: DashMap::new(),
        }
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}

impl Default for InMemoryApiKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApiKeyStore for InMemoryApiKeyStore {
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, StoreError> {
        Ok(self.by_hash.get(key_hash).map(|entry| entry.value().clone()))
    }

    async fn put(&self, record: ApiKeyRecord) -> Result<(), StoreError> {
        self.by_hash.insert(record.key_hash.clone(), record);
        Ok(())
    }

    async fn list_for_owner(&self, owner: &str) -> Result<Vec<ApiKeyRecord>, StoreError> {
        Ok(self
            .by_hash
            .iter()
            .filter(|e| e.value().owner == owner)
            .map(|e| e.value().clone())
            .collect())
    }
}

/// Validates presented API keys against the store.
pub struct ApiKeyValidator {
    store: Arc<dyn ApiKeyStore>,
}

impl ApiKeyValidator {
    /// Create a validator over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ApiKeyStore>) -> Self {
        Self { store }
    }

    /// Validate `key` and return its record.
    ///
    /// # Errors
    ///
    /// [`ApiKeyError::Unauthorized`] if the key is unknown, revoked, expired,
    /// or the store fails.
    pub async fn validate(&self, key: &str) -> Result<ApiKeyRecord, ApiKeyError> {
        self.validate_at(key, Utc::now()).await
    }

    /// [`validate`](Self::validate) against an explicit clock.
    pub async fn validate_at(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<ApiKeyRecord, ApiKeyError> {
        let key_hash = hash_api_key(key);
        let record = match self.store.find_by_hash(&key_hash).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("API key not found");
                return Err(ApiKeyError::Unauthorized);
            }
            Err(e) => {
                warn!(error = %e, "API key lookup failed");
                return Err(ApiKeyError::Unauthorized);
            }
        };

        // A store keyed by something other than the hash must not admit a
        // mismatching record.
        if !bool::from(record.key_hash.as_bytes().ct_eq(key_hash.as_bytes())) {
            warn!(owner = %record.owner, "Key store returned a record for another hash");
            return Err(ApiKeyError::Unauthorized);
        }

        if record.status != KeyStatus::Active {
            debug!(owner = %record.owner, "API key revoked");
            return Err(ApiKeyError::Unauthorized);
        }
        if record.is_expired_at(now) {
            debug!(owner = %record.owner, "API key expired");
            return Err(ApiKeyError::Unauthorized);
        }

        Ok(record)
    }
}

/// Options for a newly issued key.
#[derive(Debug, Clone, Default)]
pub struct KeyOptions {
    /// Permissions granted to the key
    pub permissions: Option<Vec<String>>,
    /// Hard expiry
    pub expiry: Option<DateTime<Utc>>,
    /// Requests per minute
    pub rate_limit: Option<u32>,
}

/// A newly issued key. `key` is the only copy of the plaintext.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    /// Plaintext key, shown once
    pub key: String,
    /// Stored record
    pub record: ApiKeyRecord,
}

/// Builds a record for a fresh key without touching any store.
#[must_use]
pub fn new_key(owner: &str, options: KeyOptions) -> IssuedKey {
    let key = generate_api_key();
    let record = ApiKeyRecord {
        key_hash: hash_api_key(&key),
        owner: owner.to_string(),
        permissions: options.permissions,
        expiry: options.expiry,
        rate_limit: options.rate_limit,
        status: KeyStatus::Active,
    };
    IssuedKey { key, record }
}

/// Issues and rotates keys in a store.
pub struct ApiKeyIssuer {
    store: Arc<dyn ApiKeyStore>,
}

impl ApiKeyIssuer {
    /// Create an issuer over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ApiKeyStore>) -> Self {
        Self { store }
    }

    /// Issue an additional key for `owner`.
    pub async fn issue(&self, owner: &str, options: KeyOptions) -> Result<IssuedKey, StoreError> {
        let issued = new_key(owner, options);
        self.store.put(issued.record.clone()).await?;
        info!(owner = %owner, "Issued API key");
        Ok(issued)
    }

    /// Revoke every active key of `owner` and issue a replacement.
    pub async fn rotate(&self, owner: &str, options: KeyOptions) -> Result<IssuedKey, StoreError> {
        let revoked = self.revoke_owner(owner).await?;
        let issued = self.issue(owner, options).await?;
        info!(owner = %owner, revoked, "Rotated API key");
        Ok(issued)
    }

    /// Revoke every active key of `owner`; returns how many were revoked.
    pub async fn revoke_owner(&self, owner: &str) -> Result<usize, StoreError> {
        let mut revoked = 0;
        for mut record in self.store.list_for_owner(owner).await? {
            if record.status == KeyStatus::Active {
                record.status = KeyStatus::Revoked;
                self.store.put(record).await?;
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}
