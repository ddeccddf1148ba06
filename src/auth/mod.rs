//! Authentication core for the API boundary.
//!
//! Two parallel strategies validate a bearer credential:
//!
//! - **Signed identity token** (interactive users): [`TokenVerifier`]
//! - **Opaque API key** (service-to-service): [`ApiKeyValidator`]
//!
//! The strategy is picked from the credential's shape: a compact token has
//! exactly three non-empty dot-separated segments, anything else is treated
//! as an API key.
//!
//! ```text
//! Request arrives
//!   -> Extract bearer credential          (bearer)
//!   -> Classify: signed token | API key
//!   -> Verify with that strategy only     (verifier | api_key)
//!   -> Rate limit API keys
//!   -> Admit, or reject with one collapsed error
//! ```

pub mod api_key;
pub mod audit;
pub mod bearer;
pub mod jwks;
pub mod verifier;

use std::num::NonZeroU32;
use std::sync::Arc;

use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};

pub use api_key::{ApiKeyError, ApiKeyRecord, ApiKeyStore, ApiKeyValidator, InMemoryApiKeyStore};
pub use audit::{AuditEvent, Strategy};
pub use bearer::{bearer_from_header_map, extract_bearer_token};
pub use jwks::{HttpKeySetSource, KeySetCache, KeySetError, KeySetSource, StaticKeySetSource};
pub use verifier::{IdentityClaims, TokenVerifier, VerifierConfig, VerifyError};

/// A key's limiter together with the quota it was built from.
struct KeyRateLimiter {
    per_minute: NonZeroU32,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl KeyRateLimiter {
    fn new(per_minute: NonZeroU32) -> Self {
        Self {
            per_minute,
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }
}

/// Which strategy a credential belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// Three-part compact signed token
    SignedToken,
    /// Anything else
    ApiKey,
}

/// Classify a bearer credential by shape.
#[must_use]
pub fn classify(credential: &str) -> CredentialKind {
    let mut segments = 0;
    for part in credential.split('.') {
        if part.is_empty() {
            return CredentialKind::ApiKey;
        }
        segments += 1;
    }
    if segments == 3 {
        CredentialKind::SignedToken
    } else {
        CredentialKind::ApiKey
    }
}

/// An admitted caller.
#[derive(Debug, Clone)]
pub enum Caller {
    /// Interactive user with verified claims
    User(IdentityClaims),
    /// Service holding an API key
    Service(ApiKeyRecord),
}

impl Caller {
    /// Token subject or key owner.
    #[must_use]
    pub fn principal(&self) -> &str {
        match self {
            Self::User(claims) => &claims.sub,
            Self::Service(record) => &record.owner,
        }
    }

    /// Strategy that admitted this caller.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        match self {
            Self::User(_) => Strategy::SignedToken,
            Self::Service(_) => Strategy::ApiKey,
        }
    }
}

/// Why a request was not admitted. The `Display` strings are the only text
/// a client ever sees.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthFailure {
    /// No well-formed `Authorization: Bearer` header
    #[error("Missing or invalid Authorization header")]
    MissingCredential,
    /// Credential presented but not accepted
    #[error("Invalid or expired credential")]
    InvalidCredential,
    /// Valid API key over its rate limit
    #[error("Rate limit exceeded")]
    RateLimited,
    /// The identity provider could not be consulted
    #[error("Authentication temporarily unavailable")]
    Unavailable,
}

/// Both strategies plus per-key rate limiting.
pub struct GatewayAuth {
    verifier: Option<Arc<TokenVerifier>>,
    api_keys: Option<Arc<ApiKeyValidator>>,
    rate_limiters: DashMap<String, Arc<KeyRateLimiter>>,
    public_paths: Vec<String>,
}

impl GatewayAuth {
    /// Create with neither strategy enabled; every credential is rejected.
    #[must_use]
    pub fn new() -> Self {
        Self {
            verifier: None,
            api_keys: None,
            rate_limiters: DashMap::new(),
            public_paths: Vec::new(),
        }
    }

    /// Enable the signed-token strategy.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<TokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Enable the API key strategy.
    #[must_use]
    pub fn with_api_keys(mut self, validator: Arc<ApiKeyValidator>) -> Self {
        self.api_keys = Some(validator);
        self
    }

    /// Paths that bypass authentication, along with everything below them.
    #[must_use]
    pub fn with_public_paths(mut self, paths: Vec<String>) -> Self {
        self.public_paths = paths;
        self
    }

    /// Check if a path is public (bypasses auth)
    #[must_use]
    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| {
            let p = p.trim_end_matches('/');
            // prefix only counts at a segment boundary
            path.strip_prefix(p)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }

    /// Authenticate an already-extracted bearer credential.
    pub async fn authenticate(&self, credential: &str) -> Result<Caller, AuthFailure> {
        match classify(credential) {
            CredentialKind::SignedToken => self.authenticate_token(credential).await,
            CredentialKind::ApiKey => self.authenticate_key(credential).await,
        }
    }

    async fn authenticate_token(&self, token: &str) -> Result<Caller, AuthFailure> {
        let Some(verifier) = &self.verifier else {
            audit::emit(&AuditEvent::denied(Strategy::SignedToken, "signed tokens not accepted"));
            return Err(AuthFailure::InvalidCredential);
        };
        match verifier.verify(token).await {
            Ok(claims) => {
                audit::emit(&AuditEvent::accepted(Strategy::SignedToken, &claims.sub));
                Ok(Caller::User(claims))
            }
            Err(VerifyError::InvalidCredential) => {
                audit::emit(&AuditEvent::denied(Strategy::SignedToken, "verification failed"));
                Err(AuthFailure::InvalidCredential)
            }
            Err(VerifyError::KeySetUnavailable(reason)) => {
                audit::emit(&AuditEvent::unavailable(reason));
                Err(AuthFailure::Unavailable)
            }
        }
    }

    async fn authenticate_key(&self, key: &str) -> Result<Caller, AuthFailure> {
        let Some(validator) = &self.api_keys else {
            audit::emit(&AuditEvent::denied(Strategy::ApiKey, "API keys not accepted"));
            return Err(AuthFailure::InvalidCredential);
        };
        let record = validator.validate(key).await.map_err(|_| {
            audit::emit(&AuditEvent::denied(Strategy::ApiKey, "unknown, revoked or expired key"));
            self.rate_limiters.remove(&api_key::hash_api_key(key));
            AuthFailure::InvalidCredential
        })?;

        if !self.check_rate_limit(&record) {
            audit::emit(&AuditEvent::throttled(&record.owner));
            return Err(AuthFailure::RateLimited);
        }

        audit::emit(&AuditEvent::accepted(Strategy::ApiKey, &record.owner));
        Ok(Caller::Service(record))
    }

    /// Check the key's rate limit. Returns true if allowed.
    ///
    /// Each key gets its own limiter, built from the record's `rate_limit`
    /// and rebuilt whenever that value changes. A missing or zero limit is
    /// unlimited.
    #[must_use]
    pub fn check_rate_limit(&self, record: &ApiKeyRecord) -> bool {
        let Some(per_minute) = record.rate_limit.and_then(NonZeroU32::new) else {
            self.rate_limiters.remove(&record.key_hash);
            return true;
        };
        let limiter = {
            let mut entry = self
                .rate_limiters
                .entry(record.key_hash.clone())
                .or_insert_with(|| Arc::new(KeyRateLimiter::new(per_minute)));
            if entry.per_minute != per_minute {
                *entry = Arc::new(KeyRateLimiter::new(per_minute));
            }
            entry.value().clone()
        };
        limiter.limiter.check().is_ok()
    }
}

impl Default for GatewayAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_key::{KeyOptions, new_key};

    #[test]
    fn classify_by_shape() {
        assert_eq!(classify("abc.def.ghi"), CredentialKind::SignedToken);
        assert_eq!(classify("pw_abcdef"), CredentialKind::ApiKey);
        assert_eq!(classify("a.b"), CredentialKind::ApiKey);
        assert_eq!(classify("a..c"), CredentialKind::ApiKey);
        assert_eq!(classify("a.b.c.d"), CredentialKind::ApiKey);
        assert_eq!(classify(""), CredentialKind::ApiKey);
    }

    #[tokio::test]
    async fn no_strategies_rejects_everything() {
        let auth = GatewayAuth::new();
        assert_eq!(
            auth.authenticate("abc.def.ghi").await.unwrap_err(),
            AuthFailure::InvalidCredential
        );
        assert_eq!(
            auth.authenticate("pw_key").await.unwrap_err(),
            AuthFailure::InvalidCredential
        );
    }

    #[tokio::test]
    async fn api_key_rate_limit_applies_per_key() {
        let store = Arc::new(InMemoryApiKeyStore::new());
        let issued = new_key(
            "svc",
            KeyOptions {
                rate_limit: Some(2),
                ..KeyOptions::default()
            },
        );
        store.put(issued.record.clone()).await.unwrap();

        let auth = GatewayAuth::new().with_api_keys(Arc::new(ApiKeyValidator::new(store)));
        assert!(auth.authenticate(&issued.key).await.is_ok());
        assert!(auth.authenticate(&issued.key).await.is_ok());
        assert_eq!(
            auth.authenticate(&issued.key).await.unwrap_err(),
            AuthFailure::RateLimited
        );
    }

    #[test]
    fn changed_rate_limit_takes_effect() {
        let auth = GatewayAuth::new();
        let mut record = new_key(
            "svc",
            KeyOptions {
                rate_limit: Some(1),
                ..KeyOptions::default()
            },
        )
        .record;
        assert!(auth.check_rate_limit(&record));
        assert!(!auth.check_rate_limit(&record));

        // raised limit: a fresh limiter with the new quota
        record.rate_limit = Some(3);
        assert!(auth.check_rate_limit(&record));
        assert!(auth.check_rate_limit(&record));
        assert!(auth.check_rate_limit(&record));
        assert!(!auth.check_rate_limit(&record));

        // limit removed: unthrottled and the limiter is dropped
        record.rate_limit = None;
        assert!(auth.check_rate_limit(&record));
        assert!(auth.rate_limiters.is_empty());
    }

    #[test]
    fn keys_of_one_owner_have_separate_limits() {
        let auth = GatewayAuth::new();
        let options = |limit| KeyOptions {
            rate_limit: Some(limit),
            ..KeyOptions::default()
        };
        let strict = new_key("svc", options(1)).record;
        let generous = new_key("svc", options(5)).record;

        assert!(auth.check_rate_limit(&strict));
        assert!(!auth.check_rate_limit(&strict));
        for _ in 0..5 {
            assert!(auth.check_rate_limit(&generous));
        }
    }

    #[tokio::test]
    async fn rejected_key_drops_its_limiter() {
        let store = Arc::new(InMemoryApiKeyStore::new());
        let issued = new_key(
            "svc",
            KeyOptions {
                rate_limit: Some(5),
                ..KeyOptions::default()
            },
        );
        store.put(issued.record.clone()).await.unwrap();
        let auth =
            GatewayAuth::new().with_api_keys(Arc::new(ApiKeyValidator::new(store.clone())));

        assert!(auth.authenticate(&issued.key).await.is_ok());
        assert_eq!(auth.rate_limiters.len(), 1);

        let mut revoked = issued.record.clone();
        revoked.status = api_key::KeyStatus::Revoked;
        store.put(revoked).await.unwrap();
        assert!(auth.authenticate(&issued.key).await.is_err());
        assert!(auth.rate_limiters.is_empty());
    }

    #[test]
    fn unlimited_records_are_never_throttled() {
        let auth = GatewayAuth::new();
        let record = new_key("svc", KeyOptions::default()).record;
        for _ in 0..100 {
            assert!(auth.check_rate_limit(&record));
        }
    }

    #[test]
    fn public_paths_match_whole_segments() {
        let auth = GatewayAuth::new().with_public_paths(vec![
            "/v1/version".into(),
            "/v1/parameters/".into(),
        ]);
        assert!(auth.is_public_path("/v1/version"));
        assert!(auth.is_public_path("/v1/version/details"));
        assert!(auth.is_public_path("/v1/parameters/well-known"));
        assert!(!auth.is_public_path("/v1/versions-admin"));
        assert!(!auth.is_public_path("/v1/version-admin"));
        assert!(!auth.is_public_path("/v1/parametersx"));
        assert!(!auth.is_public_path("/v1/chat/completions"));
    }
}
