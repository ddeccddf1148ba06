//! Signed identity token verification.
//!
//! # Verification flow
//!
//! 1. Get the provider's key set from the [`KeySetCache`] (fetched once per
//!    process). A fetch failure is [`VerifyError::KeySetUnavailable`].
//! 2. Decode the token header (no verification) to read `kid`.
//! 3. Look `kid` up in the cached set. An unknown `kid` fails closed; the
//!    cache is never refreshed and no other key is tried.
//! 4. Verify the signature with the algorithm the matched key declares, then
//!    `exp`, `iss` (built from region + user pool) and `aud`.
//!
//! Every failure in steps 2-4 collapses to [`VerifyError::InvalidCredential`].
//! The specific reason is logged at `debug` and never returned.

use std::sync::Arc;

use jsonwebtoken::{
    Algorithm, DecodingKey, Validation,
    jwk::{Jwk, KeyAlgorithm},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::jwks::{HttpKeySetSource, KeySetCache};
use crate::{Error, Result};

/// Outward-facing verification errors.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// The token is invalid or expired. Deliberately carries no detail.
    #[error("Invalid or expired credential")]
    InvalidCredential,

    /// The identity provider's key set could not be obtained.
    #[error("Identity provider key set unavailable: {0}")]
    KeySetUnavailable(String),
}

/// Internal rejection reasons; logged, never returned.
#[derive(Debug, thiserror::Error)]
enum RejectReason {
    #[error("malformed token header: {0}")]
    Header(jsonwebtoken::errors::Error),
    #[error("token header has no kid")]
    MissingKeyId,
    #[error("kid {0} not in key set")]
    UnknownKeyId(String),
    #[error("key {0} declares no supported asymmetric algorithm")]
    UnsupportedKeyAlgorithm(String),
    #[error("key {0} is not a usable verification key: {1}")]
    BadKey(String, jsonwebtoken::errors::Error),
    #[error("{0}")]
    Claims(jsonwebtoken::errors::Error),
}

/// Verifier settings. All three identity fields are required; construction
/// fails with a configuration error otherwise.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    region: String,
    user_pool_id: String,
    audience: String,
    jwks_uri: Option<String>,
}

impl VerifierConfig {
    /// Create a verifier configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if any field is empty.
    pub fn new(
        region: impl Into<String>,
        user_pool_id: impl Into<String>,
        audience: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            region: region.into().trim().to_string(),
            user_pool_id: user_pool_id.into().trim().to_string(),
            audience: audience.into().trim().to_string(),
            jwks_uri: None,
        };
        if config.region.is_empty() {
            return Err(Error::missing("identity.region"));
        }
        if config.user_pool_id.is_empty() {
            return Err(Error::missing("identity.user_pool_id"));
        }
        if config.audience.is_empty() {
            return Err(Error::missing("identity.client_id"));
        }
        Ok(config)
    }

    /// Override the key set URL.
    #[must_use]
    pub fn with_jwks_uri(mut self, uri: impl Into<String>) -> Self {
        self.jwks_uri = Some(uri.into());
        self
    }

    /// Expected `iss` claim.
    #[must_use]
    pub fn issuer(&self) -> String {
        format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            self.region, self.user_pool_id
        )
    }

    /// Expected `aud` claim.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Key set URL (override, or the issuer's well-known path).
    #[must_use]
    pub fn jwks_uri(&self) -> String {
        self.jwks_uri
            .clone()
            .unwrap_or_else(|| format!("{}/.well-known/jwks.json", self.issuer()))
    }
}

/// Claims of a verified identity token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject (opaque user id)
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Audience (string or array)
    #[serde(default)]
    pub aud: serde_json::Value,
    /// Expiry (Unix seconds)
    pub exp: i64,
    /// Issued-at (Unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// `id` or `access`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_use: Option<String>,
    /// User name in the pool
    #[serde(
        default,
        rename = "cognito:username",
        skip_serializing_if = "Option::is_none"
    )]
    pub username: Option<String>,
    /// Email address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Group memberships
    #[serde(default, rename = "cognito:groups", skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    /// Every other claim, verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Verifies signed identity tokens against a cached key set.
pub struct TokenVerifier {
    config: VerifierConfig,
    keys: Arc<KeySetCache>,
}

impl TokenVerifier {
    /// Create a verifier that fetches the key set over HTTP on first use.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(config: VerifierConfig) -> Result<Self> {
        let source = Arc::new(HttpKeySetSource::new(config.jwks_uri())?);
        Ok(Self::with_cache(config, Arc::new(KeySetCache::new(source))))
    }

    /// Create a verifier over an existing key set cache.
    #[must_use]
    pub fn with_cache(config: VerifierConfig, keys: Arc<KeySetCache>) -> Self {
        Self { config, keys }
    }

    /// Verifier settings.
    #[must_use]
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify `token` and return its claims.
    ///
    /// # Errors
    ///
    /// [`VerifyError::KeySetUnavailable`] when the key set cannot be fetched;
    /// [`VerifyError::InvalidCredential`] for every other failure.
    pub async fn verify(&self, token: &str) -> std::result::Result<IdentityClaims, VerifyError> {
        let keys = self.keys.get().await.map_err(|e| {
            warn!(error = %e, "Key set unavailable");
            VerifyError::KeySetUnavailable(e.to_string())
        })?;

        self.check(token, |kid| keys.find(kid).cloned()).map_err(|reason| {
            debug!(reason = %reason, "Signed token rejected");
            VerifyError::InvalidCredential
        })
    }

    fn check(
        &self,
        token: &str,
        lookup: impl Fn(&str) -> Option<Jwk>,
    ) -> std::result::Result<IdentityClaims, RejectReason> {
        let header = jsonwebtoken::decode_header(token).map_err(RejectReason::Header)?;
        let kid = header.kid.ok_or(RejectReason::MissingKeyId)?;
        let jwk = lookup(&kid).ok_or_else(|| RejectReason::UnknownKeyId(kid.clone()))?;

        let alg = jwk
            .common
            .key_algorithm
            .as_ref()
            .and_then(verification_algorithm)
            .ok_or_else(|| RejectReason::UnsupportedKeyAlgorithm(kid.clone()))?;
        let key = DecodingKey::from_jwk(&jwk).map_err(|e| RejectReason::BadKey(kid.clone(), e))?;

        let validation = self.validation(alg);
        jsonwebtoken::decode::<IdentityClaims>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(RejectReason::Claims)
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut v = Validation::new(alg);
        // expiry is exact; no grace period past `exp`
        v.leeway = 0;
        v.set_issuer(&[self.config.issuer()]);
        v.set_audience(&[self.config.audience()]);
        v.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        v
    }
}

/// Map a key's declared algorithm to a verification algorithm.
///
/// Symmetric algorithms are refused: a key set is public, so an HMAC key in
/// it would let anyone mint tokens.
fn verification_algorithm(alg: &KeyAlgorithm) -> Option<Algorithm> {
    match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}
