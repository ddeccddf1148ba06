//! Trade a verified identity token for temporary cloud credentials.
//!
//! Two broker calls: resolve an identity handle for the token, then fetch
//! credentials for that handle. Both present the same login map, keyed by
//! the issuing user pool.

pub mod cognito;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::aws::CallError;

/// Temporary credentials issued by the broker.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCredentials {
    /// Access key id
    pub access_key_id: String,
    /// Secret access key
    pub secret_key: String,
    /// Session token that must accompany the key pair
    pub session_token: String,
    /// When the credentials stop working
    pub expiration: DateTime<Utc>,
}

impl fmt::Debug for IssuedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"[REDACTED]")
            .field("session_token", &"[REDACTED]")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Federated identity broker.
#[async_trait]
pub trait CredentialsBroker: Send + Sync {
    /// Resolve the opaque identity handle for the presented logins.
    async fn resolve_identity(
        &self,
        logins: &BTreeMap<String, String>,
    ) -> Result<String, CallError>;

    /// Fetch temporary credentials for `identity_id`.
    async fn credentials_for_identity(
        &self,
        identity_id: &str,
        logins: &BTreeMap<String, String>,
    ) -> Result<IssuedCredentials, CallError>;
}

/// The only error callers ever see from an exchange.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ExchangeError {
    /// Either broker step failed; the cause is in the logs
    #[error("could not obtain credentials for this identity")]
    Failed,
}

/// Key of the login map entry for a user pool.
#[must_use]
pub fn login_provider(region: &str, user_pool_id: &str) -> String {
    format!("cognito-idp.{region}.amazonaws.com/{user_pool_id}")
}

/// Runs the two-step exchange against a broker.
pub struct CredentialExchange<B> {
    broker: B,
    provider_name: String,
}

impl<B: CredentialsBroker> CredentialExchange<B> {
    /// Exchange tokens issued by the user pool `user_pool_id` in `region`.
    pub fn new(broker: B, region: &str, user_pool_id: &str) -> Self {
        Self {
            broker,
            provider_name: login_provider(region, user_pool_id),
        }
    }

    /// Exchange `id_token` for credentials.
    ///
    /// Broker failures are logged with their cause and reported as
    /// [`ExchangeError::Failed`].
    pub async fn exchange(&self, id_token: &str) -> Result<IssuedCredentials, ExchangeError> {
        let logins = BTreeMap::from([(self.provider_name.clone(), id_token.to_string())]);

        let identity_id = self.broker.resolve_identity(&logins).await.map_err(|e| {
            warn!(error = %e, step = "resolve_identity", "Credential exchange failed");
            ExchangeError::Failed
        })?;
        debug!(identity_id = %identity_id, "Resolved identity");

        let credentials = self
            .broker
            .credentials_for_identity(&identity_id, &logins)
            .await
            .map_err(|e| {
                warn!(error = %e, step = "credentials_for_identity", "Credential exchange failed");
                ExchangeError::Failed
            })?;
        debug!(expiration = %credentials.expiration, "Obtained temporary credentials");
        Ok(credentials)
    }
}
