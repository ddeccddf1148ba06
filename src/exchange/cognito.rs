//! Identity pool broker through the federated identity SDK.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_cognitoidentity::Client;
use aws_sdk_cognitoidentity::types::Credentials;
use chrono::{DateTime, Utc};

use super::{CredentialsBroker, IssuedCredentials};
use crate::aws::{self, CallError};

/// Identity pool used to mint credentials for user pool tokens.
#[derive(Debug, Clone)]
pub struct CognitoIdentityPool {
    client: Client,
    identity_pool_id: String,
}

impl CognitoIdentityPool {
    /// Client for `identity_pool_id` in `region`. `endpoint` replaces the
    /// regional service endpoint when set.
    pub async fn new(
        region: &str,
        endpoint: Option<&str>,
        identity_pool_id: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let config = aws::sdk_config(region, endpoint, timeout).await;
        Self::with_client(Client::new(&config), identity_pool_id)
    }

    /// Wrap an already configured SDK client.
    pub fn with_client(client: Client, identity_pool_id: impl Into<String>) -> Self {
        Self {
            client,
            identity_pool_id: identity_pool_id.into(),
        }
    }
}

fn login_map(logins: &BTreeMap<String, String>) -> HashMap<String, String> {
    logins.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

#[async_trait]
impl CredentialsBroker for CognitoIdentityPool {
    async fn resolve_identity(
        &self,
        logins: &BTreeMap<String, String>,
    ) -> Result<String, CallError> {
        let output = self
            .client
            .get_id()
            .identity_pool_id(&self.identity_pool_id)
            .set_logins(Some(login_map(logins)))
            .send()
            .await
            .map_err(|e| aws::call_error(&e))?;
        output
            .identity_id()
            .map(str::to_string)
            .ok_or_else(|| CallError::Malformed("GetId without IdentityId".into()))
    }

    async fn credentials_for_identity(
        &self,
        identity_id: &str,
        logins: &BTreeMap<String, String>,
    ) -> Result<IssuedCredentials, CallError> {
        let output = self
            .client
            .get_credentials_for_identity()
            .identity_id(identity_id)
            .set_logins(Some(login_map(logins)))
            .send()
            .await
            .map_err(|e| aws::call_error(&e))?;
        let credentials = output
            .credentials()
            .ok_or_else(|| CallError::Malformed("response without Credentials".into()))?;
        issued(credentials)
    }
}

fn issued(credentials: &Credentials) -> Result<IssuedCredentials, CallError> {
    let expiration = credentials
        .expiration()
        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
        .ok_or_else(|| CallError::Malformed("credentials without a valid Expiration".into()))?;
    Ok(IssuedCredentials {
        access_key_id: required(credentials.access_key_id(), "AccessKeyId")?,
        secret_key: required(credentials.secret_key(), "SecretKey")?,
        session_token: required(credentials.session_token(), "SessionToken")?,
        expiration,
    })
}

fn required(value: Option<&str>, field: &str) -> Result<String, CallError> {
    value
        .map(str::to_string)
        .ok_or_else(|| CallError::Malformed(format!("credentials without {field}")))
}
