//! Client configuration discovery.
//!
//! The API publishes the identity settings a client needs at
//! `{api_url}/parameters/well-known`, so a CLI can log in with nothing
//! configured locally.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use crate::config::Config;
use crate::{Error, Result};

const WELL_KNOWN_PATH: &str = "parameters/well-known";

fn default_region() -> String {
    "us-west-2".to_string()
}

/// Identity settings a login client needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// User pool identifier
    #[serde(rename = "UserPoolId")]
    pub user_pool_id: String,
    /// App client id of the user pool
    #[serde(rename = "UserPoolClientId")]
    pub user_pool_client_id: String,
    /// Federated identity pool identifier
    #[serde(rename = "IdentityPoolId")]
    pub identity_pool_id: String,
    /// Region of both pools
    #[serde(rename = "Region", alias = "region", default = "default_region")]
    pub region: String,
}

/// Resolves [`ClientConfig`] once per process.
///
/// Local settings win; the well-known document is fetched only when they
/// are incomplete, and at most once.
pub struct ClientConfigResolver {
    http: Client,
    url: Url,
    local: Option<ClientConfig>,
    resolved: OnceCell<ClientConfig>,
}

impl ClientConfigResolver {
    /// Create a resolver for `api_url` with a bounded fetch timeout.
    pub fn new(api_url: &str, timeout: Duration, local: Option<ClientConfig>) -> Result<Self> {
        let url = well_known_url(api_url)?;
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url,
            local,
            resolved: OnceCell::new(),
        })
    }

    /// Create a resolver from the loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.api.url,
            config.api.discovery_timeout(),
            config.identity.client_config(),
        )
    }

    /// URL of the well-known document.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Return the client configuration, fetching it on first use.
    ///
    /// # Errors
    ///
    /// [`Error::UpstreamUnreachable`] when the document cannot be fetched in
    /// time or the API answers with an error status.
    pub async fn resolve(&self) -> Result<ClientConfig> {
        if let Some(local) = &self.local {
            return Ok(local.clone());
        }
        self.resolved
            .get_or_try_init(|| self.fetch())
            .await
            .cloned()
    }

    async fn fetch(&self) -> Result<ClientConfig> {
        debug!(url = %self.url, "Fetching client configuration");

        let response = self
            .http
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| Error::UpstreamUnreachable(format!("{}: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamUnreachable(format!(
                "{}: HTTP {status}",
                self.url
            )));
        }

        let config: ClientConfig = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Invalid client configuration: {e}")))?;

        info!(region = %config.region, user_pool = %config.user_pool_id, "Discovered client configuration");
        Ok(config)
    }
}

fn well_known_url(api_url: &str) -> Result<Url> {
    let mut base = api_url.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base)
        .and_then(|u| u.join(WELL_KNOWN_PATH))
        .map_err(|e| Error::Config(format!("invalid api.url `{api_url}`: {e}")))
}
