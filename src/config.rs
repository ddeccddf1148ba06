//! Configuration management

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::auth::VerifierConfig;
use crate::discovery::ClientConfig;
use crate::{Error, Result};

/// Environment variable prefix; `__` separates nesting levels.
pub const ENV_PREFIX: &str = "PENNYWORTH_";

/// Flat variable names from older releases and the keys they set.
const LEGACY_ENV: [(&str, &str); 3] = [
    ("PENNYWORTH_SESSION_DIR", "session.dir"),
    ("PENNYWORTH_SESSION_FILE", "session.file"),
    ("PENNYWORTH_API_URL", "api.url"),
];

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Identity provider / federated identity settings
    pub identity: IdentityConfig,
    /// Gateway API settings (used by the CLI for discovery)
    pub api: ApiConfig,
    /// Local session cache settings
    pub session: SessionConfig,
    /// API boundary settings
    pub gateway: GatewayConfig,
}

/// Identity provider settings.
///
/// Every field is optional here; required-ness depends on the caller. The
/// API boundary needs `region`, `user_pool_id` and `client_id`
/// ([`Config::verifier_config`]); the CLI can discover all of them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IdentityConfig {
    /// Cloud region hosting the user pool
    pub region: Option<String>,
    /// User pool identifier (e.g. `us-west-2_AbCdEf123`)
    pub user_pool_id: Option<String>,
    /// App client id; this is the audience signed tokens must carry
    pub client_id: Option<String>,
    /// Federated identity pool identifier
    pub identity_pool_id: Option<String>,
    /// Override for the public key set URL
    pub jwks_uri: Option<String>,
    /// Override for the identity provider endpoint (tests, private links)
    pub endpoint: Option<String>,
    /// Override for the federated identity broker endpoint
    pub broker_endpoint: Option<String>,
}

impl IdentityConfig {
    /// Returns the fully specified client configuration when every field the
    /// CLI needs is set locally, so discovery can be skipped.
    #[must_use]
    pub fn client_config(&self) -> Option<ClientConfig> {
        Some(ClientConfig {
            user_pool_id: self.user_pool_id.clone()?,
            user_pool_client_id: self.client_id.clone()?,
            identity_pool_id: self.identity_pool_id.clone()?,
            region: self.region.clone()?,
        })
    }
}

/// Gateway API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the versioned API
    pub url: String,
    /// Bound on the client configuration fetch
    pub discovery_timeout_secs: u64,
    /// Bound on every other outbound request
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: "https://api.uproro.com/v1".to_string(),
            discovery_timeout_secs: 5,
            timeout_secs: 15,
        }
    }
}

impl ApiConfig {
    /// Discovery timeout as a [`Duration`]
    #[must_use]
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    /// Request timeout as a [`Duration`]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Local session cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory holding the session file (`~` is expanded)
    pub dir: String,
    /// Session file name
    pub file: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: "~/.pennyworth".to_string(),
            file: "session.json".to_string(),
        }
    }
}

impl SessionConfig {
    /// Full path of the session file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        expand_home(&self.dir).join(&self.file)
    }
}

/// API boundary settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Paths that bypass authentication
    pub public_paths: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            public_paths: vec![
                "/v1/parameters/well-known".to_string(),
                "/v1/version".to_string(),
            ],
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional YAML file and the
    /// environment (`PENNYWORTH_` prefix, `__` nesting).
    ///
    /// The flat names `PENNYWORTH_SESSION_DIR`, `PENNYWORTH_SESSION_FILE`
    /// and `PENNYWORTH_API_URL` are still honoured; a nested variable for the
    /// same key wins over them.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment
            .merge(Env::raw().filter_map(|key| {
                LEGACY_ENV
                    .iter()
                    .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
                    .map(|(_, path)| (*path).into())
            }))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Settings for the signed-token verifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first missing field.
    pub fn verifier_config(&self) -> Result<VerifierConfig> {
        let id = &self.identity;
        let region = id.region.clone().ok_or_else(|| Error::missing("identity.region"))?;
        let user_pool_id = id
            .user_pool_id
            .clone()
            .ok_or_else(|| Error::missing("identity.user_pool_id"))?;
        let audience = id
            .client_id
            .clone()
            .ok_or_else(|| Error::missing("identity.client_id"))?;

        let mut config = VerifierConfig::new(region, user_pool_id, audience)?;
        if let Some(uri) = &id.jwks_uri {
            config = config.with_jwks_uri(uri.clone());
        }
        Ok(config)
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from(path)
}
