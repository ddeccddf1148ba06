//! Get a usable session, logging in only when the cached one is gone.
//!
//! ```text
//! load() -> valid? -> return it
//!   otherwise: resolve client config -> login -> exchange -> save()
//! ```

use std::time::Duration;

use tracing::{info, warn};

use super::{Session, SessionStore};
use crate::config::{Config, IdentityConfig};
use crate::discovery::{ClientConfig, ClientConfigResolver};
use crate::exchange::cognito::CognitoIdentityPool;
use crate::exchange::{CredentialExchange, CredentialsBroker, ExchangeError};
use crate::login::cognito::CognitoUserPool;
use crate::login::{
    Authenticator, IdentityProvider, InputKind, LoginError, PresetPrompt, SecretPrompt,
};

/// Credentials supplied up front; anything missing is prompted for.
#[derive(Debug, Clone, Default)]
pub struct SessionParams {
    /// Login name
    pub username: Option<String>,
    /// Current password
    pub password: Option<String>,
    /// Password to set if the provider demands a change
    pub new_password: Option<String>,
}

/// Why a new session could not be created.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Configuration, discovery or client setup failed
    #[error(transparent)]
    Setup(#[from] crate::Error),
    /// Login failed
    #[error(transparent)]
    Login(#[from] LoginError),
    /// Credential exchange failed
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

/// Session cache plus the clients needed to refill it.
pub struct SessionManager {
    store: SessionStore,
    resolver: ClientConfigResolver,
    identity: IdentityConfig,
    timeout: Duration,
}

impl SessionManager {
    /// Assemble a manager from explicit parts.
    pub fn new(
        store: SessionStore,
        resolver: ClientConfigResolver,
        identity: IdentityConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            resolver,
            identity,
            timeout,
        }
    }

    /// Assemble a manager from the loaded configuration.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        Ok(Self::new(
            SessionStore::new(config.session.path()),
            ClientConfigResolver::from_config(config)?,
            config.identity.clone(),
            config.api.timeout(),
        ))
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Return the cached session if still valid.
    #[must_use]
    pub fn cached(&self) -> Option<Session> {
        self.store.load().filter(|s| !s.is_expired())
    }

    /// Return a valid session, logging in if needed.
    ///
    /// Every failure on the login path is logged and reported as `None`.
    pub async fn get_or_create(
        &self,
        params: SessionParams,
        prompt: &mut dyn SecretPrompt,
    ) -> Option<Session> {
        if let Some(session) = self.cached() {
            info!("Using cached session");
            return Some(session);
        }

        match self.create(params, prompt).await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "Could not create session");
                None
            }
        }
    }

    async fn create(
        &self,
        params: SessionParams,
        prompt: &mut dyn SecretPrompt,
    ) -> Result<Session, SessionError> {
        let client = self.resolver.resolve().await?;
        let provider = self.user_pool(&client).await;
        let exchange = CredentialExchange::new(
            self.identity_pool(&client).await,
            &client.region,
            &client.user_pool_id,
        );
        establish(&self.store, params, prompt, provider, &exchange).await
    }

    async fn user_pool(&self, client: &ClientConfig) -> CognitoUserPool {
        CognitoUserPool::new(
            &client.region,
            self.identity.endpoint.as_deref(),
            &client.user_pool_client_id,
            self.timeout,
        )
        .await
    }

    async fn identity_pool(&self, client: &ClientConfig) -> CognitoIdentityPool {
        CognitoIdentityPool::new(
            &client.region,
            self.identity.broker_endpoint.as_deref(),
            &client.identity_pool_id,
            self.timeout,
        )
        .await
    }
}

/// Log in, exchange the token and persist the new session.
///
/// A failed save is logged; the session is still returned for this run.
pub async fn establish<P, B>(
    store: &SessionStore,
    params: SessionParams,
    prompt: &mut dyn SecretPrompt,
    provider: P,
    exchange: &CredentialExchange<B>,
) -> Result<Session, SessionError>
where
    P: IdentityProvider,
    B: CredentialsBroker,
{
    let username = match params.username {
        Some(u) => u,
        None => read(prompt, InputKind::Username)?,
    };
    let password = match params.password {
        Some(p) => p,
        None => read(prompt, InputKind::Password)?,
    };

    let mut prompt = PresetPrompt::new(prompt).with_new_password(params.new_password);
    let id_token = Authenticator::new(provider)
        .authenticate(&username, &password, &mut prompt)
        .await?;
    drop(password);

    let credentials = exchange.exchange(&id_token).await?;
    let session = Session::new(id_token, credentials);

    if let Err(e) = store.save(&session) {
        warn!(error = %e, "Session not saved; it is valid for this run only");
    }
    Ok(session)
}

fn read(prompt: &mut dyn SecretPrompt, kind: InputKind) -> Result<String, SessionError> {
    prompt
        .read(kind, None)
        .map_err(|e| SessionError::Login(LoginError::Prompt(e.to_string())))
}
