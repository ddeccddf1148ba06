//! Interactive username/password login with provider-issued challenges.
//!
//! [`flow::LoginFlow`] holds the pure state machine; [`Authenticator`] drives
//! it against an [`IdentityProvider`] and a [`SecretPrompt`].

pub mod cognito;
pub mod flow;
pub mod prompt;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::aws::CallError;

pub use flow::{InputRequest, LoginFlow, LoginStep, MAX_CHALLENGE_ATTEMPTS};
pub use prompt::{ConsolePrompt, InputKind, PresetPrompt, SecretPrompt};

/// Challenges the login flow knows how to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeKind {
    /// The account must set a new password
    NewPasswordRequired,
    /// One-time code sent by SMS
    SmsMfa,
    /// One-time code from an authenticator app
    SoftwareTokenMfa,
}

impl ChallengeKind {
    /// Parse the provider's challenge name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "NEW_PASSWORD_REQUIRED" => Some(Self::NewPasswordRequired),
            "SMS_MFA" => Some(Self::SmsMfa),
            "SOFTWARE_TOKEN_MFA" => Some(Self::SoftwareTokenMfa),
            _ => None,
        }
    }

    /// Provider challenge name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewPasswordRequired => "NEW_PASSWORD_REQUIRED",
            Self::SmsMfa => "SMS_MFA",
            Self::SoftwareTokenMfa => "SOFTWARE_TOKEN_MFA",
        }
    }

    /// Key the answer is sent under in the challenge responses.
    #[must_use]
    pub fn response_key(self) -> &'static str {
        match self {
            Self::NewPasswordRequired => "NEW_PASSWORD",
            Self::SmsMfa => "SMS_MFA_CODE",
            Self::SoftwareTokenMfa => "SOFTWARE_TOKEN_MFA_CODE",
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tokens issued on successful login.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticationResult {
    /// Identity token; the only one the rest of the crate uses
    pub id_token: String,
    /// Access token for the provider's user APIs
    pub access_token: Option<String>,
    /// Refresh token, when the client is allowed one
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    pub expires_in: Option<u64>,
    /// Usually `Bearer`
    pub token_type: Option<String>,
}

impl AuthenticationResult {
    /// A result carrying only an identity token.
    #[must_use]
    pub fn with_id_token(id_token: impl Into<String>) -> Self {
        Self {
            id_token: id_token.into(),
            access_token: None,
            refresh_token: None,
            expires_in: None,
            token_type: None,
        }
    }
}

impl fmt::Debug for AuthenticationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationResult")
            .field("id_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish_non_exhaustive()
    }
}

/// Successful provider reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderResponse {
    /// Login complete
    Authenticated(AuthenticationResult),
    /// Another challenge must be answered
    Challenge {
        /// Raw challenge name, possibly one we do not support
        name: String,
        /// Opaque provider session to echo back
        session: String,
    },
}

/// Failed provider call.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Wrong credentials, or the answer was refused
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    /// Any other service-level refusal (password policy, code mismatch, ...)
    #[error("{code}: {message}")]
    Rejected {
        /// Service error type
        code: String,
        /// Service-supplied message
        message: String,
    },
    /// The call did not complete
    #[error("transport error: {0}")]
    Transport(String),
    /// The reply could not be understood
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Whether the provider refused the submitted value, as opposed to the
    /// call itself failing.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::NotAuthorized(_) | Self::Rejected { .. })
    }
}

impl From<CallError> for ProviderError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Service { code, message } if code == "NotAuthorizedException" => {
                Self::NotAuthorized(message)
            }
            CallError::Service { code, message } => Self::Rejected { code, message },
            CallError::Transport(e) => Self::Transport(e),
            CallError::Malformed(e) => Self::Malformed(e),
        }
    }
}

/// One challenge submission.
#[derive(Clone)]
pub struct ChallengeAnswer {
    /// Challenge being answered
    pub challenge: ChallengeKind,
    /// Provider session from the challenge being answered
    pub session: String,
    /// `USERNAME` plus the challenge's response key
    pub responses: BTreeMap<String, String>,
}

impl fmt::Debug for ChallengeAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeAnswer")
            .field("challenge", &self.challenge)
            .field("responses", &self.responses.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Identity provider able to run a password login.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Submit username and password.
    async fn initiate_auth(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Answer a challenge.
    async fn respond_to_challenge(
        &self,
        answer: &ChallengeAnswer,
    ) -> Result<ProviderResponse, ProviderError>;
}

/// Terminal login failure.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum LoginError {
    /// Username or password refused at the first step
    #[error("Incorrect username or password")]
    NotAuthorized,
    /// Three rejected answers in one challenge round
    #[error("Too many failed attempts for challenge {0}")]
    ChallengeExhausted(ChallengeKind),
    /// The provider issued a challenge this client cannot answer
    #[error("Unsupported challenge: {0}")]
    UnsupportedChallenge(String),
    /// Provider unreachable or replied with something unusable
    #[error("Identity provider error: {0}")]
    Provider(String),
    /// The secret could not be read from the user
    #[error("Could not read input: {0}")]
    Prompt(String),
    /// The flow was driven out of order
    #[error("Login step out of order: {0}")]
    OutOfOrder(&'static str),
}

/// Drives [`LoginFlow`] against a provider.
pub struct Authenticator<P> {
    provider: P,
}

impl<P: IdentityProvider> Authenticator<P> {
    /// Create a driver for `provider`.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Run a login to completion and return the identity token.
    ///
    /// Each value read from `prompt` is used for exactly one submission and
    /// is dropped afterwards.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        prompt: &mut dyn SecretPrompt,
    ) -> Result<String, LoginError> {
        let mut flow = LoginFlow::new(username);
        info!(username = %username, "Starting login");

        let reply = self.provider.initiate_auth(username, password).await;
        let mut step = flow.on_initial(reply)?;

        loop {
            let request = match step {
                LoginStep::Done(token) => {
                    info!(username = %username, "Login complete");
                    return Ok(token);
                }
                LoginStep::NeedInput(request) => request,
            };

            if let Some(reason) = &request.last_error {
                warn!(
                    challenge = %request.challenge,
                    attempt = request.attempt,
                    reason = %reason,
                    "Challenge answer rejected"
                );
            } else {
                debug!(challenge = %request.challenge, "Challenge issued");
            }

            let value = prompt
                .read(
                    InputKind::for_challenge(request.challenge),
                    request.last_error.as_deref(),
                )
                .map_err(|e| LoginError::Prompt(e.to_string()))?;
            let answer = flow.answer(value)?;
            let reply = self.provider.respond_to_challenge(&answer).await;
            drop(answer);
            step = flow.on_challenge_reply(reply)?;
        }
    }
}

/// Log in with the console prompt for any challenge input.
///
/// `new_password`, when given, answers the first `NEW_PASSWORD_REQUIRED`
/// attempt; later attempts and MFA codes are read from the console.
pub async fn authenticate_interactive<P: IdentityProvider>(
    provider: P,
    username: &str,
    password: &str,
    new_password: Option<String>,
) -> Result<String, LoginError> {
    let mut prompt = PresetPrompt::new(ConsolePrompt::new()).with_new_password(new_password);
    Authenticator::new(provider)
        .authenticate(username, password, &mut prompt)
        .await
}
