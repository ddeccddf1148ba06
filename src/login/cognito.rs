//! User pool login through the identity provider SDK.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::Client;
use aws_sdk_cognitoidentityprovider::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_cognitoidentityprovider::operation::initiate_auth::InitiateAuthError;
use aws_sdk_cognitoidentityprovider::operation::respond_to_auth_challenge::RespondToAuthChallengeError;
use aws_sdk_cognitoidentityprovider::types::{
    AuthFlowType, AuthenticationResultType, ChallengeNameType,
};

use super::{
    AuthenticationResult, ChallengeAnswer, IdentityProvider, ProviderError, ProviderResponse,
};
use crate::aws;

/// User pool app client.
#[derive(Debug, Clone)]
pub struct CognitoUserPool {
    client: Client,
    client_id: String,
}

impl CognitoUserPool {
    /// Client for the pool app `client_id` in `region`. `endpoint` replaces
    /// the regional service endpoint when set.
    pub async fn new(
        region: &str,
        endpoint: Option<&str>,
        client_id: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let config = aws::sdk_config(region, endpoint, timeout).await;
        Self::with_client(Client::new(&config), client_id)
    }

    /// Wrap an already configured SDK client.
    pub fn with_client(client: Client, client_id: impl Into<String>) -> Self {
        Self {
            client,
            client_id: client_id.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for CognitoUserPool {
    async fn initiate_auth(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        let output = self
            .client
            .initiate_auth()
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .client_id(&self.client_id)
            .auth_parameters("USERNAME", username)
            .auth_parameters("PASSWORD", password)
            .send()
            .await
            .map_err(|e| provider_error(&e, InitiateAuthError::is_not_authorized_exception))?;
        reply(
            output.authentication_result(),
            output.challenge_name(),
            output.session(),
        )
    }

    async fn respond_to_challenge(
        &self,
        answer: &ChallengeAnswer,
    ) -> Result<ProviderResponse, ProviderError> {
        let responses = answer
            .responses
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let output = self
            .client
            .respond_to_auth_challenge()
            .client_id(&self.client_id)
            .challenge_name(ChallengeNameType::from(answer.challenge.as_str()))
            .session(&answer.session)
            .set_challenge_responses(Some(responses))
            .send()
            .await
            .map_err(|e| {
                provider_error(&e, RespondToAuthChallengeError::is_not_authorized_exception)
            })?;
        reply(
            output.authentication_result(),
            output.challenge_name(),
            output.session(),
        )
    }
}

/// Map an SDK failure, recognising the operation's typed not-authorized error.
fn provider_error<E>(err: &SdkError<E>, not_authorized: fn(&E) -> bool) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match err.as_service_error() {
        Some(service) if not_authorized(service) => {
            ProviderError::NotAuthorized(service.message().unwrap_or_default().to_string())
        }
        _ => aws::call_error(err).into(),
    }
}

fn reply(
    result: Option<&AuthenticationResultType>,
    challenge: Option<&ChallengeNameType>,
    session: Option<&str>,
) -> Result<ProviderResponse, ProviderError> {
    if let Some(result) = result {
        let id_token = result
            .id_token()
            .ok_or_else(|| ProviderError::Malformed("result without IdToken".into()))?;
        return Ok(ProviderResponse::Authenticated(AuthenticationResult {
            id_token: id_token.to_string(),
            access_token: result.access_token().map(str::to_string),
            refresh_token: result.refresh_token().map(str::to_string),
            expires_in: u64::try_from(result.expires_in()).ok().filter(|s| *s > 0),
            token_type: result.token_type().map(str::to_string),
        }));
    }
    match challenge {
        Some(name) => Ok(ProviderResponse::Challenge {
            name: name.as_str().to_string(),
            session: session.unwrap_or_default().to_string(),
        }),
        None => Err(ProviderError::Malformed(
            "neither AuthenticationResult nor ChallengeName".into(),
        )),
    }
}
