//! Shared test helpers: signing keys, token minting and scripted
//! collaborators for the login and exchange flows.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use rcgen::KeyPair;
use serde_json::{Value, json};

use pennyworth::auth::{KeySetCache, TokenVerifier, VerifierConfig};
use pennyworth::aws::CallError;
use pennyworth::exchange::{CredentialsBroker, IssuedCredentials};
use pennyworth::login::{
    AuthenticationResult, ChallengeAnswer, IdentityProvider, InputKind, ProviderError,
    ProviderResponse, SecretPrompt,
};

pub const REGION: &str = "us-west-2";
pub const USER_POOL_ID: &str = "us-west-2_TestPool";
pub const CLIENT_ID: &str = "test-client-id";

pub fn issuer() -> String {
    format!("https://cognito-idp.{REGION}.amazonaws.com/{USER_POOL_ID}")
}

pub fn verifier_config() -> VerifierConfig {
    VerifierConfig::new(REGION, USER_POOL_ID, CLIENT_ID).unwrap()
}

/// An ES256 signing key with a key id.
pub struct SigningKey {
    pub kid: String,
    key_pair: KeyPair,
}

impl SigningKey {
    pub fn generate(kid: &str) -> Self {
        Self {
            kid: kid.to_string(),
            key_pair: KeyPair::generate().unwrap(),
        }
    }

    /// Public JWK for this key.
    pub fn jwk(&self) -> Value {
        // uncompressed point: 0x04 || X || Y
        let raw = self.key_pair.public_key_raw();
        let (x, y) = raw[1..].split_at(32);
        json!({
            "kty": "EC",
            "crv": "P-256",
            "x": URL_SAFE_NO_PAD.encode(x),
            "y": URL_SAFE_NO_PAD.encode(y),
            "kid": self.kid,
            "alg": "ES256",
            "use": "sig",
        })
    }

    /// Sign `claims` with this key, putting `kid` in the header.
    pub fn sign(&self, claims: &Value) -> String {
        self.sign_with_kid(claims, Some(&self.kid))
    }

    pub fn sign_with_kid(&self, claims: &Value, kid: Option<&str>) -> String {
        let mut header = Header::new(Algorithm::ES256);
        header.kid = kid.map(str::to_string);
        let key = EncodingKey::from_ec_pem(self.key_pair.serialize_pem().as_bytes()).unwrap();
        jsonwebtoken::encode(&header, claims, &key).unwrap()
    }
}

pub fn jwk_set(keys: &[&SigningKey]) -> JwkSet {
    let keys: Vec<Value> = keys.iter().map(|k| k.jwk()).collect();
    serde_json::from_value(json!({ "keys": keys })).unwrap()
}

/// Verifier whose key cache is already populated with `keys`.
pub fn verifier_with(keys: &[&SigningKey]) -> TokenVerifier {
    TokenVerifier::with_cache(
        verifier_config(),
        Arc::new(KeySetCache::with_keys(jwk_set(keys))),
    )
}

/// Claims valid in every respect, expiring at `now + expires_in`.
pub fn claims_expiring_in(expires_in: Duration) -> Value {
    let now = Utc::now();
    json!({
        "sub": "a1b2c3d4-user",
        "iss": issuer(),
        "aud": CLIENT_ID,
        "exp": (now + expires_in).timestamp(),
        "iat": now.timestamp(),
        "token_use": "id",
        "cognito:username": "alice",
        "email": "alice@example.com",
        "cognito:groups": ["admins"],
    })
}

pub fn valid_claims() -> Value {
    claims_expiring_in(Duration::hours(1))
}

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

pub fn tokens(id_token: &str) -> Result<ProviderResponse, ProviderError> {
    Ok(ProviderResponse::Authenticated(
        AuthenticationResult::with_id_token(id_token),
    ))
}

pub fn challenge(name: &str, session: &str) -> Result<ProviderResponse, ProviderError> {
    Ok(ProviderResponse::Challenge {
        name: name.to_string(),
        session: session.to_string(),
    })
}

pub fn rejected(code: &str) -> Result<ProviderResponse, ProviderError> {
    Err(ProviderError::Rejected {
        code: code.to_string(),
        message: format!("{code} from stub"),
    })
}

pub fn not_authorized() -> Result<ProviderResponse, ProviderError> {
    Err(ProviderError::NotAuthorized(
        "Incorrect username or password.".into(),
    ))
}

/// Identity provider that replays scripted replies and records every call.
#[derive(Clone, Default)]
pub struct StubProvider {
    replies: Arc<Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>>,
    pub initiations: Arc<Mutex<Vec<(String, String)>>>,
    pub answers: Arc<Mutex<Vec<ChallengeAnswer>>>,
}

impl StubProvider {
    pub fn new(replies: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            ..Self::default()
        }
    }

    pub fn answer_count(&self) -> usize {
        self.answers.lock().len()
    }

    fn next(&self) -> Result<ProviderResponse, ProviderError> {
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Malformed("script exhausted".into())))
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    async fn initiate_auth(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        self.initiations
            .lock()
            .push((username.to_string(), password.to_string()));
        self.next()
    }

    async fn respond_to_challenge(
        &self,
        answer: &ChallengeAnswer,
    ) -> Result<ProviderResponse, ProviderError> {
        self.answers.lock().push(answer.clone());
        self.next()
    }
}

/// Prompt answering from a fixed list and recording what was asked.
#[derive(Default)]
pub struct ScriptedPrompt {
    values: VecDeque<String>,
    pub asked: Vec<(InputKind, Option<String>)>,
}

impl ScriptedPrompt {
    pub fn new(values: &[&str]) -> Self {
        Self {
            values: values.iter().map(|v| (*v).to_string()).collect(),
            asked: Vec::new(),
        }
    }
}

impl SecretPrompt for ScriptedPrompt {
    fn read(&mut self, kind: InputKind, previous_error: Option<&str>) -> io::Result<String> {
        self.asked.push((kind, previous_error.map(str::to_string)));
        self.values
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted input"))
    }
}

/// Broker that issues fixed credentials, or fails every call.
#[derive(Clone)]
pub struct StubBroker {
    pub expiration: DateTime<Utc>,
    pub fail: bool,
    pub logins: Arc<Mutex<Vec<BTreeMap<String, String>>>>,
}

impl StubBroker {
    pub fn issuing_until(expiration: DateTime<Utc>) -> Self {
        Self {
            expiration,
            fail: false,
            logins: Arc::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::issuing_until(Utc::now())
        }
    }
}

#[async_trait]
impl CredentialsBroker for StubBroker {
    async fn resolve_identity(
        &self,
        logins: &BTreeMap<String, String>,
    ) -> Result<String, CallError> {
        self.logins.lock().push(logins.clone());
        if self.fail {
            return Err(CallError::Service {
                code: "NotAuthorizedException".into(),
                message: "Invalid login token. Issuer doesn't match providerName".into(),
            });
        }
        Ok("us-west-2:00000000-identity".into())
    }

    async fn credentials_for_identity(
        &self,
        _identity_id: &str,
        logins: &BTreeMap<String, String>,
    ) -> Result<IssuedCredentials, CallError> {
        self.logins.lock().push(logins.clone());
        Ok(IssuedCredentials {
            access_key_id: "ASIATESTKEY".into(),
            secret_key: "test-secret".into(),
            session_token: "test-session-token".into(),
            expiration: self.expiration,
        })
    }
}
