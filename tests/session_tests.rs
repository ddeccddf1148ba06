//! Session cache tests: persistence, expiry and the get-or-create path.

mod common;

use std::fs;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;

use common::*;
use pennyworth::config::IdentityConfig;
use pennyworth::discovery::ClientConfigResolver;
use pennyworth::exchange::{CredentialExchange, ExchangeError};
use pennyworth::session::manager::establish;
use pennyworth::session::{
    CloudCredentials, Session, SessionError, SessionManager, SessionParams, SessionStore,
};

fn session_expiring(expiration: Option<String>) -> Session {
    Session {
        jwt_token: "eyJhbGciOiJFUzI1NiJ9.eyJzdWIiOiJhbGljZSJ9.c2ln".into(),
        aws_credentials: CloudCredentials {
            access_key_id: "ASIATESTKEY".into(),
            secret_key: "test-secret".into(),
            session_token: "test-session-token".into(),
            expiration,
        },
    }
}

fn params(username: &str, password: &str) -> SessionParams {
    SessionParams {
        username: Some(username.into()),
        password: Some(password.into()),
        new_password: None,
    }
}

/// Manager whose discovery endpoint cannot answer
fn offline_manager(store: SessionStore) -> SessionManager {
    let resolver =
        ClientConfigResolver::new("http://127.0.0.1:9/v1", StdDuration::from_millis(200), None)
            .unwrap();
    SessionManager::new(
        store,
        resolver,
        IdentityConfig::default(),
        StdDuration::from_secs(1),
    )
}

#[test]
fn test_round_trip_preserves_token_and_instant() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("session.json"));
    let expires = Utc::now() + Duration::hours(1);
    let session = Session::new(
        "header.payload.signature".into(),
        pennyworth::exchange::IssuedCredentials {
            access_key_id: "ASIA".into(),
            secret_key: "s".into(),
            session_token: "t".into(),
            expiration: expires,
        },
    );

    store.save(&session).unwrap();
    let loaded = store.load().unwrap();

    assert_eq!(loaded.jwt_token, session.jwt_token);
    assert_eq!(loaded.aws_credentials, session.aws_credentials);
    assert_eq!(loaded.expires_at().unwrap().timestamp(), expires.timestamp());

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
    assert!(raw["aws_credentials"]["Expiration"].is_string());
}

#[test]
fn test_expiry_is_fail_safe() {
    assert!(session_expiring(None).is_expired());
    assert!(session_expiring(Some("not a date".into())).is_expired());
    assert!(session_expiring(Some("2001-02-30T00:00:00Z".into())).is_expired());
    assert!(session_expiring(Some((Utc::now() - Duration::seconds(1)).to_rfc3339())).is_expired());
    assert!(!session_expiring(Some((Utc::now() + Duration::hours(1)).to_rfc3339())).is_expired());
}

#[tokio::test]
async fn test_establish_logs_in_exchanges_and_saves() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join(".pennyworth/session.json"));
    let provider = StubProvider::new(vec![tokens("id.token.value")]);
    let broker = StubBroker::issuing_until(Utc::now() + Duration::hours(1));
    let exchange = CredentialExchange::new(broker.clone(), REGION, USER_POOL_ID);
    let mut prompt = ScriptedPrompt::default();

    let session = establish(&store, params("alice", "pw"), &mut prompt, provider, &exchange)
        .await
        .unwrap();

    assert_eq!(session.jwt_token, "id.token.value");
    assert_eq!(session.aws_credentials.access_key_id, "ASIATESTKEY");
    assert_eq!(store.load(), Some(session));

    let logins = broker.logins.lock();
    assert_eq!(
        logins[0][&format!("cognito-idp.{REGION}.amazonaws.com/{USER_POOL_ID}")],
        "id.token.value"
    );
}

#[tokio::test]
async fn test_establish_prompts_for_missing_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("session.json"));
    let provider = StubProvider::new(vec![tokens("id.token.value")]);
    let exchange = CredentialExchange::new(
        StubBroker::issuing_until(Utc::now() + Duration::hours(1)),
        REGION,
        USER_POOL_ID,
    );
    let mut prompt = ScriptedPrompt::new(&["bob", "hunter2"]);

    establish(&store, SessionParams::default(), &mut prompt, provider.clone(), &exchange)
        .await
        .unwrap();

    assert_eq!(
        provider.initiations.lock()[0],
        ("bob".to_string(), "hunter2".to_string())
    );
}

#[tokio::test]
async fn test_failed_exchange_saves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("session.json"));
    let provider = StubProvider::new(vec![tokens("id.token.value")]);
    let exchange = CredentialExchange::new(StubBroker::failing(), REGION, USER_POOL_ID);
    let mut prompt = ScriptedPrompt::default();

    let err = establish(&store, params("alice", "pw"), &mut prompt, provider, &exchange)
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Exchange(ExchangeError::Failed)));
    assert!(!err.to_string().contains("Issuer"));
    assert_eq!(store.load(), None);
}

#[tokio::test]
async fn test_save_failure_still_returns_session() {
    let dir = tempfile::tempdir().unwrap();
    // parent "directory" is a regular file
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "").unwrap();
    let store = SessionStore::new(blocker.join("session.json"));

    let provider = StubProvider::new(vec![tokens("id.token.value")]);
    let exchange = CredentialExchange::new(
        StubBroker::issuing_until(Utc::now() + Duration::hours(1)),
        REGION,
        USER_POOL_ID,
    );
    let mut prompt = ScriptedPrompt::default();

    let session = establish(&store, params("alice", "pw"), &mut prompt, provider, &exchange)
        .await
        .unwrap();
    assert_eq!(session.jwt_token, "id.token.value");
    assert_eq!(store.load(), None);
}

#[tokio::test]
async fn test_valid_cached_session_skips_login() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("session.json"));
    let cached = session_expiring(Some((Utc::now() + Duration::hours(1)).to_rfc3339()));
    store.save(&cached).unwrap();

    let manager = offline_manager(store);
    let mut prompt = ScriptedPrompt::default();
    let session = manager
        .get_or_create(SessionParams::default(), &mut prompt)
        .await;

    assert_eq!(session, Some(cached));
    assert!(prompt.asked.is_empty());
}

#[tokio::test]
async fn test_expired_session_with_unreachable_upstream_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("session.json"));
    store
        .save(&session_expiring(Some("2000-01-01T00:00:00Z".into())))
        .unwrap();

    let manager = offline_manager(store);
    let mut prompt = ScriptedPrompt::default();
    let session = manager
        .get_or_create(params("alice", "pw"), &mut prompt)
        .await;

    assert_eq!(session, None);
}

#[tokio::test]
async fn test_corrupt_session_file_is_treated_as_absent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    fs::write(&path, "{\"jwt_token\": ").unwrap();

    let manager = offline_manager(SessionStore::new(path));
    assert_eq!(manager.cached(), None);
}
