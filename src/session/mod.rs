//! Local session cache.
//!
//! A session pairs the identity token with the temporary cloud credentials
//! obtained for it, so repeated CLI invocations do not log in again until
//! the credentials expire.
//!
//! On disk:
//!
//! ```json
//! {
//!   "jwt_token": "eyJ...",
//!   "aws_credentials": {
//!     "AccessKeyId": "ASIA...",
//!     "SecretKey": "...",
//!     "SessionToken": "...",
//!     "Expiration": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```

pub mod manager;
pub mod store;

use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::exchange::IssuedCredentials;

pub use manager::{SessionError, SessionManager, SessionParams};
pub use store::SessionStore;

/// Cached login state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Identity token from the last login
    pub jwt_token: String,
    /// Credentials exchanged for that token
    pub aws_credentials: CloudCredentials,
}

/// Temporary cloud credentials as persisted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudCredentials {
    /// Access key id
    #[serde(rename = "AccessKeyId")]
    pub access_key_id: String,
    /// Secret access key
    #[serde(rename = "SecretKey")]
    pub secret_key: String,
    /// Session token
    #[serde(rename = "SessionToken")]
    pub session_token: String,
    /// ISO-8601 text; kept verbatim so an unreadable value reads as expired
    /// instead of failing the whole load
    #[serde(rename = "Expiration", default)]
    pub expiration: Option<String>,
}

impl fmt::Debug for CloudCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"[REDACTED]")
            .field("session_token", &"[REDACTED]")
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl From<IssuedCredentials> for CloudCredentials {
    fn from(issued: IssuedCredentials) -> Self {
        Self {
            access_key_id: issued.access_key_id,
            secret_key: issued.secret_key,
            session_token: issued.session_token,
            expiration: Some(issued.expiration.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}

impl Session {
    /// Build a session from a fresh login.
    #[must_use]
    pub fn new(jwt_token: String, credentials: IssuedCredentials) -> Self {
        Self {
            jwt_token,
            aws_credentials: credentials.into(),
        }
    }

    /// Parsed credential expiry, if readable.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.aws_credentials
            .expiration
            .as_deref()
            .and_then(parse_timestamp)
    }

    /// Whether the session must be replaced.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// True unless the expiry parses and is strictly after `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_none_or(|expires| expires <= now)
    }
}

/// Parse RFC 3339, or ISO-8601 without an offset (taken as UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
