//! Audit logging for authentication decisions at the API boundary.
//!
//! Every event is emitted via `tracing::info!` with a JSON `audit` field so
//! the trail is queryable by any log aggregator. Rejection reasons live here
//! and only here; responses carry a single collapsed error.
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | `auth.accepted` | A credential was verified and the caller admitted |
//! | `auth.denied` | A credential was missing, malformed, invalid or expired |
//! | `auth.throttled` | A valid API key exceeded its rate limit |
//! | `auth.unavailable` | The identity provider's key set could not be fetched |

use serde::Serialize;

/// Which strategy handled the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Opaque API key (service-to-service)
    ApiKey,
    /// Signed identity token (interactive user)
    SignedToken,
    /// No usable credential was presented
    None,
}

/// Structured audit event.
#[derive(Debug, Serialize)]
pub struct AuditEvent {
    /// Event type string (e.g., `"auth.accepted"`).
    pub event: &'static str,
    /// Strategy that handled the credential.
    pub strategy: Strategy,
    /// Token subject or API key owner, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    /// Request path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Internal reason for a denial.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    /// Construct an `auth.accepted` event.
    #[must_use]
    pub fn accepted(strategy: Strategy, principal: impl Into<String>) -> Self {
        Self {
            event: "auth.accepted",
            strategy,
            principal: Some(principal.into()),
            path: None,
            reason: None,
        }
    }

    /// Construct an `auth.denied` event.
    #[must_use]
    pub fn denied(strategy: Strategy, reason: impl Into<String>) -> Self {
        Self {
            event: "auth.denied",
            strategy,
            principal: None,
            path: None,
            reason: Some(reason.into()),
        }
    }

    /// Construct an `auth.throttled` event.
    #[must_use]
    pub fn throttled(principal: impl Into<String>) -> Self {
        Self {
            event: "auth.throttled",
            strategy: Strategy::ApiKey,
            principal: Some(principal.into()),
            path: None,
            reason: None,
        }
    }

    /// Construct an `auth.unavailable` event.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            event: "auth.unavailable",
            strategy: Strategy::SignedToken,
            principal: None,
            path: None,
            reason: Some(reason.into()),
        }
    }

    /// Attach the request path.
    #[must_use]
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Emit an audit event via `tracing::info!` with structured fields.
///
/// ```text
/// INFO pennyworth::auth::audit audit={"event":"auth.denied","strategy":"signed_token",...}
/// ```
pub fn emit(event: &AuditEvent) {
    match serde_json::to_string(event) {
        Ok(ref json) => tracing::info!(audit = %json, "auth audit"),
        Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
    }
}
