//! Authentication middleware for the Pennyworth API
//!
//! Supports:
//! - Signed identity tokens (interactive users)
//! - API keys with per-owner rate limits (services)
//! - Public paths that bypass authentication
//!
//! Responses never say why a credential was rejected; the reason goes to the
//! audit log.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::debug;

use crate::auth::{
    AuditEvent, AuthFailure, Caller, GatewayAuth, Strategy, audit, bearer_from_header_map,
};

/// Authentication middleware
///
/// On success the admitted [`Caller`] is inserted into the request
/// extensions for downstream handlers.
pub async fn auth_middleware(
    State(auth): State<Arc<GatewayAuth>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if auth.is_public_path(&path) {
        debug!(path = %path, "Public path, skipping auth");
        return next.run(request).await;
    }

    let Some(credential) = bearer_from_header_map(request.headers()) else {
        audit::emit(&AuditEvent::denied(Strategy::None, "missing or malformed header").at(&path));
        return failure_response(&AuthFailure::MissingCredential);
    };

    match auth.authenticate(&credential).await {
        Ok(caller) => {
            debug!(principal = %caller.principal(), path = %path, "Authenticated request");
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        Err(failure) => failure_response(&failure),
    }
}

/// Map a failure to its response. The body is the failure's fixed message.
#[must_use]
pub fn failure_response(failure: &AuthFailure) -> Response {
    let status = match failure {
        AuthFailure::MissingCredential | AuthFailure::InvalidCredential => StatusCode::UNAUTHORIZED,
        AuthFailure::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        AuthFailure::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    };
    let body = Json(json!({ "error": failure.to_string() }));

    match failure {
        AuthFailure::MissingCredential | AuthFailure::InvalidCredential => {
            (status, [("WWW-Authenticate", "Bearer")], body).into_response()
        }
        AuthFailure::RateLimited => (status, [("Retry-After", "60")], body).into_response(),
        AuthFailure::Unavailable => (status, body).into_response(),
    }
}

/// Extract the admitted caller inserted by [`auth_middleware`].
#[must_use]
pub fn caller(request: &Request<Body>) -> Option<&Caller> {
    request.extensions().get::<Caller>()
}
