//! API boundary wiring.
//!
//! The route table lives with the hosting service; this module only supplies
//! the authentication layer it wraps its protected routes in.

pub mod auth;

use std::sync::Arc;

use axum::{Router, middleware};

use crate::auth::{
    ApiKeyStore, ApiKeyValidator, GatewayAuth, TokenVerifier, VerifierConfig,
};
use crate::config::Config;
use crate::Result;

pub use auth::{auth_middleware, caller, failure_response};

/// Build the boundary authenticator from configuration.
///
/// # Errors
///
/// Returns a configuration error when the identity settings the verifier
/// needs are missing, so a misconfigured gateway fails at startup rather
/// than rejecting every request.
pub fn build_auth(config: &Config, api_keys: Arc<dyn ApiKeyStore>) -> Result<GatewayAuth> {
    let verifier_config: VerifierConfig = config.verifier_config()?;
    Ok(GatewayAuth::new()
        .with_verifier(Arc::new(TokenVerifier::new(verifier_config)?))
        .with_api_keys(Arc::new(ApiKeyValidator::new(api_keys)))
        .with_public_paths(config.gateway.public_paths.clone()))
}

/// Wrap `router` in the authentication layer.
pub fn protect(router: Router, auth: Arc<GatewayAuth>) -> Router {
    router.layer(middleware::from_fn_with_state(auth, auth_middleware))
}
