//! Pennyworth Library
//!
//! Authentication core for the Pennyworth API and its CLI.
//!
//! # Features
//!
//! - **Bearer extraction**: strict `Authorization: Bearer <token>` parsing
//! - **Signed tokens**: identity token verification against the provider's
//!   published key set, cached once per process
//! - **API keys**: hash-only lookup, expiry and revocation, per-owner rate limits
//! - **Interactive login**: password login with new-password and MFA challenges
//! - **Credential exchange**: identity token to temporary cloud credentials
//! - **Session cache**: one local file reused until the credentials expire

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod aws;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod exchange;
pub mod gateway;
pub mod login;
pub mod session;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// Logs go to stderr; stdout carries command output only.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    }
    .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
