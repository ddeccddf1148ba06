//! Pennyworth CLI
//!
//! Session management for interactive users, token verification and API
//! key issuance for operators.

use std::process::ExitCode;

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::Parser;
use tracing::{debug, error};

use pennyworth::{
    auth::{TokenVerifier, VerifierConfig, VerifyError, api_key},
    cli::{Cli, Command, KeyCommand, SessionArgs},
    config::Config,
    discovery::ClientConfigResolver,
    login::ConsolePrompt,
    session::{SessionManager, SessionParams},
    setup_tracing,
};

/// Exit code for configuration and setup errors.
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::from(EXIT_CONFIG);
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    debug!(?config, "Loaded configuration");

    match cli.command {
        Some(Command::Session(args)) => run_session(&config, args).await,
        None => run_session(&config, SessionArgs::default()).await,
        Some(Command::Verify { token }) => run_verify(&config, &token).await,
        Some(Command::Key(cmd)) => run_key_command(cmd),
    }
}

/// Print the current session, logging in if needed
async fn run_session(config: &Config, args: SessionArgs) -> ExitCode {
    let manager = match SessionManager::from_config(config) {
        Ok(manager) => manager,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let params = SessionParams {
        username: args.username,
        password: args.password,
        new_password: args.new_password,
    };
    let mut prompt = ConsolePrompt::new();

    match manager.get_or_create(params, &mut prompt).await {
        Some(session) => {
            println!(
                "Current session valid until: {}",
                session.aws_credentials.expiration.as_deref().unwrap_or_default()
            );
            ExitCode::SUCCESS
        }
        None => {
            println!("No valid session");
            ExitCode::FAILURE
        }
    }
}

/// Verify a token and print its claims
async fn run_verify(config: &Config, token: &str) -> ExitCode {
    let verifier_config = match verifier_config(config).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let verifier = match TokenVerifier::new(verifier_config) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    match verifier.verify(token).await {
        Ok(claims) => match serde_json::to_string_pretty(&claims) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to serialize claims: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e @ VerifyError::KeySetUnavailable(_)) => {
            error!(error = %e, "Key set unavailable");
            eprintln!("{e}");
            ExitCode::from(EXIT_CONFIG)
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Local identity settings, or the discovered ones when incomplete
async fn verifier_config(config: &Config) -> anyhow::Result<VerifierConfig> {
    if let Ok(local) = config.verifier_config() {
        return Ok(local);
    }

    let resolver = ClientConfigResolver::from_config(config)?;
    let client = resolver
        .resolve()
        .await
        .with_context(|| {
            format!(
                "identity settings not configured and discovery from {} failed",
                resolver.url()
            )
        })?;

    let mut verifier_config =
        VerifierConfig::new(client.region, client.user_pool_id, client.user_pool_client_id)?;
    if let Some(uri) = &config.identity.jwks_uri {
        verifier_config = verifier_config.with_jwks_uri(uri.clone());
    }
    Ok(verifier_config)
}

/// Run API key commands
fn run_key_command(cmd: KeyCommand) -> ExitCode {
    match cmd {
        KeyCommand::Generate {
            owner,
            rate_limit,
            expires_in_days,
            permissions,
        } => {
            let options = api_key::KeyOptions {
                permissions: (!permissions.is_empty()).then_some(permissions),
                expiry: expires_in_days.map(|days| Utc::now() + Duration::days(i64::from(days))),
                rate_limit,
            };
            let issued = api_key::new_key(&owner, options);
            let record = match serde_json::to_string_pretty(&issued.record) {
                Ok(json) => json,
                Err(e) => {
                    eprintln!("Failed to serialize key record: {e}");
                    return ExitCode::FAILURE;
                }
            };

            println!("API key (shown once): {}", issued.key);
            println!();
            println!("Record to store:");
            println!("{record}");
            ExitCode::SUCCESS
        }
        KeyCommand::Hash { key } => {
            println!("{}", api_key::hash_api_key(&key));
            ExitCode::SUCCESS
        }
    }
}
