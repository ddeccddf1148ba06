//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Pennyworth - session, token and API key tooling for the Pennyworth API
#[derive(Parser, Debug)]
#[command(name = "pennyworth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "PENNYWORTH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "warn",
        env = "PENNYWORTH_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "PENNYWORTH_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (defaults to `session`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the current session, logging in if needed
    Session(SessionArgs),

    /// Verify a signed identity token and print its claims
    Verify {
        /// The compact token
        #[arg(required = true)]
        token: String,
    },

    /// API key management commands
    #[command(subcommand)]
    Key(KeyCommand),
}

/// Credentials for `session`; missing values are prompted for
#[derive(clap::Args, Debug, Default)]
pub struct SessionArgs {
    /// Login name
    #[arg(short, long, env = "PENNYWORTH_USERNAME")]
    pub username: Option<String>,

    /// Password
    #[arg(short, long, env = "PENNYWORTH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// New password to set if the account requires a change
    #[arg(long, hide_env_values = true)]
    pub new_password: Option<String>,
}

/// API key subcommands
#[derive(Subcommand, Debug)]
pub enum KeyCommand {
    /// Generate a new key and the record to store for it
    Generate {
        /// Service or team that owns the key
        #[arg(short, long, required = true)]
        owner: String,

        /// Requests per minute allowed for the owner
        #[arg(long)]
        rate_limit: Option<u32>,

        /// Days until the key expires
        #[arg(long)]
        expires_in_days: Option<u32>,

        /// Permission granted to the key (repeatable)
        #[arg(long = "permission")]
        permissions: Vec<String>,
    },

    /// Print the lookup hash of an existing key
    Hash {
        /// The plaintext key
        #[arg(required = true)]
        key: String,
    },
}
