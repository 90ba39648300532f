pub mod config;
pub mod secret;
pub mod store;

use clap::{Parser, Subcommand};

/// memberkit: signed session tokens backed by a shared identity store.
#[derive(Debug, Parser)]
#[command(name = "memberkit", version, about)]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, env = "MK_CONFIG", default_value = "config.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP server (default when no subcommand is given).
    Serve,
    /// Session secret utilities.
    #[command(subcommand)]
    Secret(SecretCommand),
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Identity store maintenance.
    #[command(subcommand)]
    Store(StoreCommand),
    /// Token utilities.
    #[command(subcommand)]
    Token(TokenCommand),
    /// Delete the identity record behind a session, invalidating its tokens.
    Revoke {
        /// Session id as 16 hex digits, as printed by `token inspect`.
        session_id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum SecretCommand {
    /// Print a freshly generated secret suitable for `MK_SESSION_SECRET`.
    Generate,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

#[derive(Debug, Subcommand)]
pub enum StoreCommand {
    /// Create the identity map if it does not exist yet.
    Init,
}

#[derive(Debug, Subcommand)]
pub enum TokenCommand {
    /// Verify a token with the configured secret and print its contents.
    Inspect {
        /// The full token, including its `mk1.` prefix.
        token: String,
    },
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from `config_path`.  A missing file yields the
/// defaults; an unreadable or malformed one is an error.
pub fn load_config(config_path: &str) -> anyhow::Result<mk_domain::config::Config> {
    let path = std::path::Path::new(config_path);
    if !path.exists() {
        tracing::debug!(path = %config_path, "config file not found, using defaults");
        return Ok(mk_domain::config::Config::default());
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))
}
