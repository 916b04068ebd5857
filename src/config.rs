//! # Configuration Management
//!
//! Configuration comes from the environment ("12-factor" style), with a
//! `.env` file picked up for local development.
//!
//! ## Environment Variables
//! - `HOST`: Server bind address (default: 127.0.0.1)
//! - `PORT`: Server port (default: 8080)
//! - `DATABASE_URL`: SQLite connection string, or `memory` for a
//!   process-local store (default: sqlite:passkey.db?mode=rwc)
//! - `RP_ID`: WebAuthn Relying Party ID (usually your domain)
//! - `RP_ORIGIN`: WebAuthn Relying Party Origin (full URL)
//! - `RP_NAME`: Human-readable name for your service
//! - `CEREMONY_TIMEOUT_MS`: timeout hint sent to clients (default: 60000)
//! - `CHALLENGE_TTL_SECS`: server-side challenge lifetime (default: 300)
//! - `CHALLENGE_SWEEP_SECS`: interval of the expired-challenge sweep (default: 600)
//! - `REQUIRE_USER_VERIFICATION`: reject assertions without the UV flag (default: false)
//! - `SEED_USERS`: comma-separated usernames provisioned at startup (default: example)

use anyhow::{anyhow, Context, Result};
use std::env;
use std::str::FromStr;
use url::Url;

/// A challenge older than a day is never legitimate.
const MAX_CHALLENGE_TTL_SECS: u64 = 86_400;

/// Application configuration
///
/// ## WebAuthn Terminology
/// - **RP (Relying Party)**: the application that relies on authentication
/// - **RP ID**: your domain name (e.g., "example.com" or "localhost")
/// - **RP Origin**: full URL of your application (e.g., "https://example.com")
///
/// The RP ID and origin must match what the browser sees, or every
/// verification fails.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// SQLite URL, or `memory`
    pub database_url: String,

    /// Domain only, no scheme or port: "localhost", "example.com"
    pub rp_id: String,

    /// Scheme, host and port: "http://localhost:8080"
    pub rp_origin: String,

    /// Shown to users during passkey creation
    pub rp_name: String,

    pub ceremony_timeout_ms: u64,
    pub challenge_ttl_secs: u64,
    pub challenge_sweep_secs: u64,
    pub require_user_verification: bool,

    /// Accounts to provision at startup; user management is outside this
    /// server.
    pub seed_users: Vec<String>,
}

impl Config {
    /// Load configuration from the process environment (and `.env`).
    ///
    /// ## Example .env file
    /// ```text
    /// HOST=127.0.0.1
    /// PORT=8080
    /// DATABASE_URL=sqlite:passkey.db?mode=rwc
    /// RP_ID=localhost
    /// RP_ORIGIN=http://localhost:8080
    /// RP_NAME=Passkey Demo
    /// SEED_USERS=alice,bob
    /// ```
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup; `from_env` passes the
    /// process environment, tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Config {
            host: string("HOST", "127.0.0.1"),
            port: parse(&lookup, "PORT", 8080)?,
            database_url: string("DATABASE_URL", "sqlite:passkey.db?mode=rwc"),
            rp_id: string("RP_ID", "localhost"),
            rp_origin: string("RP_ORIGIN", "http://localhost:8080"),
            rp_name: string("RP_NAME", "Passkey Demo"),
            ceremony_timeout_ms: parse(&lookup, "CEREMONY_TIMEOUT_MS", 60_000)?,
            challenge_ttl_secs: parse(&lookup, "CHALLENGE_TTL_SECS", 300)?,
            challenge_sweep_secs: parse(&lookup, "CHALLENGE_SWEEP_SECS", 600)?,
            require_user_verification: parse(&lookup, "REQUIRE_USER_VERIFICATION", false)?,
            seed_users: string("SEED_USERS", "example")
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        };

        config.validate()?;
        Ok(config)
    }

    /// The origin must be a URL whose host is the RP ID or one of its
    /// subdomains, otherwise no browser would ever produce a valid response.
    fn validate(&self) -> Result<()> {
        if self.rp_id.is_empty() || self.rp_id.contains(|c: char| c == '/' || c == ':') {
            return Err(anyhow!("RP_ID must be a bare domain, got '{}'", self.rp_id));
        }

        let origin = Url::parse(&self.rp_origin)
            .with_context(|| format!("RP_ORIGIN '{}' is not a valid URL", self.rp_origin))?;
        let host = origin
            .host_str()
            .ok_or_else(|| anyhow!("RP_ORIGIN '{}' has no host", self.rp_origin))?;

        let subdomain_suffix = format!(".{}", self.rp_id);
        if host != self.rp_id && !host.ends_with(&subdomain_suffix) {
            return Err(anyhow!(
                "RP_ORIGIN host '{}' is not within RP_ID '{}'",
                host,
                self.rp_id
            ));
        }

        if self.challenge_ttl_secs == 0 || self.challenge_ttl_secs > MAX_CHALLENGE_TTL_SECS {
            return Err(anyhow!(
                "CHALLENGE_TTL_SECS must be between 1 and {MAX_CHALLENGE_TTL_SECS}"
            ));
        }

        if self.challenge_sweep_secs == 0 {
            return Err(anyhow!("CHALLENGE_SWEEP_SECS must be at least 1"));
        }

        Ok(())
    }

    /// Combines host and port for `tokio::net::TcpListener::bind()`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The origin exactly as browsers report it in `clientDataJSON`:
    /// scheme, host and non-default port, no trailing slash.
    pub fn normalized_origin(&self) -> String {
        match Url::parse(&self.rp_origin) {
            Ok(url) => url.origin().ascii_serialization(),
            Err(_) => self.rp_origin.clone(),
        }
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: '{raw}'")),
        None => Ok(default),
    }
}
