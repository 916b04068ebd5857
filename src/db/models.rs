//! # Store Models
//!
//! Two families of types live here:
//! - **Domain records** (`User`, `Credential`, `PendingChallenge`) that every
//!   `CredentialStore` implementation speaks.
//! - **Row types** (`UserRow`, `CredentialRow`, `ChallengeRow`) that map
//!   SQLite rows via `sqlx::FromRow`. Timestamps are RFC3339 text in SQLite.

use crate::error::{AppError, AppResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A user known to the relying party.
///
/// Each user owns at most one pending challenge and an append-only list of
/// credentials.
#[derive(Debug, Clone)]
pub struct User {
    /// Store-assigned identifier (UUID v4 string)
    pub id: String,

    /// Unique login name
    pub username: String,

    /// Opaque handle handed to authenticators as `user.id`.
    /// Stable for the lifetime of the account and never derived from the
    /// username, so it leaks nothing about the user.
    pub user_handle: Vec<u8>,

    /// The one outstanding challenge, if a ceremony is in flight
    pub current_challenge: Option<PendingChallenge>,

    /// Registered credentials, in enrollment order
    pub credentials: Vec<Credential>,

    pub created_at: DateTime<Utc>,
}

impl User {
    /// Provision a new user with a fresh id and user handle.
    pub fn new(username: String) -> Self {
        let id = Uuid::new_v4();
        Self {
            id: id.to_string(),
            username,
            user_handle: Uuid::new_v4().as_bytes().to_vec(),
            current_challenge: None,
            credentials: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Which ceremony a challenge was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ceremony {
    Registration,
    Authentication,
}

impl Ceremony {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ceremony::Registration => "registration",
            Ceremony::Authentication => "authentication",
        }
    }
}

impl fmt::Display for Ceremony {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ceremony {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration" => Ok(Ceremony::Registration),
            "authentication" => Ok(Ceremony::Authentication),
            other => Err(format!("unknown ceremony '{other}'")),
        }
    }
}

/// A challenge handed to the client and not yet consumed.
///
/// `issued_at` lets the server enforce its own expiry instead of trusting
/// the timeout hint it sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChallenge {
    /// base64url encoding of the random challenge bytes
    pub challenge: String,
    pub ceremony: Ceremony,
    pub issued_at: DateTime<Utc>,
}

impl PendingChallenge {
    pub fn new(challenge: String, ceremony: Ceremony) -> Self {
        Self {
            challenge,
            ceremony,
            issued_at: Utc::now(),
        }
    }

    /// Whether the challenge is older than `ttl` at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.issued_at > ttl
    }
}

/// Transport hints an authenticator reports for a credential.
///
/// Unknown hints are dropped at the boundary rather than rejected; browsers
/// add new transports over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    Usb,
    Nfc,
    Ble,
    Internal,
    Hybrid,
    SmartCard,
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "usb" => Ok(Transport::Usb),
            "nfc" => Ok(Transport::Nfc),
            "ble" => Ok(Transport::Ble),
            "internal" => Ok(Transport::Internal),
            "hybrid" => Ok(Transport::Hybrid),
            "smart-card" => Ok(Transport::SmartCard),
            other => Err(format!("unknown transport '{other}'")),
        }
    }
}

/// Parse a client-reported transport list, dropping unknown values and
/// duplicates while keeping the reported order.
pub fn parse_transports(raw: &[String]) -> Vec<Transport> {
    let mut transports = Vec::new();
    for t in raw.iter().filter_map(|s| s.parse::<Transport>().ok()) {
        if !transports.contains(&t) {
            transports.push(t);
        }
    }
    transports
}

/// A registered passkey.
///
/// Created once on successful registration. After that only `sign_count`
/// and `last_used_at` change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Raw credential identifier chosen by the authenticator
    pub credential_id: Vec<u8>,

    /// COSE_Key encoding of the credential public key
    pub public_key: Vec<u8>,

    /// Last signature counter value accepted for this credential
    pub sign_count: u32,

    pub transports: Vec<Transport>,

    pub created_at: DateTime<Utc>,

    pub last_used_at: Option<DateTime<Utc>>,
}

/// Outcome of `CredentialStore::add_credential`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddCredential {
    Added,
    AlreadyExists,
    /// The credential ID is enrolled under a different user.
    OwnedByAnotherUser,
}

// SQLite row types

/// Fixed-width UTC timestamp text, so SQLite string comparison orders rows
/// the same way the instants are ordered.
pub fn to_db_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_db_timestamp(s: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| AppError::Internal(format!("Invalid stored timestamp '{}'", s)))
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub user_handle: Vec<u8>,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CredentialRow {
    pub user_id: String,
    pub credential_id: Vec<u8>,
    pub public_key: Vec<u8>,
    /// SQLite integers are i64; the value always fits a u32
    pub sign_count: i64,
    /// JSON array of transport strings, e.g. `["usb","nfc"]`
    pub transports: Option<String>,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChallengeRow {
    pub user_id: String,
    pub challenge: String,
    pub ceremony: String,
    pub issued_at: String,
}
