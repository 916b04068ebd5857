//! # Credential Store
//!
//! The ceremony engines never talk to a database directly; they go through
//! the [`CredentialStore`] trait so storage can be swapped without touching
//! the protocol code.
//!
//! ## Submodules
//! - `models`: domain records and SQLite row types
//! - `memory`: in-process store (tests, `DATABASE_URL=memory`)
//! - `sqlite`: `CredentialStore` over SQLite, built from:
//!   - `users`: queries on the users table
//!   - `credentials`: queries on registered passkeys
//!   - `challenges`: queries on pending challenges
//!
//! ## Contract
//! - Lookups are exact: usernames by string equality, credential IDs by
//!   constant-time byte comparison. No prefix or case-folding matches.
//! - Each method is atomic for the user it touches.
//! - Issuing a challenge replaces any previous one.

pub mod challenges;
pub mod credentials;
pub mod memory;
pub mod models;
pub mod sqlite;
pub mod users;

use crate::error::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use models::{AddCredential, Credential, PendingChallenge, User};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The user with its pending challenge and credentials, or `NotFound`.
    async fn find_user_by_username(&self, username: &str) -> AppResult<User>;

    /// Store `challenge` as the user's only pending challenge.
    async fn set_challenge(&self, user_id: &str, challenge: &PendingChallenge) -> AppResult<()>;

    /// Drop the user's pending challenge, if any.
    async fn clear_challenge(&self, user_id: &str) -> AppResult<()>;

    /// Append a credential unless one with the same ID is already enrolled.
    async fn add_credential(&self, user_id: &str, credential: &Credential) -> AppResult<AddCredential>;

    /// Record the counter value from a successful assertion.
    async fn update_sign_count(
        &self,
        user_id: &str,
        credential_id: &[u8],
        sign_count: u32,
    ) -> AppResult<()>;

    /// One of the user's credentials by exact ID, or `NotFound`.
    async fn find_credential(&self, user_id: &str, credential_id: &[u8]) -> AppResult<Credential>;

    /// Provision a user. Returns the existing record when the username is
    /// already taken, so seeding is idempotent.
    async fn create_user(&self, username: &str) -> AppResult<User>;

    /// Remove challenges issued before `issued_before`; returns how many.
    async fn purge_expired_challenges(&self, issued_before: DateTime<Utc>) -> AppResult<u64>;
}
