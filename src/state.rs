//! # Application State
//!
//! Shared state handed to every request handler. Axum clones it per
//! request, so everything inside is behind an `Arc`.

use crate::config::Config;
use crate::db::{CredentialStore, MemoryStore, SqliteStore};
use crate::webauthn::locks::UserLocks;
use crate::webauthn::RelyingParty;
use anyhow::Result;
use std::sync::Arc;

/// `DATABASE_URL` value that selects the in-process store.
pub const MEMORY_DATABASE_URL: &str = "memory";

#[derive(Clone)]
pub struct AppState {
    /// Where users, challenges and credentials live
    pub store: Arc<dyn CredentialStore>,

    /// Relying party identity and verification policy
    pub rp: Arc<RelyingParty>,

    /// Serializes ceremony steps per user
    pub locks: Arc<UserLocks>,
}

impl AppState {
    /// Open the configured store and provision the seed users.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated, or a
    /// seed user cannot be created.
    pub async fn new(config: &Config) -> Result<Self> {
        let store: Arc<dyn CredentialStore> = if config.database_url == MEMORY_DATABASE_URL {
            tracing::info!("Using in-memory credential store");
            Arc::new(MemoryStore::new())
        } else {
            tracing::info!("Using SQLite credential store");
            Arc::new(SqliteStore::connect(&config.database_url).await?)
        };

        let state = Self::with_store(config, store);

        for username in &config.seed_users {
            let user = state.store.create_user(username).await?;
            tracing::debug!(user = %user.username, id = %user.id, "Seed user ready");
        }

        Ok(state)
    }

    /// State over an already constructed store. Nothing is seeded.
    pub fn with_store(config: &Config, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            rp: Arc::new(RelyingParty::from_config(config)),
            locks: Arc::new(UserLocks::new()),
        }
    }
}
