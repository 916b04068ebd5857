//! `CredentialStore` backed by SQLite.
//!
//! The table layout lives in `migrations/`; the query functions in `users`,
//! `credentials` and `challenges` each touch one table. This module stitches
//! their rows back into the domain records.

use super::models::{
    parse_db_timestamp, AddCredential, Ceremony, ChallengeRow, Credential, CredentialRow,
    PendingChallenge, Transport, User, UserRow,
};
use super::{challenges, credentials, users, CredentialStore};
use crate::codec;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and apply migrations.
    pub async fn connect(url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, running migrations on it first.
    pub async fn from_pool(pool: SqlitePool) -> AppResult<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))?;

        Ok(Self { pool })
    }

    async fn load_user(&self, row: UserRow) -> AppResult<User> {
        let credential_rows = credentials::find_by_user_id(&self.pool, &row.id).await?;
        let challenge_row = challenges::find_challenge(&self.pool, &row.id).await?;

        let credentials = credential_rows
            .into_iter()
            .map(credential_from_row)
            .collect::<AppResult<Vec<_>>>()?;
        let current_challenge = challenge_row.map(challenge_from_row).transpose()?;

        Ok(User {
            created_at: parse_db_timestamp(&row.created_at)?,
            id: row.id,
            username: row.username,
            user_handle: row.user_handle,
            current_challenge,
            credentials,
        })
    }
}

fn credential_from_row(row: CredentialRow) -> AppResult<Credential> {
    let sign_count = u32::try_from(row.sign_count)
        .map_err(|_| AppError::Internal(format!("Stored sign count {} out of range", row.sign_count)))?;

    let transports: Vec<Transport> = match row.transports.as_deref() {
        Some(json) => serde_json::from_str(json)?,
        None => Vec::new(),
    };

    Ok(Credential {
        credential_id: row.credential_id,
        public_key: row.public_key,
        sign_count,
        transports,
        created_at: parse_db_timestamp(&row.created_at)?,
        last_used_at: row.last_used_at.as_deref().map(parse_db_timestamp).transpose()?,
    })
}

fn challenge_from_row(row: ChallengeRow) -> AppResult<PendingChallenge> {
    let ceremony = row.ceremony.parse::<Ceremony>().map_err(AppError::Internal)?;

    Ok(PendingChallenge {
        challenge: row.challenge,
        ceremony,
        issued_at: parse_db_timestamp(&row.issued_at)?,
    })
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn find_user_by_username(&self, username: &str) -> AppResult<User> {
        let row = users::find_by_username(&self.pool, username).await?;
        self.load_user(row).await
    }

    async fn set_challenge(&self, user_id: &str, challenge: &PendingChallenge) -> AppResult<()> {
        // Foreign keys would report this as a constraint error; callers expect NotFound.
        users::find_by_id(&self.pool, user_id).await?;
        challenges::save_challenge(&self.pool, user_id, challenge).await
    }

    async fn clear_challenge(&self, user_id: &str) -> AppResult<()> {
        challenges::delete_challenge(&self.pool, user_id).await
    }

    async fn add_credential(&self, user_id: &str, credential: &Credential) -> AppResult<AddCredential> {
        users::find_by_id(&self.pool, user_id).await?;

        if credentials::save_credential(&self.pool, user_id, credential).await? {
            return Ok(AddCredential::Added);
        }

        match credentials::find_owner(&self.pool, &credential.credential_id).await? {
            Some(owner) if owner != user_id => Ok(AddCredential::OwnedByAnotherUser),
            _ => Ok(AddCredential::AlreadyExists),
        }
    }

    async fn update_sign_count(
        &self,
        user_id: &str,
        credential_id: &[u8],
        sign_count: u32,
    ) -> AppResult<()> {
        if credentials::update_counter(&self.pool, user_id, credential_id, sign_count).await? {
            Ok(())
        } else {
            Err(AppError::NotFound("Credential not found".to_string()))
        }
    }

    async fn find_credential(&self, user_id: &str, credential_id: &[u8]) -> AppResult<Credential> {
        let row = credentials::find_by_user_id(&self.pool, user_id)
            .await?
            .into_iter()
            .find(|row| codec::constant_time_eq(&row.credential_id, credential_id))
            .ok_or_else(|| AppError::NotFound("Credential not found".to_string()))?;

        credential_from_row(row)
    }

    async fn create_user(&self, username: &str) -> AppResult<User> {
        let row = users::create_user(&self.pool, username).await?;
        self.load_user(row).await
    }

    async fn purge_expired_challenges(&self, issued_before: DateTime<Utc>) -> AppResult<u64> {
        challenges::cleanup_expired_challenges(&self.pool, issued_before).await
    }
}
