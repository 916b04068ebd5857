//! # Credential Database Operations
//!
//! Queries on the `passkey_credentials` table.
//!
//! ## Security Note
//! Only public keys are stored; private keys never leave the authenticator.

use crate::db::models::{to_db_timestamp, Credential, CredentialRow};
use crate::error::AppResult;
use chrono::Utc;
use sqlx::SqlitePool;

/// Insert a credential unless a row with this ID already exists, for this
/// user or any other.
///
/// Returns `true` when a row was written. The primary key and the unique
/// index on `credential_id` make the check and the insert one atomic
/// statement; use [`find_owner`] to tell the two conflicts apart.
pub async fn save_credential(
    pool: &SqlitePool,
    user_id: &str,
    credential: &Credential,
) -> AppResult<bool> {
    // Transports are stored as a JSON array: ["usb","nfc"]
    let transports_json = if credential.transports.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&credential.transports)?)
    };

    let result = sqlx::query(
        "INSERT INTO passkey_credentials
         (user_id, credential_id, public_key, sign_count, transports, created_at, last_used_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(&credential.credential_id)
    .bind(&credential.public_key)
    .bind(i64::from(credential.sign_count))
    .bind(transports_json)
    .bind(to_db_timestamp(credential.created_at))
    .bind(credential.last_used_at.map(to_db_timestamp))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// The user a credential ID is enrolled under, if any.
pub async fn find_owner(pool: &SqlitePool, credential_id: &[u8]) -> AppResult<Option<String>> {
    let owner = sqlx::query_scalar::<_, String>(
        "SELECT user_id FROM passkey_credentials WHERE credential_id = ?",
    )
    .bind(credential_id)
    .fetch_optional(pool)
    .await?;

    Ok(owner)
}

/// All credentials of a user, in enrollment order. Empty if none.
pub async fn find_by_user_id(pool: &SqlitePool, user_id: &str) -> AppResult<Vec<CredentialRow>> {
    let credentials = sqlx::query_as::<_, CredentialRow>(
        "SELECT * FROM passkey_credentials WHERE user_id = ? ORDER BY rowid",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(credentials)
}

/// Update the signature counter after a successful authentication.
///
/// Also stamps `last_used_at`. Returns `false` if no such credential exists.
pub async fn update_counter(
    pool: &SqlitePool,
    user_id: &str,
    credential_id: &[u8],
    new_counter: u32,
) -> AppResult<bool> {
    let now = to_db_timestamp(Utc::now());

    let result = sqlx::query(
        "UPDATE passkey_credentials
         SET sign_count = ?, last_used_at = ?
         WHERE user_id = ? AND credential_id = ?",
    )
    .bind(i64::from(new_counter))
    .bind(now)
    .bind(user_id)
    .bind(credential_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
