//! In-process credential store.
//!
//! Everything lives in one `HashMap` behind a `tokio` `RwLock`; each trait
//! method takes the lock once, which makes every mutation atomic.

use super::models::{AddCredential, Credential, PendingChallenge, User};
use super::CredentialStore;
use crate::codec;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Keyed by user id
    users: RwLock<HashMap<String, User>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn user_not_found(user_id: &str) -> AppError {
    AppError::NotFound(format!("User with id '{}' not found", user_id))
}

fn credential_not_found() -> AppError {
    AppError::NotFound("Credential not found".to_string())
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user_by_username(&self, username: &str) -> AppResult<User> {
        let users = self.users.read().await;
        users
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", username)))
    }

    async fn set_challenge(&self, user_id: &str, challenge: &PendingChallenge) -> AppResult<()> {
        let mut users = self.users.write().await;
        let user = users.get_mut(user_id).ok_or_else(|| user_not_found(user_id))?;
        user.current_challenge = Some(challenge.clone());
        Ok(())
    }

    async fn clear_challenge(&self, user_id: &str) -> AppResult<()> {
        let mut users = self.users.write().await;
        let user = users.get_mut(user_id).ok_or_else(|| user_not_found(user_id))?;
        user.current_challenge = None;
        Ok(())
    }

    async fn add_credential(&self, user_id: &str, credential: &Credential) -> AppResult<AddCredential> {
        let mut users = self.users.write().await;
        if !users.contains_key(user_id) {
            return Err(user_not_found(user_id));
        }

        let owner = users.values().find(|u| {
            u.credentials
                .iter()
                .any(|c| codec::constant_time_eq(&c.credential_id, &credential.credential_id))
        });
        match owner {
            Some(u) if u.id == user_id => return Ok(AddCredential::AlreadyExists),
            Some(_) => return Ok(AddCredential::OwnedByAnotherUser),
            None => {}
        }

        let user = users.get_mut(user_id).ok_or_else(|| user_not_found(user_id))?;
        user.credentials.push(credential.clone());
        Ok(AddCredential::Added)
    }

    async fn update_sign_count(
        &self,
        user_id: &str,
        credential_id: &[u8],
        sign_count: u32,
    ) -> AppResult<()> {
        let mut users = self.users.write().await;
        let user = users.get_mut(user_id).ok_or_else(|| user_not_found(user_id))?;
        let credential = user
            .credentials
            .iter_mut()
            .find(|c| codec::constant_time_eq(&c.credential_id, credential_id))
            .ok_or_else(credential_not_found)?;

        credential.sign_count = sign_count;
        credential.last_used_at = Some(Utc::now());
        Ok(())
    }

    async fn find_credential(&self, user_id: &str, credential_id: &[u8]) -> AppResult<Credential> {
        let users = self.users.read().await;
        let user = users.get(user_id).ok_or_else(|| user_not_found(user_id))?;
        user.credentials
            .iter()
            .find(|c| codec::constant_time_eq(&c.credential_id, credential_id))
            .cloned()
            .ok_or_else(credential_not_found)
    }

    async fn create_user(&self, username: &str) -> AppResult<User> {
        let mut users = self.users.write().await;
        if let Some(existing) = users.values().find(|u| u.username == username) {
            return Ok(existing.clone());
        }

        let user = User::new(username.to_string());
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn purge_expired_challenges(&self, issued_before: DateTime<Utc>) -> AppResult<u64> {
        let mut users = self.users.write().await;
        let mut purged = 0;
        for user in users.values_mut() {
            if matches!(&user.current_challenge, Some(c) if c.issued_at < issued_before) {
                user.current_challenge = None;
                purged += 1;
            }
        }
        Ok(purged)
    }
}
