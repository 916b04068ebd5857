//! Per-user mutual exclusion for ceremony steps.
//!
//! A `finish` must see the challenge its `begin` stored, not one a
//! concurrent `begin` just replaced, and two finishes for the same user must
//! not race on the credential list. Every ceremony step therefore runs while
//! holding its user's guard. Different users never share a guard.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user_id`'s ceremony state.
    ///
    /// Only called for users that exist, so the map is bounded by the
    /// number of accounts.
    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            // The map is only touched briefly and never across an await;
            // a poisoned lock still holds a consistent map.
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
