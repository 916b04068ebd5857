use crate::db::models::{to_db_timestamp, User, UserRow};
use crate::error::{AppError, AppResult};
use sqlx::SqlitePool;

/// Insert a new user, or return the existing row if the username is taken.
pub async fn create_user(pool: &SqlitePool, username: &str) -> AppResult<UserRow> {
    let user = User::new(username.to_string());

    sqlx::query(
        "INSERT INTO users (id, username, user_handle, created_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT (username) DO NOTHING",
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.user_handle)
    .bind(to_db_timestamp(user.created_at))
    .execute(pool)
    .await?;

    find_by_username(pool, username).await
}

pub async fn find_by_username(pool: &SqlitePool, username: &str) -> AppResult<UserRow> {
    let user = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_one(pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => AppError::NotFound(format!("User '{}' not found", username)),
            _ => AppError::Database(e),
        })?;

    Ok(user)
}

pub async fn find_by_id(pool: &SqlitePool, user_id: &str) -> AppResult<UserRow> {
    let user = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                AppError::NotFound(format!("User with id '{}' not found", user_id))
            }
            _ => AppError::Database(e),
        })?;

    Ok(user)
}
