use crate::db::models::{to_db_timestamp, ChallengeRow, PendingChallenge};
use crate::error::AppResult;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// Store the user's pending challenge, replacing any previous one.
pub async fn save_challenge(
    pool: &SqlitePool,
    user_id: &str,
    challenge: &PendingChallenge,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO pending_challenges (user_id, challenge, ceremony, issued_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT (user_id) DO UPDATE SET
             challenge = excluded.challenge,
             ceremony = excluded.ceremony,
             issued_at = excluded.issued_at",
    )
    .bind(user_id)
    .bind(&challenge.challenge)
    .bind(challenge.ceremony.as_str())
    .bind(to_db_timestamp(challenge.issued_at))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_challenge(pool: &SqlitePool, user_id: &str) -> AppResult<Option<ChallengeRow>> {
    let challenge =
        sqlx::query_as::<_, ChallengeRow>("SELECT * FROM pending_challenges WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    Ok(challenge)
}

pub async fn delete_challenge(pool: &SqlitePool, user_id: &str) -> AppResult<()> {
    sqlx::query("DELETE FROM pending_challenges WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Remove challenges issued before `cutoff` (run periodically).
///
/// `issued_at` is written by `to_db_timestamp`, so text
/// comparison orders the same way the timestamps do.
pub async fn cleanup_expired_challenges(pool: &SqlitePool, cutoff: DateTime<Utc>) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM pending_challenges WHERE issued_at < ?")
        .bind(to_db_timestamp(cutoff))
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
