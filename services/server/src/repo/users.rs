use std::collections::HashSet;

use sqlx::PgPool;

use super::StoreError;

pub struct Credentials {
    pub password_hash: String,
    pub disabled: bool,
}

/// Looks up the stored credentials for `username`; `None` if no such account.
pub async fn credentials(
    pool: &PgPool,
    username: &str,
) -> Result<Option<Credentials>, StoreError> {
    let row = sqlx::query!(
        r#"SELECT password_hash, disabled FROM users WHERE username = $1"#,
        username
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| Credentials {
        password_hash: r.password_hash,
        disabled: r.disabled,
    }))
}

/// Returns the channel set for `username`, or the empty set if the account
/// is missing or has no subscriptions.
pub async fn subscriptions(pool: &PgPool, username: &str) -> Result<HashSet<String>, StoreError> {
    let row = sqlx::query!(r#"SELECT channels FROM users WHERE username = $1"#, username)
        .fetch_optional(pool)
        .await?;
    Ok(row
        .map(|r| r.channels.into_iter().collect())
        .unwrap_or_default())
}

/// Idempotent: adding a channel the user already holds is a no-op.
pub async fn add_subscription(
    pool: &PgPool,
    username: &str,
    channel: &str,
) -> Result<(), StoreError> {
    sqlx::query!(
        r#"UPDATE users SET channels = array_append(channels, $2)
           WHERE username = $1 AND NOT ($2 = ANY(channels))"#,
        username,
        channel
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Idempotent: removing a channel the user does not hold is a no-op.
pub async fn remove_subscription(
    pool: &PgPool,
    username: &str,
    channel: &str,
) -> Result<(), StoreError> {
    sqlx::query!(
        r#"UPDATE users SET channels = array_remove(channels, $2) WHERE username = $1"#,
        username,
        channel
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Creates an account with the given pre-hashed password. Returns `false`
/// (no error) if the username is already taken.
pub async fn create_account(
    pool: &PgPool,
    username: &str,
    password_hash: &str,
) -> Result<bool, StoreError> {
    let result = sqlx::query!(
        r#"INSERT INTO users (username, password_hash) VALUES ($1, $2)
           ON CONFLICT (username) DO NOTHING"#,
        username,
        password_hash
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}
