use sqlx::PgPool;

use super::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRecord {
    pub username: String,
    pub channel: String,
    pub content: String,
    pub sent_at: String,
}

/// Writes every record in `records` in a single atomic transaction. On
/// failure nothing is written; the caller retains the batch.
pub async fn insert_batch(pool: &PgPool, records: &[ChatRecord]) -> Result<(), StoreError> {
    if records.is_empty() {
        return Ok(());
    }

    let usernames: Vec<&str> = records.iter().map(|r| r.username.as_str()).collect();
    let channels: Vec<&str> = records.iter().map(|r| r.channel.as_str()).collect();
    let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
    let sent_ats: Vec<&str> = records.iter().map(|r| r.sent_at.as_str()).collect();

    let mut tx = pool.begin().await?;
    sqlx::query!(
        r#"INSERT INTO messages (username, channel, content, sent_at)
           SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::text[])"#,
        &usernames as &[&str],
        &channels as &[&str],
        &contents as &[&str],
        &sent_ats as &[&str],
    )
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}
