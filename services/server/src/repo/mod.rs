pub mod messages;
pub mod users;

use sqlx::PgPool;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct HealthStatus {
    pub ok: bool,
    pub detail: String,
}

/// Verifies both backing tables exist, mirroring the handshake checks
/// exposed by the liveness routes.
pub async fn health(pool: &PgPool) -> HealthStatus {
    let row = sqlx::query!(
        r#"SELECT to_regclass('public.users') AS "users_table", to_regclass('public.messages') AS "messages_table""#
    )
    .fetch_one(pool)
    .await;

    match row {
        Ok(r) if r.users_table.is_some() && r.messages_table.is_some() => HealthStatus {
            ok: true,
            detail: "ready".to_owned(),
        },
        Ok(_) => HealthStatus {
            ok: false,
            detail: "missing required tables".to_owned(),
        },
        Err(err) => HealthStatus {
            ok: false,
            detail: format!("database error: {err}"),
        },
    }
}
