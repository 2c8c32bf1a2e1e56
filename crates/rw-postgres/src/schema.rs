use sqlx::PgPool;

use rw_core::errors::StoreError;

use crate::map_err;

/// Table definitions, applied in order. Every statement is idempotent.
pub const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS members (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL,
        username TEXT,
        full_name TEXT,
        chat_id BIGINT NOT NULL,
        UNIQUE (user_id, chat_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS members_chat_id_idx ON members (chat_id)",
    r#"
    CREATE TABLE IF NOT EXISTS allowed_users (
        id BIGSERIAL PRIMARY KEY,
        username TEXT NOT NULL UNIQUE
    )
    "#,
];

/// Create the tables if they do not exist yet.
pub async fn bootstrap(pool: &PgPool) -> Result<(), StoreError> {
    for stmt in STATEMENTS {
        sqlx::query(*stmt).execute(pool).await.map_err(map_err)?;
    }
    tracing::info!("directory tables ready");
    Ok(())
}
