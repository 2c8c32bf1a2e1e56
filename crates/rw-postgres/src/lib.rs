//! PostgreSQL directory store.
//!
//! Implements `rw-core`'s `DirectoryStore` over a `sqlx` pool. All SQL is
//! runtime-checked (`sqlx::query`, not `sqlx::query!`) so builds do not need a
//! live database.

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

use rw_core::{
    config::DatabaseConfig,
    domain::{ChatId, Identity, UserId},
    errors::StoreError,
    ports::DirectoryStore,
};

pub mod schema;

pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool and make sure the tables exist.
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect(&cfg.url)
            .await
            .map_err(map_err)?;
        let dir = Self::new(pool);
        schema::bootstrap(&dir.pool).await?;
        Ok(dir)
    }
}

/// Connection-level failures are `Unavailable`; everything else is a query error.
pub(crate) fn map_err(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(e.to_string()),
        other => StoreError::Query(other.to_string()),
    }
}

#[async_trait]
impl DirectoryStore for PgDirectory {
    async fn list_allowed(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT username FROM allowed_users ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
        let names = rows
            .iter()
            .map(|r| r.try_get::<String, _>("username"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_err)?;
        tracing::debug!(count = names.len(), "loaded allow-list");
        Ok(names)
    }

    async fn list_members(&self, chat_id: ChatId) -> Result<Vec<Identity>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, username, full_name
            FROM members
            WHERE chat_id = $1
            ORDER BY id
            "#,
        )
        .bind(chat_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        rows.iter()
            .map(|r| -> Result<Identity, sqlx::Error> {
                Ok(Identity {
                    user_id: UserId(r.try_get("user_id")?),
                    username: r.try_get("username")?,
                    display_name: r
                        .try_get::<Option<String>, _>("full_name")?
                        .unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_err)
    }

    async fn upsert_member(&self, identity: &Identity, chat_id: ChatId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO members (user_id, username, full_name, chat_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, chat_id)
            DO UPDATE SET username = EXCLUDED.username, full_name = EXCLUDED.full_name
            "#,
        )
        .bind(identity.user_id.0)
        .bind(identity.username.as_deref())
        .bind(&identity.display_name)
        .bind(chat_id.0)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn delete_member(&self, user_id: UserId, chat_id: ChatId) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM members WHERE user_id = $1 AND chat_id = $2")
            .bind(user_id.0)
            .bind(chat_id.0)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        if res.rows_affected() == 0 {
            tracing::debug!(
                chat_id = chat_id.0,
                user_id = user_id.0,
                "leave for unrecorded member"
            );
        }
        Ok(())
    }
}
