use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use super::CredentialRegistry;
use crate::errors::AppError;
use crate::models::credential::Credential;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialRegistry for PgStore {
    async fn insert(&self, credential: &Credential) -> Result<(), AppError> {
        sqlx::query(
            r#"INSERT INTO credentials (id, label, created_at, expires_at, device_limit)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(&credential.id)
        .bind(&credential.label)
        .bind(credential.created_at)
        .bind(credential.expires_at)
        .bind(credential.device_limit)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM credentials WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<u64, AppError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM credentials WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn list_all(&self) -> Result<Vec<Credential>, AppError> {
        let rows = sqlx::query_as::<_, Credential>(
            "SELECT id, label, created_at, expires_at, device_limit FROM credentials ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_expired(&self, as_of: DateTime<Utc>) -> Result<Vec<Credential>, AppError> {
        let rows = sqlx::query_as::<_, Credential>(
            r#"SELECT id, label, created_at, expires_at, device_limit
               FROM credentials
               WHERE expires_at IS NOT NULL AND expires_at <= $1
               ORDER BY expires_at ASC"#,
        )
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
