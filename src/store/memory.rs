//! In-process registry. Rows live only as long as the store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::CredentialRegistry;
use crate::errors::AppError;
use crate::models::credential::Credential;

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<Vec<Credential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialRegistry for MemoryStore {
    async fn insert(&self, credential: &Credential) -> Result<(), AppError> {
        let mut rows = self.rows.write().await;
        if rows.iter().any(|r| r.id == credential.id) {
            return Err(AppError::Storage(format!(
                "duplicate key value violates unique constraint: id={}",
                credential.id
            )));
        }
        rows.push(credential.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| r.id != id);
        Ok(rows.len() != before)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<u64, AppError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| !ids.contains(&r.id));
        Ok((before - rows.len()) as u64)
    }

    async fn list_all(&self) -> Result<Vec<Credential>, AppError> {
        let mut rows = self.rows.read().await.clone();
        rows.sort_by_key(|r| r.created_at);
        Ok(rows)
    }

    async fn find_expired(&self, as_of: DateTime<Utc>) -> Result<Vec<Credential>, AppError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.is_expired(as_of))
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
