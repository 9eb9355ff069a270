pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::AppError;
use crate::models::credential::Credential;

/// Durable index of issued keys.
/// Implementations: PgStore (PostgreSQL), MemoryStore (tests, dry runs).
///
/// Every mutation is applied atomically: either committed in full or not
/// at all.
#[async_trait]
pub trait CredentialRegistry: Send + Sync {
    /// Fails with `Storage` on a duplicate id.
    async fn insert(&self, credential: &Credential) -> Result<(), AppError>;

    async fn delete(&self, id: &str) -> Result<bool, AppError>;

    /// Remove all given ids in one transaction. Returns rows removed.
    async fn delete_many(&self, ids: &[String]) -> Result<u64, AppError>;

    async fn list_all(&self) -> Result<Vec<Credential>, AppError>;

    /// Credentials with a non-null `expires_at <= as_of`.
    async fn find_expired(&self, as_of: DateTime<Utc>) -> Result<Vec<Credential>, AppError>;

    async fn ping(&self) -> Result<(), AppError>;
}
