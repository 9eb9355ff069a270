//! Background job: remove keys past their `expires_at`.
//!
//! Each pass drops expired clients from the XRay config one by one, then
//! deletes their registry rows in a single transaction and reloads XRay
//! once if the config changed. A client whose config removal fails keeps
//! its registry row so the next pass retries it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use super::{run_every, StopSignal};
use crate::clock::Clock;
use crate::errors::AppError;
use crate::store::CredentialRegistry;
use crate::xray::{XrayConfigFile, XrayReloader};

pub struct ExpirationReconciler {
    config_file: XrayConfigFile,
    registry: Arc<dyn CredentialRegistry>,
    reloader: XrayReloader,
    clock: Arc<dyn Clock>,
}

impl ExpirationReconciler {
    pub fn new(
        config_file: XrayConfigFile,
        registry: Arc<dyn CredentialRegistry>,
        reloader: XrayReloader,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config_file,
            registry,
            reloader,
            clock,
        }
    }

    pub async fn run_pass(&self) -> Result<Vec<String>, AppError> {
        self.run_pass_at(self.clock.now_utc()).await
    }

    /// Returns the ids removed from the registry.
    pub async fn run_pass_at(&self, now: DateTime<Utc>) -> Result<Vec<String>, AppError> {
        let expired = self.registry.find_expired(now).await?;
        if expired.is_empty() {
            tracing::debug!("no expired keys");
            return Ok(Vec::new());
        }

        let mut removable = Vec::with_capacity(expired.len());
        let mut config_changed = false;
        for key in expired {
            match self.config_file.remove_client(&key.id) {
                Ok(removed) => {
                    config_changed |= removed;
                    removable.push(key.id);
                }
                Err(e) => {
                    tracing::error!(id = %key.id, error = %e, "failed to remove expired client from xray config");
                }
            }
        }

        if removable.is_empty() {
            return Ok(removable);
        }

        let deleted = self.registry.delete_many(&removable).await?;
        if config_changed {
            self.reloader.reload().await;
        }
        tracing::info!(deleted, ids = ?removable, "expired keys removed");
        Ok(removable)
    }
}

/// Spawn the reconciler loop. Call this once at startup.
pub fn spawn(
    reconciler: Arc<ExpirationReconciler>,
    interval: Duration,
    stop: StopSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_every("expiration", interval, stop, || {
            let reconciler = reconciler.clone();
            async move { Ok::<_, anyhow::Error>(reconciler.run_pass().await?) }
        })
        .await
    })
}
