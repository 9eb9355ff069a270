//! Background job: throttle clients exceeding their device limit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::{run_every, StopSignal};
use crate::enforcement::UsageEnforcer;
use crate::store::CredentialRegistry;

#[derive(Debug, Clone)]
pub struct EnforcementSettings {
    pub access_log: PathBuf,
    pub default_limit: usize,
    pub bandwidth: String,
}

/// Spawn the enforcement loop. Call this once at startup.
pub fn spawn(
    enforcer: Arc<UsageEnforcer>,
    registry: Arc<dyn CredentialRegistry>,
    settings: EnforcementSettings,
    interval: Duration,
    stop: StopSignal,
) -> JoinHandle<()> {
    let settings = Arc::new(settings);
    tokio::spawn(async move {
        run_every("enforcement", interval, stop, || {
            let enforcer = enforcer.clone();
            let registry = registry.clone();
            let settings = settings.clone();
            async move {
                let throttled = enforcer
                    .enforce_registered(
                        &settings.access_log,
                        registry.as_ref(),
                        settings.default_limit,
                        &settings.bandwidth,
                    )
                    .await?;
                if !throttled.is_empty() {
                    tracing::info!(count = throttled.len(), ids = ?throttled, "throttled clients over device limit");
                }
                Ok::<_, anyhow::Error>(throttled)
            }
        })
        .await
    })
}
