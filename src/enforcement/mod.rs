//! Device-limit enforcement: count distinct source addresses per client in
//! the access log and throttle clients above their limit.

pub mod access_log;
pub mod throttle;

use std::collections::HashMap;
use std::path::Path;

use anyhow::anyhow;

use crate::errors::AppError;
use crate::store::CredentialRegistry;

pub use access_log::{detect_overuse, parse_usage, UsageSnapshot};
pub use throttle::Throttler;

pub struct UsageEnforcer {
    throttler: Throttler,
}

impl UsageEnforcer {
    pub fn new(throttler: Throttler) -> Self {
        Self { throttler }
    }

    pub async fn apply_throttle(&self, id: &str, bandwidth: &str) -> Result<(), AppError> {
        self.throttler.apply(id, bandwidth).await
    }

    /// Throttle every client seen from more than `limit` addresses.
    /// Returns the offending ids in sorted order. Stops at the first
    /// throttle failure.
    pub async fn enforce(
        &self,
        log_path: &Path,
        limit: usize,
        bandwidth: &str,
    ) -> Result<Vec<String>, AppError> {
        let usage = scan_usage(log_path).await?;
        let mut offenders: Vec<String> = detect_overuse(&usage, limit).into_keys().collect();
        offenders.sort();
        self.throttle_all(&offenders, &usage, bandwidth).await?;
        Ok(offenders)
    }

    /// Like [`enforce`](Self::enforce) but with each client's own device
    /// limit from the registry. Unlimited keys are never throttled; ids the
    /// registry does not know fall back to `default_limit`.
    pub async fn enforce_registered(
        &self,
        log_path: &Path,
        registry: &dyn CredentialRegistry,
        default_limit: usize,
        bandwidth: &str,
    ) -> Result<Vec<String>, AppError> {
        let usage = scan_usage(log_path).await?;
        if usage.is_empty() {
            return Ok(Vec::new());
        }

        let limits: HashMap<String, Option<i32>> = registry
            .list_all()
            .await?
            .into_iter()
            .map(|c| (c.id, c.device_limit))
            .collect();

        let mut offenders: Vec<String> = usage
            .iter()
            .filter(|(id, ips)| match limits.get(id.as_str()) {
                Some(Some(limit)) => ips.len() > (*limit).max(0) as usize,
                Some(None) => false,
                None => ips.len() > default_limit,
            })
            .map(|(id, _)| id.clone())
            .collect();
        offenders.sort();

        self.throttle_all(&offenders, &usage, bandwidth).await?;
        Ok(offenders)
    }

    async fn throttle_all(
        &self,
        offenders: &[String],
        usage: &UsageSnapshot,
        bandwidth: &str,
    ) -> Result<(), AppError> {
        for id in offenders {
            let devices = usage.get(id).map(|ips| ips.len()).unwrap_or_default();
            tracing::warn!(id = %id, devices, "device limit exceeded");
            self.throttler.apply(id, bandwidth).await?;
        }
        Ok(())
    }
}

/// Parse the access log on the blocking pool.
async fn scan_usage(log_path: &Path) -> Result<UsageSnapshot, AppError> {
    let path = log_path.to_path_buf();
    let usage = tokio::task::spawn_blocking(move || parse_usage(&path))
        .await
        .map_err(|e| AppError::Internal(anyhow!("access log scan panicked: {}", e)))??;
    Ok(usage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xray::RecordingRunner;
    use std::sync::Arc;

    fn enforcer(runner: Arc<RecordingRunner>) -> UsageEnforcer {
        UsageEnforcer::new(Throttler::new(runner, "eth0"))
    }

    #[tokio::test(flavor = "current_thread")]
    async fn scan_runs_off_the_async_thread() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("access.log");
        let lines: Vec<String> = (0..2000)
            .map(|n| format!("uuid=dddd-0001 ip=10.0.{}.{}", n / 250, n % 250))
            .collect();
        std::fs::write(&log, lines.join("\n")).unwrap();

        let runner = Arc::new(RecordingRunner::new());
        let throttled = enforcer(runner.clone()).enforce(&log, 3, "1mbit").await.unwrap();
        assert_eq!(throttled, vec!["dddd-0001".to_string()]);
        assert_eq!(runner.calls_to("tc").len(), 1);
    }

    #[tokio::test]
    async fn unreadable_log_surfaces_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let err = enforcer(runner.clone())
            .enforce(dir.path(), 3, "1mbit")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
        assert!(runner.calls().is_empty());
    }
}
