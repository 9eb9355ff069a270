use std::sync::Arc;

use crate::errors::AppError;
use crate::xray::control::{run_checked, CommandRunner};

/// Applies HTB bandwidth caps through `tc`.
///
/// Uses `tc class replace`, so throttling an already throttled client is a
/// no-op rather than an error. Unlike reloads, failures propagate.
#[derive(Clone)]
pub struct Throttler {
    runner: Arc<dyn CommandRunner>,
    device: String,
}

impl Throttler {
    pub fn new(runner: Arc<dyn CommandRunner>, device: impl Into<String>) -> Self {
        Self {
            runner,
            device: device.into(),
        }
    }

    pub fn command_for(&self, id: &str, bandwidth: &str) -> Result<Vec<String>, AppError> {
        let class = class_id(id);
        if class.is_empty() {
            return Err(AppError::NotFound(id.to_string()));
        }
        let classid = format!("1:{}", class);
        let argv: [&str; 12] = [
            "tc",
            "class",
            "replace",
            "dev",
            &self.device,
            "parent",
            "1:",
            "classid",
            &classid,
            "htb",
            "rate",
            bandwidth,
        ];
        Ok(argv.iter().map(|s| s.to_string()).collect())
    }

    pub async fn apply(&self, id: &str, bandwidth: &str) -> Result<(), AppError> {
        let argv = self.command_for(id, bandwidth)?;
        run_checked(self.runner.as_ref(), &argv).await?;
        tracing::info!(id, bandwidth, class = %class_id(id), "throttle applied");
        Ok(())
    }
}

/// Traffic class minor id: first four characters of the id with dashes removed.
pub fn class_id(id: &str) -> String {
    id.chars().filter(|c| *c != '-').take(4).collect()
}
