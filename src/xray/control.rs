//! External process control: XRay reloads and any other host command the
//! keeper shells out to.

use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stderr: String,
}

/// Abstraction over process spawning so reload/throttle paths can be
/// exercised without touching the host.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, argv: &[String]) -> io::Result<CommandOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, argv: &[String]) -> io::Result<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;
        let output = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// How a [`RecordingRunner`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedOutcome {
    Succeed,
    Missing,
    Exit(i32),
}

/// Records commands instead of executing them. Backs `--dry-run`.
#[derive(Debug)]
pub struct RecordingRunner {
    outcome: RecordedOutcome,
    calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::with_outcome(RecordedOutcome::Succeed)
    }

    pub fn with_outcome(outcome: RecordedOutcome) -> Self {
        Self {
            outcome,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|argv| argv.first().map(String::as_str) == Some(program))
            .collect()
    }
}

impl Default for RecordingRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, argv: &[String]) -> io::Result<CommandOutput> {
        tracing::info!(command = %argv.join(" "), "dry run: command not executed");
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(argv.to_vec());
        match self.outcome {
            RecordedOutcome::Succeed => Ok(CommandOutput {
                success: true,
                code: Some(0),
                stderr: String::new(),
            }),
            RecordedOutcome::Missing => Err(io::Error::new(io::ErrorKind::NotFound, "not found")),
            RecordedOutcome::Exit(code) => Ok(CommandOutput {
                success: false,
                code: Some(code),
                stderr: format!("exit status {}", code),
            }),
        }
    }
}

/// Run a command and turn spawn failures and non-zero exits into errors.
pub async fn run_checked(runner: &dyn CommandRunner, argv: &[String]) -> Result<(), AppError> {
    let program = argv.first().cloned().unwrap_or_default();
    match runner.run(argv).await {
        Ok(out) if out.success => Ok(()),
        Ok(out) => Err(AppError::ExternalCommandFailed {
            command: argv.join(" "),
            detail: match out.code {
                Some(code) if out.stderr.is_empty() => format!("exit status {}", code),
                Some(code) => format!("exit status {}: {}", code, out.stderr),
                None => "terminated by signal".to_string(),
            },
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(AppError::ExternalCommandUnavailable(program))
        }
        Err(e) => Err(AppError::ExternalCommandFailed {
            command: argv.join(" "),
            detail: e.to_string(),
        }),
    }
}

/// Signals XRay to pick up config changes.
///
/// Reload is best effort: the config file and registry stay the source of
/// truth, so a failed reload only leaves the running proxy stale.
#[derive(Clone)]
pub struct XrayReloader {
    runner: Arc<dyn CommandRunner>,
    argv: Vec<String>,
}

impl XrayReloader {
    pub fn new(runner: Arc<dyn CommandRunner>, argv: Vec<String>) -> Self {
        Self { runner, argv }
    }

    pub fn command(&self) -> &[String] {
        &self.argv
    }

    /// Returns whether the reload command ran successfully.
    pub async fn reload(&self) -> bool {
        match run_checked(self.runner.as_ref(), &self.argv).await {
            Ok(()) => {
                tracing::info!(command = %self.argv.join(" "), "xray reloaded");
                true
            }
            Err(AppError::ExternalCommandUnavailable(program)) => {
                tracing::warn!(%program, "xray reload command unavailable, skipping reload");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "xray reload failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn missing_executable_is_unavailable() {
        let runner = RecordingRunner::with_outcome(RecordedOutcome::Missing);
        let err = run_checked(&runner, &argv(&["tc", "class"])).await.unwrap_err();
        assert!(matches!(err, AppError::ExternalCommandUnavailable(p) if p == "tc"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        let runner = RecordingRunner::with_outcome(RecordedOutcome::Exit(2));
        let err = run_checked(&runner, &argv(&["tc"])).await.unwrap_err();
        assert!(matches!(err, AppError::ExternalCommandFailed { .. }));
    }

    #[tokio::test]
    async fn reload_swallows_missing_command() {
        let runner = Arc::new(RecordingRunner::with_outcome(RecordedOutcome::Missing));
        let reloader = XrayReloader::new(runner.clone(), argv(&["systemctl", "reload", "xray"]));
        assert!(!reloader.reload().await);
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn system_runner_reports_missing_binary() {
        let err = SystemCommandRunner
            .run(&argv(&["definitely-not-a-real-binary-7c1e"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
