//! External collaborators of the reload protocol.
//!
//! # Responsibilities
//! - Syntax-check a candidate configuration file
//! - Ask the running proxy to reload gracefully
//! - Report whether the proxy is healthy after a reload
//!
//! # Design Decisions
//! - Object-safe traits returning boxed futures so the coordinator can hold
//!   any mix of implementations
//! - Every external command runs under a deadline and is killed on expiry

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::process::Command;

use crate::config::HealthProbeConfig;

/// Upper bound for validator and reload commands.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    Healthy,
    /// Not confirmed yet; probe again.
    Pending,
    /// The proxy is known to be down; stop waiting.
    Crashed(String),
}

/// Checks a candidate file with the proxy's own syntax checker.
pub trait SyntaxValidator: Send + Sync {
    /// `Err` carries the validator's message.
    fn validate<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<(), String>>;
}

/// Triggers a graceful reload of the running proxy.
pub trait ReloadSignaler: Send + Sync {
    fn reload(&self) -> BoxFuture<'_, Result<(), String>>;
}

/// Confirms the proxy is serving after a reload.
pub trait HealthProbe: Send + Sync {
    fn probe(&self) -> BoxFuture<'_, ProbeStatus>;
}

/// Runs `<command...> <path>`; exit status 0 means the file is valid.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    command: Vec<String>,
}

impl CommandValidator {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl SyntaxValidator for CommandValidator {
    fn validate<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<(), String>> {
        Box::pin(async move {
            let output = run_command(&self.command, Some(path)).await?;
            if output.status.success() {
                Ok(())
            } else {
                Err(failure_message(&output))
            }
        })
    }
}

/// Runs a reload command such as `systemctl reload haproxy`.
#[derive(Debug, Clone)]
pub struct CommandSignaler {
    command: Vec<String>,
}

impl CommandSignaler {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl ReloadSignaler for CommandSignaler {
    fn reload(&self) -> BoxFuture<'_, Result<(), String>> {
        Box::pin(async move {
            let output = run_command(&self.command, None).await?;
            if output.status.success() {
                Ok(())
            } else {
                Err(failure_message(&output))
            }
        })
    }
}

/// Healthy when the command exits with status 0.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    command: Vec<String>,
}

impl CommandProbe {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl HealthProbe for CommandProbe {
    fn probe(&self) -> BoxFuture<'_, ProbeStatus> {
        Box::pin(async move {
            match run_command(&self.command, None).await {
                Ok(output) if output.status.success() => ProbeStatus::Healthy,
                Ok(output) => {
                    tracing::debug!(status = %output.status, "Health probe not yet healthy");
                    ProbeStatus::Pending
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Health probe command failed");
                    ProbeStatus::Pending
                }
            }
        })
    }
}

/// Healthy when the URL answers 2xx, or 401 from an auth-protected page.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .no_proxy()
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            client,
        }
    }
}

impl HealthProbe for HttpProbe {
    fn probe(&self) -> BoxFuture<'_, ProbeStatus> {
        Box::pin(async move {
            match self.client.get(&self.url).send().await {
                Ok(res) if res.status().is_success() || res.status().as_u16() == 401 => {
                    ProbeStatus::Healthy
                }
                Ok(res) => {
                    tracing::debug!(url = %self.url, status = %res.status(), "Health probe not yet healthy");
                    ProbeStatus::Pending
                }
                Err(e) => {
                    tracing::debug!(url = %self.url, error = %e, "Health probe unreachable");
                    ProbeStatus::Pending
                }
            }
        })
    }
}

/// Build the configured probe.
pub fn probe_from_config(config: &HealthProbeConfig) -> Box<dyn HealthProbe> {
    match config {
        HealthProbeConfig::Command { command } => Box::new(CommandProbe::new(command.clone())),
        HealthProbeConfig::Http { url } => Box::new(HttpProbe::new(url.clone())),
    }
}

async fn run_command(command: &[String], path: Option<&Path>) -> Result<Output, String> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| "empty command".to_string())?;

    let mut cmd = Command::new(program);
    cmd.args(args).kill_on_drop(true);
    if let Some(path) = path {
        cmd.arg(path);
    }

    match tokio::time::timeout(COMMAND_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(format!("failed to run `{}`: {}", program, e)),
        Err(_) => Err(format!("`{}` did not finish within {:?}", program, COMMAND_TIMEOUT)),
    }
}

/// Prefer stderr, then stdout, then the bare exit status.
fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stderr.trim().is_empty() {
        stderr.trim().to_string()
    } else if !stdout.trim().is_empty() {
        stdout.trim().to_string()
    } else {
        format!("exited with {}", output.status)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into(), "validator".into()]
    }

    #[tokio::test]
    async fn test_command_validator_passes_path_and_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.cfg");
        std::fs::write(&good, "ok").unwrap();

        // `$1` is the appended candidate path.
        let validator = CommandValidator::new(sh("grep -q ok \"$1\" || { echo \"bad file $1\" >&2; exit 1; }"));
        assert!(validator.validate(&good).await.is_ok());

        let bad = dir.path().join("bad.cfg");
        std::fs::write(&bad, "nope").unwrap();
        let message = validator.validate(&bad).await.unwrap_err();
        assert!(message.starts_with("bad file"), "message: {}", message);
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let signaler = CommandSignaler::new(vec!["/nonexistent/reload-proxy".into()]);
        assert!(signaler.reload().await.unwrap_err().contains("failed to run"));
    }

    #[tokio::test]
    async fn test_command_probe() {
        assert_eq!(CommandProbe::new(vec!["true".into()]).probe().await, ProbeStatus::Healthy);
        assert_eq!(CommandProbe::new(vec!["false".into()]).probe().await, ProbeStatus::Pending);
    }

    #[tokio::test]
    async fn test_http_probe_pending_when_unreachable() {
        let probe = HttpProbe::new("http://127.0.0.1:1/");
        assert_eq!(probe.probe().await, ProbeStatus::Pending);
    }
}
