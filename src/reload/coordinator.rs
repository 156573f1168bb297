//! Validate, install and reload a rendered configuration.
//!
//! # Protocol
//! ```text
//! lock (in-process mutex + exclusive lock file, tried once)
//!   → live fingerprint == new fingerprint?  → Unchanged
//!   → write <live>.new
//!   → validator(<live>.new)   fail → delete .new, Validation
//!   → copy live → <live>.bak
//!   → rename .new → live      (atomic within one directory)
//!   → reload signal           fail → rollback, Signal
//!   → health wait (bounded)   fail → rollback, ReloadTimeout
//!   → Applied
//! ```
//!
//! The live path only ever holds the previous good file or the new
//! validated one.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::{self, Instant};

use crate::config::ReloadConfig;
use crate::observability::metrics;
use crate::reload::collaborators::{
    probe_from_config, CommandSignaler, CommandValidator, HealthProbe, ProbeStatus,
    ReloadSignaler, SyntaxValidator,
};
use crate::render::fingerprint::fingerprint_bytes;
use crate::render::RenderedConfig;

/// Errors that abort the apply step of a pass.
#[derive(Debug, Error)]
pub enum ReloadError {
    /// The proxy's syntax checker rejected the rendered document.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The proxy did not confirm health; the previous file was restored.
    #[error("Reload timeout after {waited:?} ({reason}); previous configuration restored")]
    ReloadTimeout { waited: Duration, reason: String },

    /// The reload signal failed; the previous file was restored.
    #[error("Reload signal failed: {0}; previous configuration restored")]
    Signal(String),

    /// Another process holds the reconciliation lock.
    #[error("Reconciliation lock {0} is held by another process")]
    Busy(PathBuf),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ReloadError + '_ {
    move |source| ReloadError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// What an apply call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The live file already matches; nothing was written or signalled.
    Unchanged,
    Applied { fingerprint: String },
}

/// Files touched by the protocol. All live in the live file's directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadPaths {
    pub live: PathBuf,
    pub temp: PathBuf,
    pub backup: PathBuf,
    pub lock: PathBuf,
}

impl ReloadPaths {
    /// `<live>.new`, `<live>.bak` and `<live>.lock` next to `live`.
    pub fn for_live(live: &Path) -> Self {
        let sibling = |suffix: &str| {
            let mut name = live.as_os_str().to_os_string();
            name.push(suffix);
            PathBuf::from(name)
        };
        Self {
            live: live.to_path_buf(),
            temp: sibling(".new"),
            backup: sibling(".bak"),
            lock: sibling(".lock"),
        }
    }
}

/// Exclusive advisory lock on the lock file, released on drop.
struct FileLock {
    file: File,
}

impl FileLock {
    fn try_acquire(path: &Path) -> Result<Self, ReloadError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(io_err(path))?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(ReloadError::Busy(path.to_path_buf()))
            }
            Err(e) => Err(ReloadError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Installs rendered configurations into the running proxy.
pub struct ReloadCoordinator {
    paths: ReloadPaths,
    validator: Box<dyn SyntaxValidator>,
    signaler: Box<dyn ReloadSignaler>,
    probe: Box<dyn HealthProbe>,
    health_timeout: Duration,
    poll_interval: Duration,
    lock: Mutex<()>,
}

impl ReloadCoordinator {
    pub fn new(
        paths: ReloadPaths,
        validator: Box<dyn SyntaxValidator>,
        signaler: Box<dyn ReloadSignaler>,
        probe: Box<dyn HealthProbe>,
    ) -> Self {
        Self {
            paths,
            validator,
            signaler,
            probe,
            health_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            lock: Mutex::new(()),
        }
    }

    /// Build a coordinator driving external commands as configured.
    pub fn from_config(config: &ReloadConfig) -> Self {
        Self::new(
            ReloadPaths::for_live(&config.live_path),
            Box::new(CommandValidator::new(config.validate_command.clone())),
            Box::new(CommandSignaler::new(config.reload_command.clone())),
            probe_from_config(&config.health),
        )
        .with_health_timeout(Duration::from_secs(config.health_timeout_secs))
        .with_poll_interval(Duration::from_millis(config.health_poll_interval_ms))
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn paths(&self) -> &ReloadPaths {
        &self.paths
    }

    /// Fingerprint of the live file, `None` if it does not exist.
    pub async fn live_fingerprint(&self) -> Result<Option<String>, ReloadError> {
        match tokio::fs::read(&self.paths.live).await {
            Ok(bytes) => Ok(Some(fingerprint_bytes(&bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&self.paths.live)(e)),
        }
    }

    /// Run the full protocol for one rendered configuration.
    pub async fn apply(&self, rendered: &RenderedConfig) -> Result<ApplyOutcome, ReloadError> {
        let _guard = self.lock.lock().await;
        let _file_lock = FileLock::try_acquire(&self.paths.lock)?;

        if self.live_fingerprint().await?.as_deref() == Some(rendered.fingerprint.as_str()) {
            tracing::debug!(fingerprint = %rendered.fingerprint, "Live configuration unchanged");
            return Ok(ApplyOutcome::Unchanged);
        }

        self.write_candidate(&rendered.text).await?;

        if let Err(message) = self.validator.validate(&self.paths.temp).await {
            tracing::error!(error = %message, "Rendered configuration failed validation");
            self.discard_candidate().await;
            metrics::record_reload("invalid");
            return Err(ReloadError::Validation(message));
        }

        let had_live = tokio::fs::try_exists(&self.paths.live)
            .await
            .map_err(io_err(&self.paths.live))?;
        if had_live {
            tokio::fs::copy(&self.paths.live, &self.paths.backup)
                .await
                .map_err(io_err(&self.paths.backup))?;
        }
        tokio::fs::rename(&self.paths.temp, &self.paths.live)
            .await
            .map_err(io_err(&self.paths.live))?;

        tracing::info!(
            path = ?self.paths.live,
            fingerprint = %rendered.fingerprint,
            "Installed new configuration, reloading proxy"
        );

        if let Err(message) = self.signaler.reload().await {
            tracing::error!(error = %message, "Reload signal failed, rolling back");
            self.rollback(had_live).await?;
            metrics::record_reload("signal_failed");
            return Err(ReloadError::Signal(message));
        }

        let started = Instant::now();
        if let Err(reason) = self.wait_healthy().await {
            let waited = started.elapsed();
            tracing::error!(reason = %reason, waited = ?waited, "Proxy unhealthy after reload, rolling back");
            self.rollback(had_live).await?;
            metrics::record_reload("rolled_back");
            return Err(ReloadError::ReloadTimeout { waited, reason });
        }

        metrics::record_reload("applied");
        Ok(ApplyOutcome::Applied {
            fingerprint: rendered.fingerprint.clone(),
        })
    }

    async fn write_candidate(&self, text: &str) -> Result<(), ReloadError> {
        let path = &self.paths.temp;
        let mut file = tokio::fs::File::create(path).await.map_err(io_err(path))?;
        file.write_all(text.as_bytes()).await.map_err(io_err(path))?;
        file.sync_all().await.map_err(io_err(path))?;
        Ok(())
    }

    async fn discard_candidate(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.paths.temp).await {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = ?self.paths.temp, error = %e, "Failed to remove candidate file");
            }
        }
    }

    /// Poll the probe until healthy, crashed, or out of time.
    async fn wait_healthy(&self) -> Result<(), String> {
        let deadline = Instant::now() + self.health_timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err("health not confirmed before timeout".to_string());
            }
            match time::timeout(deadline - now, self.probe.probe()).await {
                Ok(ProbeStatus::Healthy) => return Ok(()),
                Ok(ProbeStatus::Crashed(reason)) => return Err(format!("proxy crashed: {}", reason)),
                Ok(ProbeStatus::Pending) => {}
                Err(_) => return Err("health probe did not answer before timeout".to_string()),
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            time::sleep(self.poll_interval.min(remaining)).await;
        }
    }

    /// Put the previous file back (or remove the new one if there was none)
    /// and ask the proxy to reload again.
    async fn rollback(&self, had_live: bool) -> Result<(), ReloadError> {
        if had_live {
            // Copy to the temp path first so the restore is a rename too.
            tokio::fs::copy(&self.paths.backup, &self.paths.temp)
                .await
                .map_err(io_err(&self.paths.temp))?;
            tokio::fs::rename(&self.paths.temp, &self.paths.live)
                .await
                .map_err(io_err(&self.paths.live))?;
        } else {
            tokio::fs::remove_file(&self.paths.live)
                .await
                .map_err(io_err(&self.paths.live))?;
        }

        if let Err(message) = self.signaler.reload().await {
            tracing::error!(error = %message, "Reload after rollback failed");
        }
        tracing::warn!(path = ?self.paths.live, restored = had_live, "Rolled back live configuration");
        Ok(())
    }
}
