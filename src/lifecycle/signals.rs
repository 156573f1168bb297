//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP re-reads the config file, it never shuts down
//! - The first SIGTERM/SIGINT ends the listener; in-flight passes finish

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What a received signal asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    ReloadConfig,
    Shutdown,
}

/// Forward OS signals as [`SignalEvent`]s until shutdown is requested.
pub fn spawn_signal_listener(tx: mpsc::UnboundedSender<SignalEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = listen(&tx).await {
            tracing::error!(error = %e, "Failed to install signal handlers");
        }
        let _ = tx.send(SignalEvent::Shutdown);
    })
}

#[cfg(unix)]
async fn listen(tx: &mpsc::UnboundedSender<SignalEvent>) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                tracing::info!("SIGHUP received, reloading configuration");
                if tx.send(SignalEvent::ReloadConfig).is_err() {
                    return Ok(());
                }
            }
            _ = terminate.recv() => {
                tracing::info!("SIGTERM received");
                return Ok(());
            }
            _ = interrupt.recv() => {
                tracing::info!("SIGINT received");
                return Ok(());
            }
        }
    }
}

#[cfg(not(unix))]
async fn listen(_tx: &mpsc::UnboundedSender<SignalEvent>) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl+C received");
    Ok(())
}
