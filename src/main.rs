//! Proxy configuration reconciler.
//!
//! Keeps a running HAProxy-style proxy in sync with declared services and a
//! changing set of backends.
//!
//! # Architecture Overview
//!
//! ```text
//!   config file ──notify──┐
//!   SIGHUP ───────────────┤
//!   admin API (events) ───┤
//!                         ▼
//!                ┌─────────────────────────────────────────────┐
//!                │                 Reconciler                  │
//!                │                                             │
//!                │  catalog ─┐                                 │
//!                │  registry ┼─▶ render ─▶ reload coordinator ─┼──▶ live config
//!                │  creds ───┘    (pure)    validate/swap/     │     + reload
//!                │                          signal/health      │
//!                └───────────────┬─────────────────────────────┘
//!                                │ StatusSnapshot
//!                                ▼
//!                         admin API (reads)
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use proxy_reconciler::admin::{self, AdminState};
use proxy_reconciler::config::watcher::ConfigWatcher;
use proxy_reconciler::config::{load_config, EngineConfig};
use proxy_reconciler::engine::{Event, Reconciler};
use proxy_reconciler::lifecycle::{spawn_signal_listener, Shutdown, SignalEvent};
use proxy_reconciler::observability::{logging, metrics};
use proxy_reconciler::reload::ApplyOutcome;

/// Queued events beyond this are refused by the admin API.
const EVENT_QUEUE_DEPTH: usize = 256;

#[derive(Parser)]
#[command(name = "proxy-reconciler", version)]
#[command(about = "Render, validate and apply proxy configuration", long_about = None)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(short, long, default_value = "/etc/proxy-reconciler/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run the reconciliation daemon (default)
    Run,
    /// Print the configuration that would be applied
    Render,
    /// Validate the engine config and the service catalog
    Check,
    /// Run one reconciliation pass and exit
    Apply,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    logging::init_logging(&config.observability);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&cli.config, config).await?,
        Command::Render => {
            let mut reconciler = Reconciler::from_config(config)?;
            print!("{}", reconciler.render_and_persist()?.text);
        }
        Command::Check => {
            let reconciler = Reconciler::from_config(config)?;
            println!(
                "Configuration OK: {} services, {} backends",
                reconciler.catalog().len(),
                reconciler.registry().len()
            );
        }
        Command::Apply => {
            let mut reconciler = Reconciler::from_config(config)?;
            let report = reconciler.resync().await?;
            match report.outcome {
                ApplyOutcome::Unchanged => println!("Unchanged ({})", report.fingerprint),
                ApplyOutcome::Applied { fingerprint } => println!("Applied ({})", fingerprint),
            }
        }
    }
    Ok(())
}

async fn run(config_path: &Path, config: EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = ?config_path, "proxy-reconciler starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let (event_tx, mut event_rx) = mpsc::channel::<Event>(EVENT_QUEUE_DEPTH);
    let admin_config = config.admin.clone();
    let (watcher, mut config_rx) = ConfigWatcher::new(config_path, config.clone());
    let mut reconciler = Reconciler::from_config(config)?;

    if admin_config.enabled {
        let listener = TcpListener::bind(&admin_config.bind_address).await?;
        let state = AdminState {
            status: reconciler.status(),
            events: event_tx.clone(),
            api_key: admin_config.api_key.as_str().into(),
        };
        let stop = Shutdown::wait(shutdown.subscribe());
        tokio::spawn(async move {
            if let Err(e) = admin::serve(listener, state, stop).await {
                tracing::error!(error = %e, "Admin API server failed");
            }
        });
    }

    // Keep the watcher alive for the life of the loop.
    let _watcher = match watcher.run() {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::error!(error = %e, "Config watcher unavailable; SIGHUP still reloads");
            None
        }
    };
    let forward_tx = event_tx.clone();
    tokio::spawn(async move {
        while let Some(config) = config_rx.recv().await {
            if forward_tx.send(Event::ConfigChanged(Box::new(config))).await.is_err() {
                break;
            }
        }
    });
    drop(event_tx);

    let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
    let _signals = spawn_signal_listener(signal_tx);

    // Errors are logged and published by the reconciler; the daemon keeps going.
    let _ = reconciler.resync().await;

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                let _ = reconciler.handle(event).await;
            }
            Some(signal) = signal_rx.recv() => match signal {
                SignalEvent::ReloadConfig => match load_config(config_path) {
                    Ok(config) => {
                        let _ = reconciler.handle(Event::ConfigChanged(Box::new(config))).await;
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to reload config. Keeping current configuration."),
                },
                SignalEvent::Shutdown => break,
            },
            else => break,
        }
    }

    shutdown.trigger();
    tracing::info!("Shutdown complete");
    Ok(())
}
