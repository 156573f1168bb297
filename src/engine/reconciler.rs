//! The reconciliation engine.
//!
//! Owns every piece of engine state. Each event is applied to that state and
//! followed by one full pass: resolve credentials, render, persist, apply.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use serde::Serialize;
use thiserror::Error;

use crate::catalog::{CatalogError, ServiceCatalog};
use crate::config::validation::validate_config;
use crate::config::{EngineConfig, LoadError};
use crate::credentials::{CredentialManager, Credentials};
use crate::engine::events::{parse_endpoint, BackendEvent, Event};
use crate::engine::state::{EngineState, StateError};
use crate::observability::metrics;
use crate::registry::{BackendRegistry, BackendState};
use crate::reload::{ApplyOutcome, ReloadCoordinator, ReloadError};
use crate::render::{self, RenderInput, RenderedConfig};

/// Anything that aborts a pass. The live file is never left half-written.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Reload(#[from] ReloadError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Config(#[from] LoadError),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

impl ReconcileError {
    /// Label used for the `reconciler_passes_total` outcome.
    fn outcome(&self) -> &'static str {
        match self {
            ReconcileError::Catalog(_) | ReconcileError::Config(_) => "config_error",
            ReconcileError::InvalidEvent(_) => "rejected",
            ReconcileError::Reload(ReloadError::Validation(_)) => "invalid",
            ReconcileError::Reload(ReloadError::Busy(_)) => "busy",
            ReconcileError::Reload(ReloadError::Io { .. }) => "io_error",
            ReconcileError::Reload(_) => "rolled_back",
            ReconcileError::State(_) => "state_error",
        }
    }
}

/// Listen ports opened and closed by a pass, relative to the last applied one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortDelta {
    pub opened: Vec<u16>,
    pub closed: Vec<u16>,
}

impl PortDelta {
    fn between(previous: Option<&BTreeSet<u16>>, current: &BTreeSet<u16>) -> Self {
        let empty = BTreeSet::new();
        let previous = previous.unwrap_or(&empty);
        Self {
            opened: current.difference(previous).copied().collect(),
            closed: previous.difference(current).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.opened.is_empty() && self.closed.is_empty()
    }
}

/// Result of a successful pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub outcome: ApplyOutcome,
    pub fingerprint: String,
    pub ports: PortDelta,
    /// Backends left out of the render because their service is unknown.
    pub orphaned: usize,
}

/// Published view of the engine, read by the admin API.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub version: String,
    /// Fingerprint of the configuration last confirmed live.
    pub fingerprint: Option<String>,
    pub last_pass: Option<PassSummary>,
    pub backends: usize,
    pub orphaned: usize,
    pub services: Vec<ServiceStatus>,
}

impl StatusSnapshot {
    /// Role of the backend rendered as `server` under `service`.
    pub fn backend_state(&self, service: &str, server: &str) -> Option<BackendState> {
        self.services
            .iter()
            .find(|s| s.name == service)?
            .backends
            .iter()
            .find(|b| b.server == server)
            .map(|b| b.state)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub event: &'static str,
    pub ok: bool,
    /// `applied`, `unchanged`, or the error message.
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub bind: String,
    pub backends: Vec<BackendStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub server: String,
    pub address: String,
    pub source_id: String,
    pub state: BackendState,
}

/// Shared handle on the latest [`StatusSnapshot`].
pub type SharedStatus = Arc<ArcSwap<StatusSnapshot>>;

pub struct Reconciler {
    config: EngineConfig,
    catalog: ServiceCatalog,
    registry: BackendRegistry,
    credentials: CredentialManager,
    coordinator: ReloadCoordinator,
    status: SharedStatus,
    applied_ports: Option<BTreeSet<u16>>,
    applied_fingerprint: Option<String>,
    last_pass: Option<PassSummary>,
}

impl Reconciler {
    /// Build the engine from a loaded config, restoring persisted state.
    pub fn new(config: EngineConfig, coordinator: ReloadCoordinator) -> Result<Self, ReconcileError> {
        let catalog = parse_catalog(&config)?;
        let state = match &config.state_path {
            Some(path) => EngineState::load(path)?,
            None => EngineState::default(),
        };

        let reconciler = Self {
            config,
            catalog,
            registry: BackendRegistry::from_snapshot(state.backends),
            credentials: CredentialManager::with_generated(state.generated_password),
            coordinator,
            status: SharedStatus::default(),
            applied_ports: None,
            applied_fingerprint: None,
            last_pass: None,
        };
        reconciler.publish();
        Ok(reconciler)
    }

    /// [`Reconciler::new`] with the command-driven collaborators from config.
    pub fn from_config(config: EngineConfig) -> Result<Self, ReconcileError> {
        let coordinator = ReloadCoordinator::from_config(&config.reload);
        Self::new(config, coordinator)
    }

    pub fn status(&self) -> SharedStatus {
        Arc::clone(&self.status)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// The generated monitoring password, if one is in use.
    pub fn generated_password(&self) -> Option<&str> {
        self.credentials.generated()
    }

    /// Apply one event and run a pass.
    ///
    /// A rejected event leaves catalog, registry and credentials untouched.
    pub async fn handle(&mut self, event: Event) -> Result<PassReport, ReconcileError> {
        let started = Instant::now();
        let kind = event.kind();
        metrics::record_event(kind);

        let result = match self.apply_event(event) {
            Ok(()) => self.reconcile().await,
            Err(e) => Err(e),
        };
        self.finish(kind, started, result)
    }

    /// Run a pass with no new event, e.g. at startup or from a one-shot apply.
    pub async fn resync(&mut self) -> Result<PassReport, ReconcileError> {
        let started = Instant::now();
        let result = self.reconcile().await;
        self.finish("resync", started, result)
    }

    /// Record the pass result and publish a fresh snapshot.
    fn finish(
        &mut self,
        kind: &'static str,
        started: Instant,
        result: Result<PassReport, ReconcileError>,
    ) -> Result<PassReport, ReconcileError> {
        match &result {
            Ok(report) => {
                let detail = match report.outcome {
                    ApplyOutcome::Unchanged => "unchanged",
                    ApplyOutcome::Applied { .. } => "applied",
                };
                metrics::record_pass(detail, started);
                self.last_pass = Some(PassSummary {
                    event: kind,
                    ok: true,
                    detail: detail.to_string(),
                });
            }
            Err(e) => {
                tracing::error!(event = kind, error = %e, "Reconciliation pass failed");
                metrics::record_pass(e.outcome(), started);
                self.last_pass = Some(PassSummary {
                    event: kind,
                    ok: false,
                    detail: e.to_string(),
                });
            }
        }
        self.publish();
        result
    }

    fn apply_event(&mut self, event: Event) -> Result<(), ReconcileError> {
        match event {
            Event::ConfigChanged(config) => self.apply_config(*config),
            Event::Backend(event) => self.apply_backend_event(event),
        }
    }

    /// Parse and check the new catalog before touching anything.
    fn apply_config(&mut self, config: EngineConfig) -> Result<(), ReconcileError> {
        validate_config(&config).map_err(LoadError::Validation)?;
        let catalog = parse_catalog(&config)?;

        if config.reload != self.config.reload {
            tracing::info!(live = ?config.reload.live_path, "Reload settings changed");
            self.coordinator = ReloadCoordinator::from_config(&config.reload);
            self.applied_fingerprint = None;
        }
        if config.admin != self.config.admin || config.observability != self.config.observability {
            tracing::warn!("Admin and observability settings only take effect after a restart");
        }

        tracing::info!(services = catalog.len(), "Service catalog replaced");
        self.catalog = catalog;
        self.config = config;
        Ok(())
    }

    fn apply_backend_event(&mut self, event: BackendEvent) -> Result<(), ReconcileError> {
        if let Err(reason) = event.check() {
            tracing::warn!(event = event.kind(), source = event.source_id(), reason = %reason, "Rejected backend event");
            return Err(ReconcileError::InvalidEvent(reason));
        }

        match event {
            BackendEvent::BackendJoined {
                source_id,
                service_name,
                host,
                port,
                state,
            }
            | BackendEvent::BackendChanged {
                source_id,
                service_name,
                host,
                port,
                state,
            } => {
                let host = parse_endpoint(&host, port).map_err(ReconcileError::InvalidEvent)?;
                let service_name = service_name.as_deref().map(str::trim);
                let changed = self.registry.upsert(&source_id, service_name, host, port, state);
                tracing::info!(
                    source = %source_id,
                    service = service_name.unwrap_or("<default>"),
                    address = %format!("{}:{}", host, port),
                    state = %state,
                    changed,
                    "Backend upserted"
                );
            }
            BackendEvent::BackendDeparted { source_id, host, port } => {
                let host = parse_endpoint(&host, port).map_err(ReconcileError::InvalidEvent)?;
                let removed = self.registry.remove(&source_id, host, port);
                if !removed {
                    tracing::debug!(source = %source_id, host = %host, port, "Departed backend was not registered");
                }
                tracing::info!(source = %source_id, address = %format!("{}:{}", host, port), removed, "Backend departed");
            }
            BackendEvent::SourceTornDown { source_id } => {
                let dropped = self.registry.drop_source(&source_id);
                tracing::info!(source = %source_id, dropped, "Source torn down");
            }
        }
        Ok(())
    }

    /// Run one pass over the current state.
    pub async fn reconcile(&mut self) -> Result<PassReport, ReconcileError> {
        let rendered = self.render();

        let orphans = self.registry.orphans(&self.catalog);
        for backend in &orphans {
            tracing::warn!(
                source = %backend.source_id,
                service = backend.service_name.as_deref().unwrap_or("<default>"),
                address = %backend.address(),
                "Backend targets an unknown service; omitted from the configuration"
            );
        }
        let orphaned = orphans.len();
        metrics::record_backends(self.registry.len(), orphaned);

        self.persist()?;

        let outcome = self.coordinator.apply(&rendered).await?;
        match &outcome {
            ApplyOutcome::Unchanged => {
                tracing::debug!(fingerprint = %rendered.fingerprint, "Configuration unchanged")
            }
            ApplyOutcome::Applied { fingerprint } => {
                tracing::info!(fingerprint = %fingerprint, "Configuration applied")
            }
        }

        let ports = self.listen_ports();
        let delta = PortDelta::between(self.applied_ports.as_ref(), &ports);
        if !delta.is_empty() {
            tracing::info!(opened = ?delta.opened, closed = ?delta.closed, "Listen ports changed");
        }
        self.applied_ports = Some(ports);
        self.applied_fingerprint = Some(rendered.fingerprint.clone());

        Ok(PassReport {
            outcome,
            fingerprint: rendered.fingerprint,
            ports: delta,
            orphaned,
        })
    }

    /// Render the current state without applying it.
    ///
    /// May generate the monitoring password on first use.
    pub fn render(&mut self) -> RenderedConfig {
        let credentials: Option<Credentials> = if self.config.monitoring.enabled {
            let monitoring = &self.config.monitoring;
            Some(self.credentials.resolve(&monitoring.username, &monitoring.password).credentials)
        } else {
            None
        };

        render::render(&RenderInput {
            global: &self.config.global,
            defaults: &self.config.defaults,
            monitoring: &self.config.monitoring,
            credentials: credentials.as_ref(),
            catalog: &self.catalog,
            registry: &self.registry,
        })
    }

    /// [`Reconciler::render`], saving state if the render generated a password.
    ///
    /// Keeps one-shot renders stable across runs on the same state file.
    pub fn render_and_persist(&mut self) -> Result<RenderedConfig, ReconcileError> {
        let had_password = self.credentials.generated().is_some();
        let rendered = self.render();
        if !had_password && self.credentials.generated().is_some() {
            self.persist()?;
        }
        Ok(rendered)
    }

    fn persist(&self) -> Result<(), StateError> {
        let Some(path) = &self.config.state_path else {
            return Ok(());
        };
        EngineState {
            backends: self.registry.snapshot(),
            generated_password: self.credentials.generated().map(str::to_string),
        }
        .save(path)
    }

    /// Service ports plus the monitoring port when enabled.
    fn listen_ports(&self) -> BTreeSet<u16> {
        let mut ports: BTreeSet<u16> = self.catalog.ports().into_iter().collect();
        if self.config.monitoring.enabled {
            ports.insert(self.config.monitoring.port);
        }
        ports
    }

    fn publish(&self) {
        let services = self
            .catalog
            .iter()
            .map(|service| ServiceStatus {
                name: service.name.clone(),
                bind: service.bind_address(),
                backends: render::service_backends(&self.catalog, &self.registry, service)
                    .into_iter()
                    .map(|b| BackendStatus {
                        server: b.server_name(),
                        address: b.address(),
                        source_id: b.source_id.clone(),
                        state: b.state,
                    })
                    .collect(),
            })
            .collect();

        self.status.store(Arc::new(StatusSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            fingerprint: self.applied_fingerprint.clone(),
            last_pass: self.last_pass.clone(),
            backends: self.registry.len(),
            orphaned: self.registry.orphans(&self.catalog).len(),
            services,
        }));
    }

    /// Where the state file lives, if persistence is on.
    pub fn state_path(&self) -> Option<&Path> {
        self.config.state_path.as_deref()
    }
}

fn parse_catalog(config: &EngineConfig) -> Result<ServiceCatalog, CatalogError> {
    let catalog = ServiceCatalog::parse(&config.services)?;
    let monitoring_port = config
        .monitoring
        .enabled
        .then_some(config.monitoring.port);
    catalog.check_conflicts(monitoring_port)?;
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_delta() {
        let current: BTreeSet<u16> = [80, 443, 10000].into();
        let first = PortDelta::between(None, &current);
        assert_eq!(first.opened, vec![80, 443, 10000]);
        assert!(first.closed.is_empty());

        let previous: BTreeSet<u16> = [80, 8080].into();
        let delta = PortDelta::between(Some(&previous), &current);
        assert_eq!(delta.opened, vec![443, 10000]);
        assert_eq!(delta.closed, vec![8080]);
        assert!(PortDelta::between(Some(&current), &current).is_empty());
    }

    #[test]
    fn test_snapshot_backend_lookup() {
        let snapshot = StatusSnapshot {
            services: vec![ServiceStatus {
                name: "web".into(),
                bind: "0.0.0.0:80".into(),
                backends: vec![BackendStatus {
                    server: "r1-10.0.0.5-8080".into(),
                    address: "10.0.0.5:8080".into(),
                    source_id: "r1".into(),
                    state: BackendState::Backup,
                }],
            }],
            ..StatusSnapshot::default()
        };
        assert_eq!(snapshot.backend_state("web", "r1-10.0.0.5-8080"), Some(BackendState::Backup));
        assert_eq!(snapshot.backend_state("web", "r2-10.0.0.5-8080"), None);
        assert_eq!(snapshot.backend_state("api", "r1-10.0.0.5-8080"), None);
    }
}
