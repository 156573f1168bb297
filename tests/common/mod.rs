//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use proxy_reconciler::config::EngineConfig;
use proxy_reconciler::engine::Reconciler;
use proxy_reconciler::reload::{
    HealthProbe, ProbeStatus, ReloadCoordinator, ReloadPaths, ReloadSignaler, SyntaxValidator,
};
use tempfile::TempDir;

pub const SERVICES: &str = r#"
- service_name: web
  service_host: 0.0.0.0
  service_port: 80
  service_options: [mode http, balance leastconn]
  server_options: check inter 2000 rise 2 fall 5
- service_name: api
  service_host: 0.0.0.0
  service_port: 8080
"#;

#[derive(Debug)]
struct ScriptState {
    validate_error: Option<String>,
    signal_error: Option<String>,
    probe: ProbeStatus,
    validations: usize,
    signals: usize,
}

/// Programmable validator/signaler/probe shared by one test.
#[derive(Clone)]
pub struct Script {
    state: Arc<Mutex<ScriptState>>,
}

impl Script {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                validate_error: None,
                signal_error: None,
                probe: ProbeStatus::Healthy,
                validations: 0,
                signals: 0,
            })),
        }
    }

    pub fn reject_with(&self, message: &str) {
        self.state.lock().unwrap().validate_error = Some(message.to_string());
    }

    pub fn fail_signal_with(&self, message: &str) {
        self.state.lock().unwrap().signal_error = Some(message.to_string());
    }

    pub fn set_probe(&self, status: ProbeStatus) {
        self.state.lock().unwrap().probe = status;
    }

    pub fn validations(&self) -> usize {
        self.state.lock().unwrap().validations
    }

    pub fn signals(&self) -> usize {
        self.state.lock().unwrap().signals
    }
}

impl SyntaxValidator for Script {
    fn validate<'a>(&'a self, path: &'a std::path::Path) -> BoxFuture<'a, Result<(), String>> {
        Box::pin(async move {
            assert!(path.exists(), "validator called on a missing file");
            let mut state = self.state.lock().unwrap();
            state.validations += 1;
            match &state.validate_error {
                Some(message) => Err(message.clone()),
                None => Ok(()),
            }
        })
    }
}

impl ReloadSignaler for Script {
    fn reload(&self) -> BoxFuture<'_, Result<(), String>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.signals += 1;
            match &state.signal_error {
                Some(message) => Err(message.clone()),
                None => Ok(()),
            }
        })
    }
}

impl HealthProbe for Script {
    fn probe(&self) -> BoxFuture<'_, ProbeStatus> {
        Box::pin(async move { self.state.lock().unwrap().probe.clone() })
    }
}

/// A temp directory holding the live file, its siblings and the state file.
pub struct Harness {
    pub dir: TempDir,
    pub script: Script,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            script: Script::new(),
        }
    }

    pub fn live_path(&self) -> PathBuf {
        self.dir.path().join("haproxy.cfg")
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.path().join("state.json")
    }

    pub fn paths(&self) -> ReloadPaths {
        ReloadPaths::for_live(&self.live_path())
    }

    /// Engine config pointing at this harness. The reload section is the
    /// same on every call, so config changes keep the scripted coordinator.
    pub fn config(&self, services: &str) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.services = services.to_string();
        config.state_path = Some(self.state_path());
        config.reload.live_path = self.live_path();
        config
    }

    pub fn coordinator(&self) -> ReloadCoordinator {
        ReloadCoordinator::new(
            self.paths(),
            Box::new(self.script.clone()),
            Box::new(self.script.clone()),
            Box::new(self.script.clone()),
        )
        .with_health_timeout(Duration::from_millis(200))
        .with_poll_interval(Duration::from_millis(10))
    }

    pub fn reconciler(&self, config: EngineConfig) -> Reconciler {
        Reconciler::new(config, self.coordinator()).unwrap()
    }

    pub fn live(&self) -> String {
        std::fs::read_to_string(self.live_path()).unwrap()
    }
}
