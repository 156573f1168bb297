//! Configuration schema definitions.
//!
//! This module defines the complete engine configuration. All types derive
//! Serde traits for deserialization from the TOML config file.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::credentials::SENTINEL_PASSWORD;

/// Root configuration for the reconciler.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Service declarations (YAML list), parsed into the service catalog.
    pub services: String,

    /// Where registry entries and the generated password survive restarts.
    pub state_path: Option<PathBuf>,

    /// Process-wide proxy settings.
    pub global: GlobalConfig,

    /// Settings applied to every listen block.
    pub defaults: DefaultsConfig,

    /// Statistics/monitoring listen block.
    pub monitoring: MonitoringConfig,

    /// Validate/install/reload settings.
    pub reload: ReloadConfig,

    pub admin: AdminConfig,

    pub observability: ObservabilityConfig,
}

/// `global` block settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GlobalConfig {
    /// Log targets, one `log` line each.
    pub log: Vec<String>,
    pub maxconn: u32,
    pub user: String,
    pub group: String,
    pub debug: bool,
    pub quiet: bool,
    pub spread_checks: u32,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log: vec![
                "127.0.0.1 local0".to_string(),
                "127.0.0.1 local1 notice".to_string(),
            ],
            maxconn: 4096,
            user: "haproxy".to_string(),
            group: "haproxy".to_string(),
            debug: false,
            quiet: false,
            spread_checks: 0,
        }
    }
}

/// `defaults` block settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DefaultsConfig {
    pub log: String,
    pub mode: String,
    /// One `option` line each.
    pub options: Vec<String>,
    pub retries: u32,
    /// One `timeout` line each (e.g. "connect 5000").
    pub timeouts: Vec<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            log: "global".to_string(),
            mode: "http".to_string(),
            options: vec!["httplog".to_string(), "dontlognull".to_string()],
            retries: 3,
            timeouts: vec![
                "queue 20000".to_string(),
                "client 50000".to_string(),
                "connect 5000".to_string(),
                "server 50000".to_string(),
            ],
        }
    }
}

/// Monitoring (statistics page) settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub port: u16,
    /// Source networks allowed to reach the statistics page.
    pub allowed_cidrs: BTreeSet<String>,
    pub username: String,
    /// `"changeme"` asks the engine to generate a password.
    pub password: String,
    /// Statistics page refresh interval in seconds.
    pub refresh_interval: u32,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 10000,
            allowed_cidrs: BTreeSet::from(["127.0.0.1/32".to_string()]),
            username: "haproxy".to_string(),
            password: SENTINEL_PASSWORD.to_string(),
            refresh_interval: 3,
        }
    }
}

/// Settings for installing and reloading the rendered configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReloadConfig {
    /// Path of the live proxy configuration.
    pub live_path: PathBuf,

    /// Syntax check command; the candidate file path is appended.
    pub validate_command: Vec<String>,

    /// Graceful reload command.
    pub reload_command: Vec<String>,

    /// How to confirm the proxy is healthy after a reload.
    pub health: HealthProbeConfig,

    /// Upper bound on the post-reload health wait.
    pub health_timeout_secs: u64,

    /// Delay between health probes.
    pub health_poll_interval_ms: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            live_path: PathBuf::from("/etc/haproxy/haproxy.cfg"),
            validate_command: vec!["haproxy".into(), "-c".into(), "-f".into()],
            reload_command: vec!["systemctl".into(), "reload".into(), "haproxy".into()],
            health: HealthProbeConfig::default(),
            health_timeout_secs: 10,
            health_poll_interval_ms: 500,
        }
    }
}

/// Post-reload health probe.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HealthProbeConfig {
    /// Healthy when the command exits with status 0.
    Command { command: Vec<String> },
    /// Healthy when the URL answers with 2xx or 401.
    Http { url: String },
}

impl Default for HealthProbeConfig {
    fn default() -> Self {
        HealthProbeConfig::Command {
            command: vec![
                "systemctl".into(),
                "is-active".into(),
                "--quiet".into(),
                "haproxy".into(),
            ],
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.monitoring.password, SENTINEL_PASSWORD);
        assert_eq!(config.defaults.timeouts.len(), 4);
    }

    #[test]
    fn test_parses_full_config() {
        let text = r#"
services = """
- {name: web, host: 0.0.0.0, port: 80}
"""
state_path = "/var/lib/proxy-reconciler/state.json"

[global]
log = ["127.0.0.1 local0"]
maxconn = 2000
debug = true

[monitoring]
enabled = false
allowed_cidrs = ["10.0.0.0/8", "192.168.0.0/16"]

[reload]
live_path = "/tmp/haproxy.cfg"
health = { kind = "http", url = "http://127.0.0.1:10000/" }
health_timeout_secs = 3
"#;
        let config: EngineConfig = toml::from_str(text).unwrap();
        assert!(config.services.contains("web"));
        assert_eq!(config.global.maxconn, 2000);
        assert!(config.global.debug);
        assert_eq!(config.global.user, "haproxy");
        assert!(!config.monitoring.enabled);
        assert_eq!(config.monitoring.allowed_cidrs.len(), 2);
        assert_eq!(
            config.reload.health,
            HealthProbeConfig::Http { url: "http://127.0.0.1:10000/".into() }
        );
        assert_eq!(config.reload.health_timeout_secs, 3);
        assert_eq!(config.reload.health_poll_interval_ms, 500);
    }
}
