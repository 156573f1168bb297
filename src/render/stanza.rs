//! Block builders for the rendered proxy configuration.
//!
//! Every builder returns its block without a trailing newline; the caller
//! joins blocks with a blank line.

use crate::config::{DefaultsConfig, GlobalConfig, MonitoringConfig};
use crate::credentials::Credentials;
use crate::registry::Backend;

const INDENT: &str = "    ";

/// Name of the monitoring listen block.
pub const MONITORING_SERVICE: &str = "haproxy_monitoring";

/// Host the monitoring block binds to.
pub const MONITORING_HOST: &str = "0.0.0.0";

/// One rendered `server` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLine {
    pub name: String,
    pub address: String,
    pub options: String,
    pub backup: bool,
}

impl ServerLine {
    /// Decorate a backend with its service's `server_options`.
    pub fn for_backend(backend: &Backend, server_options: &str) -> Self {
        Self {
            name: backend.server_name(),
            address: backend.address(),
            options: server_options.to_string(),
            backup: backend.state == crate::registry::BackendState::Backup,
        }
    }

    fn render(&self) -> String {
        let mut line = format!("server {} {}", self.name, self.address);
        if !self.options.is_empty() {
            line.push(' ');
            line.push_str(&self.options);
        }
        if self.backup {
            line.push_str(" backup");
        }
        line
    }
}

fn block(header: String, lines: impl IntoIterator<Item = String>) -> String {
    let mut out = header;
    for line in lines {
        out.push('\n');
        out.push_str(INDENT);
        out.push_str(&line);
    }
    out
}

/// `global` block.
pub fn global_block(global: &GlobalConfig) -> String {
    let mut lines: Vec<String> = global.log.iter().map(|l| format!("log {}", l.trim())).collect();
    lines.push(format!("maxconn {}", global.maxconn));
    lines.push(format!("user {}", global.user));
    lines.push(format!("group {}", global.group));
    if global.debug {
        lines.push("debug".to_string());
    }
    if global.quiet {
        lines.push("quiet".to_string());
    }
    lines.push(format!("spread-checks {}", global.spread_checks));
    block("global".to_string(), lines)
}

/// `defaults` block.
pub fn defaults_block(defaults: &DefaultsConfig) -> String {
    let mut lines = vec![
        format!("log {}", defaults.log.trim()),
        format!("mode {}", defaults.mode),
    ];
    lines.extend(defaults.options.iter().map(|o| format!("option {}", o.trim())));
    lines.push(format!("retries {}", defaults.retries));
    lines.extend(defaults.timeouts.iter().map(|t| format!("timeout {}", t.trim())));
    block("defaults".to_string(), lines)
}

/// One `listen` block: options first, then server lines in the given order.
pub fn listen_block(name: &str, bind: &str, options: &[String], servers: &[ServerLine]) -> String {
    let lines = options
        .iter()
        .cloned()
        .chain(servers.iter().map(ServerLine::render));
    block(format!("listen {} {}", name, bind), lines)
}

/// Statistics listen block, allowlisted by source network and protected by
/// basic auth.
pub fn monitoring_block(monitoring: &MonitoringConfig, credentials: &Credentials) -> String {
    // BTreeSet iteration keeps the allowlist sorted.
    let cidrs = monitoring
        .allowed_cidrs
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");
    let options = vec![
        "mode http".to_string(),
        format!("acl allowed_cidr src {}", cidrs),
        "http-request deny unless allowed_cidr".to_string(),
        "stats enable".to_string(),
        "stats uri /".to_string(),
        "stats realm Haproxy\\ Statistics".to_string(),
        format!("stats auth {}:{}", credentials.username, credentials.password()),
        format!("stats refresh {}", monitoring.refresh_interval),
    ];
    listen_block(
        MONITORING_SERVICE,
        &format!("{}:{}", MONITORING_HOST, monitoring.port),
        &options,
        &[],
    )
}
