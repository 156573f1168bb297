//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Reject values that would break the line-oriented rendered document
//!
//! # Design Decisions
//! - Returns all validation issues, not just the first
//! - Validation is a pure function: EngineConfig → Result<(), Vec<ValidationIssue>>
//! - Runs before a config is accepted into the system
//! - The service catalog is checked by its own parser, not here

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{EngineConfig, HealthProbeConfig};

/// One semantic problem found in a config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a deserialized config for semantic problems.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    // global
    let global = &config.global;
    if global.maxconn == 0 {
        issues.push(ValidationIssue::new("global.maxconn", "must be greater than 0"));
    }
    require_token(&mut issues, "global.user", &global.user);
    require_token(&mut issues, "global.group", &global.group);
    for (i, target) in global.log.iter().enumerate() {
        require_line(&mut issues, &format!("global.log[{}]", i), target);
    }

    // defaults
    let defaults = &config.defaults;
    require_line(&mut issues, "defaults.log", &defaults.log);
    require_token(&mut issues, "defaults.mode", &defaults.mode);
    for (i, option) in defaults.options.iter().enumerate() {
        require_line(&mut issues, &format!("defaults.options[{}]", i), option);
    }
    for (i, timeout) in defaults.timeouts.iter().enumerate() {
        require_line(&mut issues, &format!("defaults.timeouts[{}]", i), timeout);
    }

    // monitoring
    let monitoring = &config.monitoring;
    if monitoring.enabled {
        if monitoring.port == 0 {
            issues.push(ValidationIssue::new("monitoring.port", "must be in 1-65535"));
        }
        if monitoring.refresh_interval == 0 {
            issues.push(ValidationIssue::new(
                "monitoring.refresh_interval",
                "must be greater than 0",
            ));
        }
        require_token(&mut issues, "monitoring.username", &monitoring.username);
        if monitoring.username.contains(':') {
            issues.push(ValidationIssue::new("monitoring.username", "must not contain ':'"));
        }
        require_token(&mut issues, "monitoring.password", &monitoring.password);
        if monitoring.allowed_cidrs.is_empty() {
            issues.push(ValidationIssue::new(
                "monitoring.allowed_cidrs",
                "must list at least one network",
            ));
        }
        for cidr in &monitoring.allowed_cidrs {
            require_token(&mut issues, "monitoring.allowed_cidrs", cidr);
        }
    }

    // reload
    let reload = &config.reload;
    if reload.live_path.file_name().is_none() {
        issues.push(ValidationIssue::new("reload.live_path", "must name a file"));
    }
    require_command(&mut issues, "reload.validate_command", &reload.validate_command);
    require_command(&mut issues, "reload.reload_command", &reload.reload_command);
    match &reload.health {
        HealthProbeConfig::Command { command } => {
            require_command(&mut issues, "reload.health.command", command)
        }
        HealthProbeConfig::Http { url } => {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                issues.push(ValidationIssue::new("reload.health.url", "must be an http(s) URL"));
            }
        }
    }
    if reload.health_timeout_secs == 0 {
        issues.push(ValidationIssue::new(
            "reload.health_timeout_secs",
            "must be greater than 0",
        ));
    }
    if reload.health_poll_interval_ms == 0 {
        issues.push(ValidationIssue::new(
            "reload.health_poll_interval_ms",
            "must be greater than 0",
        ));
    }

    // admin
    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            issues.push(ValidationIssue::new("admin.bind_address", "must be host:port"));
        }
        if config.admin.api_key.trim().is_empty() {
            issues.push(ValidationIssue::new("admin.api_key", "must not be empty"));
        }
    }

    // observability
    let observability = &config.observability;
    if !matches!(observability.log_format.as_str(), "pretty" | "json") {
        issues.push(ValidationIssue::new(
            "observability.log_format",
            "must be \"pretty\" or \"json\"",
        ));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        issues.push(ValidationIssue::new(
            "observability.metrics_address",
            "must be host:port",
        ));
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

/// Non-empty single line.
fn require_line(issues: &mut Vec<ValidationIssue>, field: &str, value: &str) {
    if value.trim().is_empty() {
        issues.push(ValidationIssue::new(field, "must not be empty"));
    } else if value.contains(['\n', '\r']) {
        issues.push(ValidationIssue::new(field, "must be a single line"));
    }
}

/// Non-empty, no whitespace at all.
fn require_token(issues: &mut Vec<ValidationIssue>, field: &str, value: &str) {
    if value.is_empty() {
        issues.push(ValidationIssue::new(field, "must not be empty"));
    } else if value.chars().any(char::is_whitespace) {
        issues.push(ValidationIssue::new(field, "must not contain whitespace"));
    }
}

fn require_command(issues: &mut Vec<ValidationIssue>, field: &str, command: &[String]) {
    match command.first() {
        Some(program) if !program.trim().is_empty() => {}
        _ => issues.push(ValidationIssue::new(field, "must name a program")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&EngineConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_issue() {
        let mut config = EngineConfig::default();
        config.global.maxconn = 0;
        config.monitoring.password = "two words".into();
        config.monitoring.allowed_cidrs.clear();
        config.reload.reload_command.clear();
        config.defaults.options.push("a\nb".into());
        config.observability.log_format = "xml".into();

        let issues = validate_config(&config).unwrap_err();
        let fields: Vec<_> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "global.maxconn",
                "defaults.options[2]",
                "monitoring.password",
                "monitoring.allowed_cidrs",
                "reload.reload_command",
                "observability.log_format",
            ]
        );
    }

    #[test]
    fn test_disabled_monitoring_is_not_checked() {
        let mut config = EngineConfig::default();
        config.monitoring.enabled = false;
        config.monitoring.port = 0;
        config.monitoring.username.clear();
        assert!(validate_config(&config).is_ok());
    }
}
