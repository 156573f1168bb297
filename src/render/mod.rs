//! Configuration rendering subsystem.
//!
//! # Data Flow
//! ```text
//! GlobalConfig ─┐
//! DefaultsConfig┤
//! Monitoring + ─┤→ render() → blocks in fixed order → text → fingerprint
//!   Credentials │     global, defaults, listen × catalog order, monitoring
//! ServiceCatalog┤
//! BackendRegistry┘
//! ```
//!
//! # Design Decisions
//! - Pure function: no I/O, no clocks, no randomness
//! - Server lines sorted by (host, port) so equal inputs give equal bytes
//! - Option tokens pass through verbatim; only their structure was checked

pub mod fingerprint;
pub mod stanza;

use crate::catalog::{Service, ServiceCatalog};
use crate::config::{DefaultsConfig, GlobalConfig, MonitoringConfig};
use crate::credentials::Credentials;
use crate::registry::{Backend, BackendRegistry};

pub use fingerprint::fingerprint;
pub use stanza::{ServerLine, MONITORING_SERVICE};

/// The engine's artifact: a complete proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    pub text: String,
    pub fingerprint: String,
}

impl RenderedConfig {
    pub fn from_text(text: String) -> Self {
        let fingerprint = fingerprint(&text);
        Self { text, fingerprint }
    }
}

/// Everything a render depends on.
#[derive(Debug, Clone, Copy)]
pub struct RenderInput<'a> {
    pub global: &'a GlobalConfig,
    pub defaults: &'a DefaultsConfig,
    pub monitoring: &'a MonitoringConfig,
    /// Resolved by the credential manager; required when monitoring is on.
    pub credentials: Option<&'a Credentials>,
    pub catalog: &'a ServiceCatalog,
    pub registry: &'a BackendRegistry,
}

/// Render the full configuration document.
pub fn render(input: &RenderInput<'_>) -> RenderedConfig {
    let mut blocks = vec![
        stanza::global_block(input.global),
        stanza::defaults_block(input.defaults),
    ];

    for service in input.catalog.iter() {
        let servers: Vec<ServerLine> = service_backends(input.catalog, input.registry, service)
            .into_iter()
            .map(|b| ServerLine::for_backend(b, &service.server_options))
            .collect();
        blocks.push(stanza::listen_block(
            &service.name,
            &service.bind_address(),
            &service.options,
            &servers,
        ));
    }

    if input.monitoring.enabled {
        match input.credentials {
            Some(credentials) => blocks.push(stanza::monitoring_block(input.monitoring, credentials)),
            None => tracing::warn!("Monitoring enabled without resolved credentials; block omitted"),
        }
    }

    let mut text = blocks.join("\n\n");
    text.push('\n');
    RenderedConfig::from_text(text)
}

/// Backends rendered under `service`: its explicit targets, plus backends
/// with no declared target when `service` is the catalog default.
pub fn service_backends<'r>(
    catalog: &ServiceCatalog,
    registry: &'r BackendRegistry,
    service: &Service,
) -> Vec<&'r Backend> {
    let mut backends = registry.backends_for(&service.name);
    let is_default = catalog
        .default_service()
        .is_some_and(|d| d.name == service.name);
    if is_default {
        backends.extend(registry.unassigned());
        backends.sort_by(|a, b| (a.host, a.port, &a.source_id).cmp(&(b.host, b.port, &b.source_id)));
    }
    backends
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BackendState;

    fn catalog() -> ServiceCatalog {
        ServiceCatalog::parse(
            r#"
- service_name: web
  service_host: 0.0.0.0
  service_port: 80
  service_options: "mode http, balance leastconn"
  server_options: maxconn 25
- service_name: api
  service_host: 10.1.1.1
  service_port: 8080
"#,
        )
        .unwrap()
    }

    fn render_with(
        catalog: &ServiceCatalog,
        registry: &BackendRegistry,
        monitoring: &MonitoringConfig,
        creds: Option<&Credentials>,
    ) -> RenderedConfig {
        let global = GlobalConfig::default();
        let defaults = DefaultsConfig::default();
        render(&RenderInput {
            global: &global,
            defaults: &defaults,
            monitoring,
            credentials: creds,
            catalog,
            registry,
        })
    }

    #[test]
    fn test_render_is_deterministic() {
        let catalog = catalog();
        let mut a = BackendRegistry::new();
        a.upsert("r1", Some("web"), "10.0.0.6".parse().unwrap(), 80, BackendState::Active);
        a.upsert("r2", Some("web"), "10.0.0.5".parse().unwrap(), 80, BackendState::Active);
        // Same entries, inserted in the opposite order.
        let mut b = BackendRegistry::new();
        b.upsert("r2", Some("web"), "10.0.0.5".parse().unwrap(), 80, BackendState::Active);
        b.upsert("r1", Some("web"), "10.0.0.6".parse().unwrap(), 80, BackendState::Active);

        let monitoring = MonitoringConfig::default();
        let creds = Credentials::new("haproxy", "pw");
        let first = render_with(&catalog, &a, &monitoring, Some(&creds));
        let second = render_with(&catalog, &b, &monitoring, Some(&creds));
        assert_eq!(first, second);
        assert_eq!(first.fingerprint, fingerprint(&first.text));
    }

    #[test]
    fn test_render_layout() {
        let catalog = catalog();
        let mut registry = BackendRegistry::new();
        registry.upsert("r1", Some("web"), "10.0.0.5".parse().unwrap(), 8080, BackendState::Active);
        registry.upsert("r2", None, "10.0.0.4".parse().unwrap(), 8080, BackendState::Backup);
        registry.upsert("r3", Some("api"), "10.0.0.9".parse().unwrap(), 9000, BackendState::Active);
        registry.upsert("r4", Some("ghost"), "10.0.0.3".parse().unwrap(), 1, BackendState::Active);

        let monitoring = MonitoringConfig { enabled: false, ..MonitoringConfig::default() };
        let rendered = render_with(&catalog, &registry, &monitoring, None);

        let expected_web = [
            "listen web 0.0.0.0:80",
            "    mode http",
            "    balance leastconn",
            "    server r2-10.0.0.4-8080 10.0.0.4:8080 maxconn 25 backup",
            "    server r1-10.0.0.5-8080 10.0.0.5:8080 maxconn 25",
        ]
        .join("\n");
        let expected_api = ["listen api 10.1.1.1:8080", "    server r3-10.0.0.9-9000 10.0.0.9:9000"].join("\n");

        assert!(rendered.text.starts_with("global\n"));
        assert!(rendered.text.contains(&format!("\n\n{}\n\n{}\n", expected_web, expected_api)));
        assert!(rendered.text.contains("\n\ndefaults\n"));
        assert!(!rendered.text.contains("10.0.0.3"));
        assert!(!rendered.text.contains(MONITORING_SERVICE));
        assert!(rendered.text.ends_with("10.0.0.9:9000\n"));
    }

    #[test]
    fn test_monitoring_block_is_last() {
        let catalog = catalog();
        let registry = BackendRegistry::new();
        let monitoring = MonitoringConfig::default();
        let creds = Credentials::new("haproxy", "generated");

        let rendered = render_with(&catalog, &registry, &monitoring, Some(&creds));
        let monitor_at = rendered.text.find("listen haproxy_monitoring 0.0.0.0:10000").unwrap();
        let api_at = rendered.text.find("listen api").unwrap();
        assert!(monitor_at > api_at);
        assert!(rendered.text.contains("    stats auth haproxy:generated\n"));
        assert!(!rendered.text.contains("changeme"));

        // No credentials, no block: the sentinel never leaks into the output.
        let rendered = render_with(&catalog, &registry, &monitoring, None);
        assert!(!rendered.text.contains(MONITORING_SERVICE));
    }

    #[test]
    fn test_service_without_backends_renders_empty_listen() {
        let catalog = catalog();
        let registry = BackendRegistry::new();
        let monitoring = MonitoringConfig { enabled: false, ..MonitoringConfig::default() };
        let rendered = render_with(&catalog, &registry, &monitoring, None);
        assert!(rendered.text.contains("listen web 0.0.0.0:80\n    mode http\n    balance leastconn\n\nlisten api"));
    }
}
