//! Typed service records.

use serde::Serialize;

/// Wildcard listen hosts accepted in addition to IP literals.
pub const WILDCARD_HOSTS: [&str; 3] = ["0.0.0.0", "::", "*"];

/// A named listen point declared by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    /// Unique service name, used as the listen block name.
    pub name: String,

    /// Listen host (IP literal or wildcard).
    pub host: String,

    /// Listen port.
    pub port: u16,

    /// Listen block options, emitted one per line in declaration order.
    pub options: Vec<String>,

    /// Appended verbatim to every server line of this service.
    pub server_options: String,
}

impl Service {
    /// `host:port` as written in the listen line.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Binds every address: `*` or an unspecified IPv4/IPv6 literal.
    pub fn binds_wildcard(&self) -> bool {
        WILDCARD_HOSTS.contains(&self.host.as_str())
            || self
                .host
                .parse::<std::net::IpAddr>()
                .is_ok_and(|ip| ip.is_unspecified())
    }
}

/// Ordered, name-unique set of services parsed from one catalog string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceCatalog {
    services: Vec<Service>,
}

impl ServiceCatalog {
    pub(crate) fn from_services(services: Vec<Service>) -> Self {
        Self { services }
    }

    /// Services in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Service> {
        self.services.iter()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Look up a service by name.
    pub fn get(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The first declared service. Backends that name no service land here.
    pub fn default_service(&self) -> Option<&Service> {
        self.services.first()
    }

    /// Listen ports in catalog order.
    pub fn ports(&self) -> Vec<u16> {
        self.services.iter().map(|s| s.port).collect()
    }
}
