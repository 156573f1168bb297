//! Events that drive reconciliation passes.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::registry::BackendState;

/// One input to the reconciler. Each event triggers exactly one pass.
#[derive(Debug, Clone)]
pub enum Event {
    /// The engine configuration (and with it the service catalog) changed.
    ConfigChanged(Box<EngineConfig>),
    Backend(BackendEvent),
}

impl Event {
    /// Short label for logs and the `reconciler_events_total` counter.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ConfigChanged(_) => "config-changed",
            Event::Backend(e) => e.kind(),
        }
    }
}

impl From<BackendEvent> for Event {
    fn from(event: BackendEvent) -> Self {
        Event::Backend(event)
    }
}

/// A backend signal from a source, as accepted by the admin API.
///
/// `host` stays a string on the wire so a bad address is reported by the
/// engine instead of failing deserialization with a generic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum BackendEvent {
    BackendJoined {
        source_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        service_name: Option<String>,
        host: String,
        port: u16,
        #[serde(default)]
        state: BackendState,
    },
    BackendChanged {
        source_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        service_name: Option<String>,
        host: String,
        port: u16,
        #[serde(default)]
        state: BackendState,
    },
    BackendDeparted {
        source_id: String,
        host: String,
        port: u16,
    },
    SourceTornDown {
        source_id: String,
    },
}

impl BackendEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendEvent::BackendJoined { .. } => "backend-joined",
            BackendEvent::BackendChanged { .. } => "backend-changed",
            BackendEvent::BackendDeparted { .. } => "backend-departed",
            BackendEvent::SourceTornDown { .. } => "source-torn-down",
        }
    }

    pub fn source_id(&self) -> &str {
        match self {
            BackendEvent::BackendJoined { source_id, .. }
            | BackendEvent::BackendChanged { source_id, .. }
            | BackendEvent::BackendDeparted { source_id, .. }
            | BackendEvent::SourceTornDown { source_id } => source_id,
        }
    }

    /// Reject events the registry cannot store: empty source ids, port 0,
    /// hosts that are not IP literals.
    pub fn check(&self) -> Result<(), String> {
        if self.source_id().trim().is_empty() {
            return Err("source_id must not be empty".to_string());
        }
        match self {
            BackendEvent::BackendJoined { host, port, service_name, .. }
            | BackendEvent::BackendChanged { host, port, service_name, .. } => {
                if service_name.as_deref().is_some_and(|s| s.trim().is_empty()) {
                    return Err("service_name must not be empty when given".to_string());
                }
                parse_endpoint(host, *port).map(|_| ())
            }
            BackendEvent::BackendDeparted { host, port, .. } => parse_endpoint(host, *port).map(|_| ()),
            BackendEvent::SourceTornDown { .. } => Ok(()),
        }
    }
}

/// Parse an event's host and check its port.
pub(crate) fn parse_endpoint(host: &str, port: u16) -> Result<IpAddr, String> {
    if port == 0 {
        return Err("port must be in 1..=65535".to_string());
    }
    host.trim()
        .parse::<IpAddr>()
        .map_err(|_| format!("host `{}` is not an IP address", host))
}
