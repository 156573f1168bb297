//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend reported by a source
//! - Carry its role (active/backup) as rendered into the server line
//! - Derive the stable server identifier used in the render and admin API

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role of a backend inside its service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendState {
    #[default]
    Active,
    Backup,
}

impl BackendState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendState::Active => "active",
            BackendState::Backup => "backup",
        }
    }
}

impl fmt::Display for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(BackendState::Active),
            "backup" => Ok(BackendState::Backup),
            other => Err(format!("unknown backend state `{}`", other)),
        }
    }
}

/// A single backend server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backend {
    /// Relationship that reported this backend.
    pub source_id: String,
    /// Declared target service; `None` targets the default service.
    #[serde(default)]
    pub service_name: Option<String>,
    pub host: IpAddr,
    pub port: u16,
    #[serde(default)]
    pub state: BackendState,
}

impl Backend {
    /// `host:port` as written in the server line.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Server identifier: `<source>-<host>-<port>`.
    ///
    /// Characters of the source id outside `[A-Za-z0-9_.-]` become `-` so the
    /// name stays a single proxy config token.
    pub fn server_name(&self) -> String {
        let source: String = self
            .source_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        format!("{}-{}-{}", source, self.host, self.port)
    }

    /// Whether this backend should be rendered under `service`.
    pub fn targets(&self, service: &str) -> bool {
        self.service_name.as_deref() == Some(service)
    }
}
