//! Service catalog subsystem.
//!
//! # Data Flow
//! ```text
//! services string (YAML list, from the engine config)
//!     → parser.rs (per-entry deserialize + field validation)
//!     → ServiceCatalog (ordered, unique names, immutable)
//!     → replaced wholesale on every config change
//! ```
//!
//! # Design Decisions
//! - Either the whole catalog parses or the pass aborts; no partial catalog
//! - Option tokens are checked for structure only, never for proxy grammar

pub mod parser;
pub mod service;

use thiserror::Error;

pub use parser::parse_catalog;
pub use service::{Service, ServiceCatalog};

/// Errors produced while parsing the service catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A declaration is malformed or misses a required field.
    #[error("Parse error: {reason} (in `{fragment}`)")]
    Parse { fragment: String, reason: String },

    /// Two declarations share a name.
    #[error("Duplicate service name: {0}")]
    DuplicateService(String),

    /// Declarations are individually valid but cannot coexist.
    #[error("Configuration conflict: {0}")]
    Conflict(String),
}

impl ServiceCatalog {
    /// Parse a catalog string. See [`parse_catalog`].
    pub fn parse(input: &str) -> Result<Self, CatalogError> {
        parse_catalog(input)
    }

    /// Reject listen points that would collide once rendered.
    ///
    /// Two services collide when they share a port and either binds a
    /// wildcard or both bind the same host. The monitoring block binds
    /// `0.0.0.0`, so it collides with any service on its port.
    pub fn check_conflicts(&self, monitoring_port: Option<u16>) -> Result<(), CatalogError> {
        let services: Vec<&Service> = self.iter().collect();
        for (i, a) in services.iter().enumerate() {
            for b in &services[i + 1..] {
                let wildcard = a.binds_wildcard() || b.binds_wildcard();
                if a.port == b.port && (wildcard || a.host == b.host) {
                    return Err(CatalogError::Conflict(format!(
                        "services `{}` ({}) and `{}` ({}) bind the same address",
                        a.name,
                        a.bind_address(),
                        b.name,
                        b.bind_address()
                    )));
                }
            }
            if monitoring_port == Some(a.port) {
                return Err(CatalogError::Conflict(format!(
                    "service `{}` uses the monitoring port {}",
                    a.name, a.port
                )));
            }
        }
        Ok(())
    }
}
