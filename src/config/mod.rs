//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config.toml
//!     → loader.rs (toml → EngineConfig, then validation.rs)
//!     → Reconciler::new at startup
//!
//! watcher.rs (notify on the parent directory) or SIGHUP
//!     → loader.rs again; unchanged or broken files are dropped
//!     → config-changed event → catalog replaced → full pass
//! ```
//!
//! # Design Decisions
//! - Every section has defaults, so a file with only `services` works
//! - Validation reports all issues at once
//! - `services` stays a raw YAML string owned by the catalog parser

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, LoadError};
pub use schema::{
    AdminConfig, DefaultsConfig, EngineConfig, GlobalConfig, HealthProbeConfig,
    MonitoringConfig, ObservabilityConfig, ReloadConfig,
};
